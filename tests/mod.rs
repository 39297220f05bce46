//! Test suite for attendsync
//!
//! This module organizes all tests
