//! Shared Module
//!
//! Types used by every layer: the attendance record and its lifecycle,
//! text normalization, the remote row format, configuration and errors.

/// Attendance record and sync status
pub mod record;

/// Normalization primitive and duplicate key
pub mod normalize;

/// Row written to the remote stores
pub mod row;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError, SyncConfig};
pub use error::{SyncError, ValidationError};
pub use normalize::{normalize_text, DedupKey};
pub use record::{AttendanceDraft, AttendanceRecord, ClassificationLevel, PersonRef, SyncStatus};
pub use row::AttendanceRow;
