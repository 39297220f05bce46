//! # Offline Attendance Handling
//!
//! Everything the submission path needs to keep working without a network:
//! the persisted queue, the duplicate detector and the concurrency guard.
//!
//! ## Key Components
//!
//! - `queue.rs`: Local Queue Store
//! - `duplicate.rs`: Duplicate Detector
//! - `guard.rs`: Concurrency Guard

pub mod duplicate;
pub mod guard;
pub mod queue;

pub use duplicate::{DuplicateCandidate, DuplicateCheck, DuplicateDetector, ExistingEntry};
pub use guard::ConcurrencyGuard;
pub use queue::{LocalQueueStore, QueueError};
