//! Shared Error Types
//!
//! Error types used across the crate. Submission never fails with these:
//! `SyncService::submit` folds every failure into a `SubmitOutcome`. They
//! surface from construction, configuration and storage-level APIs.
//!
//! # Error Categories
//!
//! - `ValidationError` - unresolved or missing reference data
//! - `SyncError` - aggregate for fallible service APIs
//!
//! # Usage
//!
//! ```rust
//! use attendsync::shared::error::ValidationError;
//! use attendsync::reference::ReferenceKind;
//!
//! let error = ValidationError::unresolved(ReferenceKind::Community, "c-42");
//! assert!(error.to_string().contains("c-42"));
//! ```

use crate::local_db::StorageError;
use crate::reference::ReferenceKind;
use crate::remote::RemoteError;
use crate::shared::config::ConfigError;
use thiserror::Error;

/// Reference data did not resolve for a record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A community/role/instrument id no longer exists
    #[error("Unresolved {kind} reference: {id}")]
    UnresolvedReference {
        /// Which reference table
        kind: ReferenceKind,
        /// The missing id
        id: String,
    },

    /// Roster id not present in the directory for this community/role
    #[error("Roster person {id} not found in directory")]
    UnknownPerson {
        /// Roster id
        id: String,
    },

    /// A required field is empty
    #[error("Validation error in field '{field}': {message}")]
    InvalidField {
        /// Field name
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl ValidationError {
    pub fn unresolved(kind: ReferenceKind, id: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            kind,
            id: id.into(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Aggregate error for service construction and storage-facing APIs
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sync service is already running")]
    AlreadyRunning,
}
