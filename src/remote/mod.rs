//! # Remote Stores
//!
//! Boundary to the two remote backends that receive attendance rows.
//!
//! ## Key Components
//!
//! - `LedgerStore`: append-only, human-reviewed log; first choice for writes
//! - `IndexStore`: queryable database; fallback write target and source of
//!   truth for remote duplicate lookups
//! - `RemoteError`: typed failure taxonomy raised by the adapters
//! - `ledger.rs` / `index.rs`: HTTP adapters built on `reqwest`
//!
//! Failures are classified structurally by the adapters (transport error
//! kind, HTTP status, database error code), so callers only match on
//! [`RemoteError`] variants.

pub mod index;
pub mod ledger;

pub use index::HttpIndexStore;
pub use ledger::HttpLedgerStore;

use crate::shared::row::AttendanceRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Remote write/query failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The call did not finish within its bound
    #[error("remote call timed out")]
    Timeout,

    /// Connection refused, DNS failure, reset, ...
    #[error("network error: {0}")]
    Network(String),

    /// Remote refused the row as invalid (unresolved reference data)
    #[error("remote validation error: {0}")]
    Validation(String),

    /// Remote already holds a row with the same key
    #[error("remote rejected the row as a duplicate")]
    Duplicate,

    #[error("unexpected remote error: {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Timeout and network failures; the record stays queued
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout | RemoteError::Network(_))
    }

    /// Classifies a transport-level reqwest failure
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_connect() || err.is_request() {
            RemoteError::Network(err.to_string())
        } else if err.is_decode() {
            RemoteError::Unknown(format!("undecodable response: {err}"))
        } else {
            RemoteError::Unknown(err.to_string())
        }
    }
}

/// Duplicate lookup against the index store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    /// Display values as they would be written; stores compare them after
    /// normalization
    pub name: String,
    pub community: String,
    pub role: String,
    /// Inclusive start of the local day, in UTC
    pub from: DateTime<Utc>,
    /// Exclusive end of the local day, in UTC
    pub to: DateTime<Utc>,
}

/// Row found by an [`IndexQuery`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMatch {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    #[serde(rename = "DATA_HORA_UTC")]
    pub recorded_at: DateTime<Utc>,
}

/// Append-only ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, row: &AttendanceRow) -> Result<(), RemoteError>;
}

/// Queryable index
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn insert(&self, row: &AttendanceRow) -> Result<(), RemoteError>;

    async fn find_matches(&self, query: &IndexQuery) -> Result<Vec<RemoteMatch>, RemoteError>;
}

/// Bounds `call` by `limit`; an elapsed bound is always [`RemoteError::Timeout`]
///
/// The underlying request is dropped, not cancelled remotely; it may still land.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout),
    }
}
