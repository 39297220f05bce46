//! # Local Database Module
//!
//! Local SQLite storage backing the offline queue. It plays the role of the
//! platform key-value storage: the queue store persists through the
//! [`KeyValueStorage`] trait and never touches SQL directly.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, pragmas and schema migrations
//! - `kv.rs`: `KeyValueStorage` trait and its SQLite implementation
//! - `sync.rs`: sync metadata (last pass time and report)
//! - `schema.rs`: schema version constants
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendsync::local_db::{KeyValueStorage, LocalDatabase};
//!
//! # async fn example() -> Result<(), attendsync::local_db::StorageError> {
//! let db = LocalDatabase::open("/tmp/attendsync/queue.db").await?;
//! db.set("greeting", "hello").await?;
//! assert_eq!(db.get("greeting").await?, Some("hello".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod kv;
pub mod schema;
pub mod sync;

pub use kv::{KeyValueStorage, MemoryStorage};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Local persistence failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem error while preparing the database location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage refused the write (quota, read-only medium, ...)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Schema is newer than this build understands
    #[error("database schema version {found} is newer than supported {supported}")]
    UnsupportedSchema {
        /// Version found in the database
        found: i64,
        /// Latest version known to this build
        supported: i64,
    },
}

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Uses WAL mode; creates parent directories when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        tracing::info!(path = %path.display(), "Opened local database");

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Open a private in-memory database (tests, ephemeral runs)
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // one connection: every pooled connection would otherwise see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Creates tables and applies pending migrations
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (current,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if current > schema::CURRENT_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchema {
                found: current,
                supported: schema::CURRENT_SCHEMA_VERSION,
            });
        }

        for version in schema::get_pending_migrations(current) {
            self.apply_migration(version).await?;
        }

        Ok(())
    }

    async fn apply_migration(&self, version: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in schema::migration_sql(version) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(version, "Applied local schema migration");
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current schema version
    pub async fn schema_version(&self) -> Result<i64> {
        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }
}
