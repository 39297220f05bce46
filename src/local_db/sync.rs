//! # Sync Metadata Operations
//!
//! Tracks synchronization metadata: when the last periodic pass finished
//! and what it reported.

use crate::local_db::{LocalDatabase, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

const LAST_SYNC_TIME: &str = "last_sync_time";
const LAST_SYNC_REPORT: &str = "last_sync_report";

impl LocalDatabase {
    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// Get last sync timestamp
    pub async fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let value = self.get_sync_metadata(LAST_SYNC_TIME).await?;
        Ok(value
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|time| time.with_timezone(&Utc)))
    }

    /// Records a finished pass: its time and a JSON report
    pub async fn record_sync_pass(&self, at: DateTime<Utc>, report_json: &str) -> Result<()> {
        self.set_sync_metadata(LAST_SYNC_TIME, &at.to_rfc3339()).await?;
        self.set_sync_metadata(LAST_SYNC_REPORT, report_json).await
    }

    /// JSON report of the last pass
    pub async fn get_last_sync_report(&self) -> Result<Option<String>> {
        self.get_sync_metadata(LAST_SYNC_REPORT).await
    }
}
