//! Database Schema Definitions
//!
//! Contains schema-related constants and the migration statements.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i64] = &[1, 2];

const MIGRATION_1: &[&str] = &["CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"];

const MIGRATION_2: &[&str] = &["CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"];

/// Check if database needs migration
pub fn needs_migration(current_version: i64) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i64) -> Vec<i64> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// Statements of one migration
pub fn migration_sql(version: i64) -> &'static [&'static str] {
    match version {
        1 => MIGRATION_1,
        2 => MIGRATION_2,
        _ => &[],
    }
}
