//! `SQLite` schema definitions for skylog.
//!
//! The database stands in for browser local storage: one table of string
//! values addressed by string keys, plus a metadata table for the schema
//! version.

/// SQL statement to create the key-value table.
pub const CREATE_KV_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create an index on `updated_at` for recency queries.
pub const CREATE_UPDATED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_kv_store_updated ON kv_store(updated_at DESC)
";

/// SQL statement to create the metadata table.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_KV_TABLE, CREATE_UPDATED_INDEX, CREATE_METADATA_TABLE];
