//! `SQLite` schema definitions for the subscription store.

/// SQL statement to create the subscriptions table.
///
/// One row per user; `record` holds the JSON-encoded subscription record.
pub const CREATE_SUBSCRIPTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS subscriptions (
    user_id TEXT PRIMARY KEY NOT NULL,
    record TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on `updated_at` for recency listings.
pub const CREATE_UPDATED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_subscriptions_updated ON subscriptions(updated_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SUBSCRIPTIONS_TABLE,
    CREATE_UPDATED_INDEX,
    CREATE_METADATA_TABLE,
];
