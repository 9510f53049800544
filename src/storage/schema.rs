//! Database schema definitions
//!
//! This module contains the SQL schema for the results database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Finalized crawl results
CREATE TABLE IF NOT EXISTS results (
    task_id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    local_path TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_created ON results(created_at);
"#;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
