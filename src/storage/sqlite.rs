//! SQLite result store
//!
//! This module provides a SQLite-based implementation of the ResultStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ResultStore, StorageResult, StorageSink};
use crate::storage::ResultRecord;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite-backed [`ResultStore`]
pub struct SqliteResultStore {
    conn: Connection,
}

impl SqliteResultStore {
    /// Opens or creates the results database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, Option<String>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_record(
    (task_id, data, local_path, created_at): (String, String, Option<String>, String),
) -> StorageResult<ResultRecord> {
    Ok(ResultRecord {
        task_id,
        data: serde_json::from_str(&data)?,
        local_path,
        created_at,
    })
}

impl ResultStore for SqliteResultStore {
    fn save_result(
        &mut self,
        task_id: &str,
        data: &serde_json::Value,
        local_path: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO results (task_id, data, local_path, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id, serde_json::to_string(data)?, local_path, now],
        )?;
        Ok(())
    }

    fn get_result(&self, task_id: &str) -> StorageResult<Option<ResultRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT task_id, data, local_path, created_at FROM results WHERE task_id = ?1",
                params![task_id],
                record_from_row,
            )
            .optional()?;

        row.map(to_record).transpose()
    }

    fn list_results(&self) -> StorageResult<Vec<ResultRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, data, local_path, created_at FROM results
             ORDER BY created_at DESC, task_id DESC",
        )?;

        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(to_record).collect()
    }

    fn delete_result(&mut self, task_id: &str, sink: &dyn StorageSink) -> StorageResult<bool> {
        let local_path: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT local_path FROM results WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(local_path) = local_path else {
            return Ok(false);
        };

        if let Some(path) = local_path.as_deref().filter(|p| !p.is_empty()) {
            sink.release(path)?;
        }

        self.conn
            .execute("DELETE FROM results WHERE task_id = ?1", params![task_id])?;
        tracing::info!("Deleted result {}", task_id);
        Ok(true)
    }
}
