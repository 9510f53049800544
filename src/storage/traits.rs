//! Storage traits and error types
//!
//! This module defines the interfaces for the file sink that receives page
//! artifacts and for the store that keeps finalized run results.

use crate::storage::ResultRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Result not found: {0}")]
    ResultNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for files produced while crawling
///
/// Paths are relative to the sink's root. Every operation is idempotent:
/// writing again overwrites, and moving or releasing something that does
/// not exist succeeds without doing anything.
pub trait StorageSink: Send + Sync {
    /// Writes bytes to a relative path, creating parent directories
    fn write(&self, rel_path: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Moves a location directory into `destination`
    ///
    /// Returns the new path, or `None` when the location is missing or
    /// empty and nothing was moved.
    fn move_into(&self, location: &str, destination: &Path) -> StorageResult<Option<PathBuf>>;

    /// Removes a location and everything below it
    fn release(&self, location: &str) -> StorageResult<()>;

    /// Returns true if the relative path exists
    fn exists(&self, rel_path: &str) -> bool;
}

/// Persistence for finalized crawl results
pub trait ResultStore {
    /// Stores (or replaces) the result of a run
    ///
    /// # Arguments
    ///
    /// * `task_id` - Identifier of the run
    /// * `data` - The crawl result as JSON
    /// * `local_path` - Where the run's files were finalized, relative to the storage sink
    fn save_result(
        &mut self,
        task_id: &str,
        data: &serde_json::Value,
        local_path: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets a result by task ID
    fn get_result(&self, task_id: &str) -> StorageResult<Option<ResultRecord>>;

    /// Lists all stored results, newest first
    fn list_results(&self) -> StorageResult<Vec<ResultRecord>>;

    /// Deletes a result after releasing its files from the sink
    ///
    /// Returns false if no result with this ID exists.
    fn delete_result(&mut self, task_id: &str, sink: &dyn StorageSink) -> StorageResult<bool>;
}
