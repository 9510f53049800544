//! Storage module for crawl artifacts and results
//!
//! This module handles everything that outlives a single page:
//! - The [`StorageSink`] that receives index records and downloaded files
//! - Per-page index records (`{location}/index.json`)
//! - Finalization of a run into the storage directory
//! - The SQLite result store, including file release on delete

mod fs;
mod schema;
mod sqlite;
mod traits;

pub use fs::FsStorage;
pub use sqlite::SqliteResultStore;
pub use traits::{ResultStore, StorageError, StorageResult, StorageSink};

use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;

/// File name of index records
pub const INDEX_FILE: &str = "index.json";

/// Timestamp format used in index records
const INDEX_TIME_FORMAT: &str = "%Y/%m/%d - %H:%M";

/// A stored run result
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub task_id: String,
    pub data: serde_json::Value,
    pub local_path: Option<String>,
    pub created_at: String,
}

/// Audit record written next to the files of a crawled page
#[derive(Debug, Serialize)]
pub struct IndexRecord<'a, T: Serialize> {
    pub url: &'a str,
    pub time: String,
    pub data: &'a T,
}

impl<'a, T: Serialize> IndexRecord<'a, T> {
    pub fn new(url: &'a str, data: &'a T) -> Self {
        Self {
            url,
            time: Local::now().format(INDEX_TIME_FORMAT).to_string(),
            data,
        }
    }
}

/// Writes the index record of a page to `{location}/index.json`
pub fn write_index<T: Serialize>(
    sink: &dyn StorageSink,
    location: &str,
    url: &str,
    data: &T,
) -> StorageResult<()> {
    let record = IndexRecord::new(url, data);
    let bytes = serde_json::to_vec_pretty(&record)?;
    sink.write(&format!("{}/{}", location, INDEX_FILE), &bytes)
}

/// Finalizes a run into `destination` below the storage root
///
/// Writes the whole result as `{destination}/index.json`, then moves every
/// page location out of the work sink. A location that fails to move is
/// logged and skipped. Returns the destination directory.
pub fn finalize_run<T: Serialize>(
    work: &dyn StorageSink,
    storage: &FsStorage,
    destination: &str,
    data: &T,
    locations: &[String],
) -> StorageResult<PathBuf> {
    let bytes = serde_json::to_vec_pretty(data)?;
    storage.write(&format!("{}/{}", destination, INDEX_FILE), &bytes)?;

    let target = storage.path_of(destination)?;
    let mut moved = 0;
    for location in locations {
        match work.move_into(location, &target) {
            Ok(Some(_)) => moved += 1,
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to move {}: {}", location, e),
        }
    }

    tracing::info!(
        "Finalized {} location(s) into {}",
        moved,
        target.display()
    );
    Ok(target)
}
