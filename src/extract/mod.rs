//! Page extraction
//!
//! This module turns fetched pages into items:
//! - [`ListingPage`] finds item instances, fetches their detail links in one
//!   batch and assembles the items
//! - [`DetailPage`] extracts and validates the fields of one collector
//! - Items are combined with [`merge_data`] and refined with [`Refiner`]
//! - Binary downloads are deferred until an item is known to be valid

mod deferred;
mod detail;
mod listing;
mod merge;
mod refine;

pub use deferred::{resolve_deferred, DeferredFragments, DeferredInfo, DeferredMedia};
pub use detail::{DetailPage, DetailResult};
pub use listing::{ListingPage, ListingResult};
pub use merge::merge_data;
pub use refine::Refiner;

use crate::crawler::BatchFetcher;
use crate::document::FileDownloader;
use crate::storage::StorageSink;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A downloaded image and its caption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: String,
    pub caption: String,
}

/// The accumulated data of one item
///
/// `content` maps each field key to the array of values extracted for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub content: Map<String, Value>,
    pub images: Vec<ImageRef>,
    pub media: Vec<String>,
    #[serde(skip)]
    pub deferred: Option<DeferredInfo>,
}

impl ExtractedItem {
    /// Merges another extraction into this item
    ///
    /// Field values are concatenated per key; images, media and deferred
    /// downloads are appended. Deferred downloads of `other` keep pointing
    /// at its own values after they land behind the existing ones.
    pub fn merge(&mut self, other: ExtractedItem) {
        if let Some(mut deferred) = other.deferred {
            deferred.shift(|key| self.value_count(key));
            self.deferred.get_or_insert_with(DeferredInfo::default).merge(deferred);
        }
        merge_data(&mut self.content, other.content);
        self.images.extend(other.images);
        self.media.extend(other.media);
    }

    fn value_count(&self, key: &str) -> usize {
        self.content
            .get(key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// True when no field produced a value and nothing was downloaded
    pub fn is_empty(&self) -> bool {
        let no_values = self.content.values().all(|value| match value {
            Value::Array(values) => values.is_empty(),
            Value::Null => true,
            _ => false,
        });
        no_values && self.images.is_empty() && self.media.is_empty()
    }

    /// Returns the string values of a field
    pub fn values(&self, key: &str) -> Vec<&str> {
        match self.content.get(key) {
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(value)) => vec![value.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.as_ref().is_some_and(|d| !d.is_empty())
    }
}

/// Outcome of extracting one detail page
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Valid(ExtractedItem),
    /// A field hit a black word or missed its required words; the owning
    /// item must be discarded
    Invalid,
}

impl DetailOutcome {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

/// Collaborators shared by every page of a run
#[derive(Clone)]
pub struct PageContext {
    pub fetcher: BatchFetcher,
    pub downloader: FileDownloader,
    pub sink: Arc<dyn StorageSink>,
    pub concurrency: usize,
}

impl PageContext {
    pub fn new(fetcher: BatchFetcher, sink: Arc<dyn StorageSink>, concurrency: usize) -> Self {
        let downloader = FileDownloader::new(fetcher.transport(), Arc::clone(&sink));
        Self {
            fetcher,
            downloader,
            sink,
            concurrency,
        }
    }
}
