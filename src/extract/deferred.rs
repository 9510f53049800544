//! Deferred downloads
//!
//! While an item is still being validated, binary fields and images inside
//! `html` fields are only recorded. Once the item is known to be valid,
//! [`resolve_deferred`] downloads them, stores the resulting paths in the
//! item and rewrites image sources in the field content.

use super::refine::Refiner;
use super::{ExtractedItem, ImageRef};
use crate::config::{ContentKind, ReplaceRule};
use crate::document::{escape_attr, FileDownloader, ImageSource};
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::ops::Range;
use url::Url;

/// Binary resources recorded for one field
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredMedia {
    pub key: String,
    /// Positions of the recorded URLs inside the field's values
    pub range: Range<usize>,
    /// Page the URLs were found on, used to resolve relative URLs
    pub page_url: Url,
    pub urls: Vec<String>,
}

/// Serialized fragments of one field whose images still need downloading
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredFragments {
    pub key: String,
    /// Positions of the values the fragments regenerate
    pub range: Range<usize>,
    pub page_url: Url,
    pub kind: ContentKind,
    pub fragments: Vec<String>,
    /// Replace rules of the collector that produced the field
    pub rules: Vec<ReplaceRule>,
}

/// Downloads postponed until an item passes validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeferredInfo {
    pub media: Vec<DeferredMedia>,
    pub images: Vec<DeferredFragments>,
}

impl DeferredInfo {
    pub fn is_empty(&self) -> bool {
        self.media.is_empty() && self.images.is_empty()
    }

    pub fn merge(&mut self, other: DeferredInfo) {
        self.media.extend(other.media);
        self.images.extend(other.images);
    }

    /// Moves every recorded range past the values already held for its key
    ///
    /// Called before the owning item's values are appended behind existing
    /// ones, with `offset_of` returning the existing value count of a key.
    pub fn shift(&mut self, offset_of: impl Fn(&str) -> usize) {
        for entry in &mut self.media {
            entry.range = shifted(&entry.range, offset_of(&entry.key));
        }
        for entry in &mut self.images {
            entry.range = shifted(&entry.range, offset_of(&entry.key));
        }
    }
}

fn shifted(range: &Range<usize>, offset: usize) -> Range<usize> {
    range.start + offset..range.end + offset
}

/// Performs the deferred downloads of an item and removes its marker
///
/// - Binary fields: each URL is downloaded into `location`; the recorded
///   URLs in the field are replaced by the stored paths, which are also
///   added to `media`.
/// - Image fragments: each `<img src>` is downloaded and added to `images`
///   with its `alt` text as caption, and the `src` attribute in the
///   fragment is rewritten to the stored path. The values the fragments
///   came from are then regenerated from the rewritten markup and refined
///   again; other values of the field are left as they are.
///
/// Failed downloads are logged and skipped; an image that could not be
/// downloaded keeps its original `src`.
pub async fn resolve_deferred(item: &mut ExtractedItem, downloader: &FileDownloader, location: &str) {
    let Some(info) = item.deferred.take() else {
        return;
    };
    tracing::debug!(
        "Resolving {} media field(s) and {} image field(s)",
        info.media.len(),
        info.images.len()
    );

    let mut splices: Vec<(String, Range<usize>, Vec<String>)> = Vec::new();
    for entry in info.media {
        let mut paths = Vec::new();
        for url in &entry.urls {
            match downloader.download_file(&entry.page_url, location, url).await {
                Ok(file_name) => paths.push(format!("{}/{}", location, file_name)),
                Err(e) => tracing::warn!("Skipping media {}: {}", url, e),
            }
        }
        item.media.extend(paths.iter().cloned());
        splices.push((entry.key, entry.range, paths));
    }

    for entry in info.images {
        let refiner = Refiner::new(&entry.rules);
        let mut contents = Vec::new();
        for fragment in &entry.fragments {
            let (markup, images) = download_fragment_images(fragment, &entry.page_url, downloader, location).await;
            item.images.extend(images);
            contents.push(refiner.refine(&fragment_content(&markup, entry.kind)));
        }
        splices.push((entry.key, entry.range, contents));
    }

    // back to front: a splice may change the length of its field
    splices.sort_by(|a, b| b.1.start.cmp(&a.1.start));
    for (key, range, values) in splices {
        splice_values(item, &key, range, values);
    }
}

/// Replaces `range` of a field's values, clamped to the values present
fn splice_values(item: &mut ExtractedItem, key: &str, range: Range<usize>, values: Vec<String>) {
    let field = item
        .content
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !field.is_array() {
        *field = Value::Array(Vec::new());
    }
    if let Value::Array(existing) = field {
        let end = range.end.min(existing.len());
        let start = range.start.min(end);
        let tail = existing.split_off(end);
        existing.truncate(start);
        existing.extend(values.into_iter().map(Value::String));
        existing.extend(tail);
    }
}

async fn download_fragment_images(
    fragment: &str,
    page_url: &Url,
    downloader: &FileDownloader,
    location: &str,
) -> (String, Vec<ImageRef>) {
    let mut markup = fragment.to_string();
    let mut images = Vec::new();
    let mut done = HashSet::new();

    for source in image_sources(fragment) {
        if !done.insert(source.src.clone()) {
            continue;
        }
        match downloader.download_file(page_url, location, &source.src).await {
            Ok(file_name) => {
                let path = format!("{}/{}", location, file_name);
                markup = markup.replace(
                    &format!("src=\"{}\"", escape_attr(&source.src)),
                    &format!("src=\"{}\"", escape_attr(&path)),
                );
                images.push(ImageRef {
                    path,
                    caption: source.caption,
                });
            }
            Err(e) => tracing::warn!("Skipping image {}: {}", source.src, e),
        }
    }
    (markup, images)
}

fn image_sources(fragment: &str) -> Vec<ImageSource> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    let html = Html::parse_fragment(fragment);
    html.select(&selector)
        .filter_map(|img| {
            img.value().attr("src").map(|src| ImageSource {
                src: src.to_string(),
                caption: img.value().attr("alt").unwrap_or_default().trim().to_string(),
            })
        })
        .collect()
}

fn fragment_content(markup: &str, kind: ContentKind) -> String {
    match kind {
        ContentKind::Text => Html::parse_fragment(markup)
            .root_element()
            .text()
            .collect::<String>()
            .trim()
            .to_string(),
        _ => markup.trim().to_string(),
    }
}
