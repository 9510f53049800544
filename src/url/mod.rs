//! URL handling module for Sumi-Harvest
//!
//! This module provides link cleaning, the protocol whitelist applied to
//! discovered links, relative link completion, and root URL pattern expansion.

mod normalize;
mod pattern;

pub use normalize::{
    clean_link, complete_url, is_allowed_link, link_scheme, normalize_url, resolve_link,
};
pub use pattern::generate_urls;

use sha2::{Digest, Sha256};
use url::Url;

/// Derives the storage location of a crawled page
///
/// The location is `"{hash}-{host}"`, where `hash` is the first 16 hex
/// characters of the SHA-256 of the URL. The same URL always maps to the
/// same location, so a retried page overwrites its own files.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::page_location;
///
/// let location = page_location("https://example.com/list");
/// assert!(location.ends_with("-example.com"));
/// assert_eq!(location, page_location("https://example.com/list"));
/// ```
pub fn page_location(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let hash = &digest[..16];
    match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
        Some(host) => format!("{}-{}", hash, host),
        None => hash.to_string(),
    }
}
