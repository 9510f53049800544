//! Parsed HTML documents and the queries run against them
//!
//! An [`HtmlDocument`] is built from raw page bytes (encoding auto-detected)
//! or text, plus the URL it came from. Queries are CSS selectors; a selector
//! that fails to parse is logged and behaves exactly like one that matches
//! nothing.

mod content;
mod download;

pub use content::{
    binary_url, escape_attr, extract_content, extract_contents, find_images, ImageSource, Matched,
};
pub use download::{file_name_for, FileDownloader};

use crate::url::{clean_link, complete_url, is_allowed_link};
use chardetng::EncodingDetector;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

/// A link discovered on a page
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

/// Selector used when a page has no explicit link selectors
const DEFAULT_LINK_PATH: &str = "a";

/// A parsed HTML page
pub struct HtmlDocument {
    html: Html,
    url: Url,
}

impl HtmlDocument {
    /// Parses a document from text
    pub fn parse(content: &str, url: Url) -> Self {
        Self {
            html: Html::parse_document(content),
            url,
        }
    }

    /// Parses a document from raw bytes, detecting the text encoding
    pub fn from_bytes(bytes: &[u8], url: Url) -> Self {
        Self::parse(&decode_bytes(bytes), url)
    }

    /// Parses the serialized markup of a single element
    ///
    /// Table parts are wrapped in the parents the HTML parser needs to keep
    /// them, so a `<tr>` base survives the round trip.
    pub fn from_fragment(markup: &str, tag: &str, url: Url) -> Self {
        let wrapped = match tag {
            "tr" => format!("<table><tbody>{}</tbody></table>", markup),
            "td" | "th" => format!("<table><tbody><tr>{}</tr></tbody></table>", markup),
            "tbody" | "thead" | "tfoot" | "caption" | "colgroup" => {
                format!("<table>{}</table>", markup)
            }
            _ => markup.to_string(),
        };
        Self::parse(&wrapped, url)
    }

    /// The URL this document was loaded from
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `<html>` element
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// Evaluates a selector over the whole document
    ///
    /// Returns an empty list when the selector is invalid.
    pub fn query(&self, path: &str) -> Vec<ElementRef<'_>> {
        match parse_selector(path) {
            Some(selector) => self.html.select(&selector).collect(),
            None => Vec::new(),
        }
    }

    /// Evaluates a selector and reads either an attribute or the nodes themselves
    pub fn query_values(&self, path: &str, attribute: Option<&str>) -> Vec<Matched<'_>> {
        to_matched(self.query(path), attribute)
    }

    /// Collects the links matched by the given selectors
    ///
    /// # Link Rules
    ///
    /// - Only nodes carrying an `href` are considered
    /// - Links are cleaned (trimmed, trailing `/` and fragment removed)
    /// - Only `http`, `https` and relative links pass the whitelist
    /// - Duplicates collapse into one entry, preferring a version with link text
    /// - Relative links are completed against the document URL
    ///
    /// An empty selector list means every `<a>` on the page.
    pub fn extract_links(&self, paths: &[String]) -> Vec<Link> {
        let defaults = [DEFAULT_LINK_PATH.to_string()];
        let paths = if paths.is_empty() { &defaults[..] } else { paths };

        let mut found: BTreeMap<String, Link> = BTreeMap::new();
        for path in paths {
            for element in self.query(path) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let cleaned = clean_link(href);
                if cleaned.is_empty() || !is_allowed_link(&cleaned) {
                    continue;
                }
                let text = element.text().collect::<String>().trim().to_string();

                if let Some(existing) = found.get(&cleaned) {
                    if text.is_empty() || !existing.text.is_empty() {
                        continue;
                    }
                }

                if let Some(url) = complete_url(&self.url, &cleaned) {
                    found.insert(cleaned, Link { url, text });
                }
            }
        }

        let mut links: Vec<Link> = found.into_values().collect();
        links.sort();
        links.dedup_by(|a, b| a.url == b.url);
        links
    }
}

/// Parses a selector, logging failures
pub fn parse_selector(path: &str) -> Option<Selector> {
    match Selector::parse(path) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::warn!("Invalid selector '{}': {}", path, e);
            None
        }
    }
}

/// Evaluates a selector below an element (descendants only)
///
/// Returns an empty list when the selector is invalid.
pub fn select_within<'a>(element: ElementRef<'a>, path: &str) -> Vec<ElementRef<'a>> {
    match parse_selector(path) {
        Some(selector) => element.select(&selector).collect(),
        None => Vec::new(),
    }
}

fn to_matched<'a>(elements: Vec<ElementRef<'a>>, attribute: Option<&str>) -> Vec<Matched<'a>> {
    match attribute {
        Some(name) => elements
            .into_iter()
            .filter_map(|el| el.value().attr(name).map(|v| Matched::Value(v.to_string())))
            .collect(),
        None => elements.into_iter().map(Matched::Node).collect(),
    }
}

/// Decodes raw page bytes into text
///
/// Valid UTF-8 is taken as is; anything else goes through encoding
/// detection, and undecodable sequences are replaced rather than rejected.
pub fn decode_bytes(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!("Lossy decode using {}", encoding.name());
    }
    text.into_owned()
}
