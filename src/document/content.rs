use super::select_within;
use crate::config::ContentKind;
use scraper::ElementRef;

/// A single query match: either a node or the string value of an attribute
#[derive(Debug, Clone)]
pub enum Matched<'a> {
    Node(ElementRef<'a>),
    Value(String),
}

/// An image referenced inside a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub src: String,
    pub caption: String,
}

/// Converts a match into content of the given kind
///
/// - `text`: all descendant text, trimmed
/// - `html`: the serialized node, trimmed; markup is written compactly as
///   scraper serializes it, without pretty-printing
/// - `binary`: the URL of the resource (see [`binary_url`])
///
/// Attribute values pass through unchanged for `text` and `html`.
pub fn extract_content(matched: &Matched<'_>, kind: ContentKind) -> String {
    match (matched, kind) {
        (_, ContentKind::Binary) => binary_url(matched).unwrap_or_default(),
        (Matched::Value(value), _) => value.clone(),
        (Matched::Node(el), ContentKind::Text) => el.text().collect::<String>().trim().to_string(),
        (Matched::Node(el), ContentKind::Html) => el.html().trim().to_string(),
    }
}

pub fn extract_contents(matched: &[Matched<'_>], kind: ContentKind) -> Vec<String> {
    matched.iter().map(|m| extract_content(m, kind)).collect()
}

/// Resolves the resource URL behind a binary field match
///
/// An attribute value is used as is; a node falls back to its `src` then
/// `href` attribute.
pub fn binary_url(matched: &Matched<'_>) -> Option<String> {
    let value = match matched {
        Matched::Value(value) => Some(value.as_str()),
        Matched::Node(el) => el.value().attr("src").or_else(|| el.value().attr("href")),
    };
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Finds the images inside an element, including the element itself
///
/// The `alt` text becomes the caption.
pub fn find_images(element: ElementRef<'_>) -> Vec<ImageSource> {
    let mut images = Vec::new();
    let mut push = |el: ElementRef<'_>| {
        if let Some(src) = el.value().attr("src") {
            images.push(ImageSource {
                src: src.to_string(),
                caption: el.value().attr("alt").unwrap_or_default().trim().to_string(),
            });
        }
    };

    if element.value().name() == "img" {
        push(element);
    }
    for img in select_within(element, "img[src]") {
        push(img);
    }
    images
}

/// Escapes a value the way the HTML serializer writes attribute values
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '\u{a0}' => escaped.push_str("&nbsp;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}
