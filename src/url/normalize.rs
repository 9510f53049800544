use crate::{UrlError, UrlResult};
use url::{ParseError, Url};

/// Schemes a discovered link may carry; an empty scheme means a relative link
const ALLOWED_SCHEMES: &[&str] = &["", "http", "https"];

/// Cleans a raw `href` value for comparison
///
/// # Cleaning Steps
///
/// 1. Trim surrounding whitespace
/// 2. Remove trailing slashes
/// 3. Drop the fragment (everything after #)
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::clean_link;
///
/// assert_eq!(clean_link(" https://example.com/a/#top "), "https://example.com/a");
/// ```
pub fn clean_link(href: &str) -> String {
    let trimmed = href.trim().trim_end_matches('/');
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    without_fragment.trim_end_matches('/').to_string()
}

/// Returns the lower-cased scheme of a link, or an empty string for a relative link
///
/// Returns `None` when the value can't be interpreted at all.
pub fn link_scheme(link: &str) -> Option<String> {
    match Url::parse(link) {
        Ok(url) => Some(url.scheme().to_lowercase()),
        Err(ParseError::RelativeUrlWithoutBase) => Some(String::new()),
        Err(_) => None,
    }
}

/// Returns true if the link passes the protocol whitelist
pub fn is_allowed_link(link: &str) -> bool {
    link_scheme(link)
        .map(|scheme| ALLOWED_SCHEMES.contains(&scheme.as_str()))
        .unwrap_or(false)
}

/// Completes a link with scheme, host and base path when missing
///
/// Links that already carry a scheme are returned unchanged.
pub fn complete_url(base: &Url, link: &str) -> Option<String> {
    match Url::parse(link) {
        Ok(url) => Some(url.to_string()),
        Err(ParseError::RelativeUrlWithoutBase) => base.join(link).ok().map(|u| u.to_string()),
        Err(_) => None,
    }
}

/// Cleans, filters and completes a raw `href`
///
/// Returns `None` if the link should be excluded:
/// - empty after cleaning (fragment-only links)
/// - a scheme outside the whitelist (`mailto:`, `javascript:`, ...)
/// - unparseable
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let cleaned = clean_link(href);
    if cleaned.is_empty() || !is_allowed_link(&cleaned) {
        return None;
    }
    complete_url(base, &cleaned)
}

/// Normalizes an absolute URL to the form discovered links take
///
/// The value is cleaned like an `href` and re-serialized by the URL parser,
/// so `https://e.com` and a link to `https://e.com/` compare equal.
pub fn normalize_url(raw: &str) -> UrlResult<String> {
    let cleaned = clean_link(raw);
    let url = Url::parse(&cleaned).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::InvalidScheme(raw.to_string()));
    }
    Ok(url.to_string())
}
