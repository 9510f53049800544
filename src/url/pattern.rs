use crate::config::RootUrl;
use crate::{UrlError, UrlResult};

/// Placeholder replaced by each pattern value
const PLACEHOLDER: &str = "{0}";

/// Expands a root URL entry into concrete URLs
///
/// - A number pattern `[start, stop, step]` yields one URL per value of the
///   half-open range.
/// - A text pattern yields one URL per listed string.
/// - Without a pattern the base itself is the only URL.
///
/// Both patterns may be combined; number values come first.
///
/// # Examples
///
/// ```
/// use sumi_harvest::config::RootUrl;
/// use sumi_harvest::url::generate_urls;
///
/// let root = RootUrl {
///     base: "https://example.com/?page={0}".to_string(),
///     number_pattern: Some(vec![1, 3, 1]),
///     text_pattern: None,
/// };
/// assert_eq!(
///     generate_urls(&root).unwrap(),
///     vec!["https://example.com/?page=1", "https://example.com/?page=2"]
/// );
/// ```
pub fn generate_urls(root: &RootUrl) -> UrlResult<Vec<String>> {
    let mut urls = Vec::new();

    if let Some(pattern) = &root.number_pattern {
        let (start, stop, step) = match pattern.as_slice() {
            [start, stop, step] if *step > 0 => (*start, *stop, *step),
            _ => {
                return Err(UrlError::InvalidPattern(format!(
                    "expected [start, stop, step] with positive step, got {:?}",
                    pattern
                )))
            }
        };
        let mut value = start;
        while value < stop {
            urls.push(substitute(&root.base, &value.to_string()));
            match value.checked_add(step) {
                Some(next) => value = next,
                None => break,
            }
        }
    }

    if let Some(texts) = &root.text_pattern {
        for text in texts {
            urls.push(substitute(&root.base, text));
        }
    }

    if root.number_pattern.is_none() && root.text_pattern.is_none() {
        urls.push(root.base.clone());
    }

    Ok(urls)
}

fn substitute(base: &str, value: &str) -> String {
    base.replace(PLACEHOLDER, value)
}
