use super::deferred::{resolve_deferred, DeferredFragments, DeferredInfo, DeferredMedia};
use super::refine::Refiner;
use super::{DetailOutcome, ExtractedItem};
use crate::config::{CollectorSpec, ContentKind, CrawlSpec, FieldSelectorSpec};
use crate::document::{binary_url, extract_contents, find_images, FileDownloader, HtmlDocument, Matched};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// Result of extracting a detail page
#[derive(Debug, Clone, PartialEq)]
pub struct DetailResult {
    pub outcome: DetailOutcome,
    /// Expansion links found on the page, with the depth to crawl them at
    pub expand_links: BTreeMap<String, u32>,
}

/// A page holding the fields of one collector
///
/// Either a fetched detail link or, for collectors without a link, the
/// serialized markup of the item's base element.
pub struct DetailPage<'s> {
    document: HtmlDocument,
    depth: u32,
    location: String,
    spec: &'s CrawlSpec,
    collector: &'s CollectorSpec,
}

impl<'s> DetailPage<'s> {
    /// Creates a detail page
    ///
    /// `location` is the storage location of the owning listing page.
    pub fn new(
        document: HtmlDocument,
        depth: u32,
        location: impl Into<String>,
        spec: &'s CrawlSpec,
        collector: &'s CollectorSpec,
    ) -> Self {
        Self {
            document,
            depth,
            location: location.into(),
            spec,
            collector,
        }
    }

    pub fn url(&self) -> &Url {
        self.document.url()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn find_expand_links(&self) -> BTreeMap<String, u32> {
        expand_links_of(&self.document, self.depth, self.spec)
    }

    /// Extracts the collector's fields without touching the network
    ///
    /// Binary fields keep their raw URLs and images inside `html` fields are
    /// recorded as deferred downloads on the returned item.
    pub fn extract(&self) -> DetailResult {
        tracing::debug!("Extracting detail page {}", self.url());
        let expand_links = self.find_expand_links();
        let refiner = Refiner::new(&self.collector.replace_rules);

        let mut item = ExtractedItem::default();
        let mut deferred = DeferredInfo::default();

        for field in &self.collector.selectors {
            let matched = self
                .document
                .query_values(&field.path, field.attribute_name());

            if field.kind == ContentKind::Binary {
                let urls: Vec<String> = matched.iter().filter_map(binary_url).collect();
                item.content.insert(field.key.clone(), string_array(urls.clone()));
                if !urls.is_empty() {
                    deferred.media.push(DeferredMedia {
                        key: field.key.clone(),
                        range: 0..urls.len(),
                        page_url: self.url().clone(),
                        urls,
                    });
                }
                continue;
            }

            let values = extract_contents(&matched, field.kind);
            if let Some(reason) = word_violation(field, &values) {
                tracing::info!(
                    "Field '{}' on {} rejected: {}",
                    field.key,
                    self.url(),
                    reason
                );
                return DetailResult {
                    outcome: DetailOutcome::Invalid,
                    expand_links,
                };
            }
            let value_count = values.len();
            item.content
                .insert(field.key.clone(), string_array(refiner.refine_all(values)));

            if self.collector.get_image && field.kind == ContentKind::Html {
                if let Some(fragments) = image_fragments(&matched) {
                    deferred.images.push(DeferredFragments {
                        key: field.key.clone(),
                        range: 0..value_count,
                        page_url: self.url().clone(),
                        kind: field.kind,
                        fragments,
                        rules: self.collector.replace_rules.clone(),
                    });
                }
            }
        }

        if !deferred.is_empty() {
            item.deferred = Some(deferred);
        }
        DetailResult {
            outcome: DetailOutcome::Valid(item),
            expand_links,
        }
    }

    /// Extracts the page, optionally performing downloads right away
    ///
    /// With `deferred` set this is [`DetailPage::extract`]. Otherwise the
    /// recorded downloads of a valid result are resolved before returning.
    pub async fn extract_data(self, deferred: bool, downloader: &FileDownloader) -> DetailResult {
        let result = self.extract();
        let DetailPage {
            document, location, ..
        } = self;
        drop(document);
        if deferred {
            return result;
        }

        match result.outcome {
            DetailOutcome::Valid(mut item) => {
                resolve_deferred(&mut item, downloader, &location).await;
                DetailResult {
                    outcome: DetailOutcome::Valid(item),
                    expand_links: result.expand_links,
                }
            }
            DetailOutcome::Invalid => DetailResult {
                outcome: DetailOutcome::Invalid,
                expand_links: result.expand_links,
            },
        }
    }
}

/// Expansion links of a page, one level deeper, while below the maximum depth
pub(super) fn expand_links_of(document: &HtmlDocument, depth: u32, spec: &CrawlSpec) -> BTreeMap<String, u32> {
    if depth >= spec.max_depth {
        return BTreeMap::new();
    }
    document
        .extract_links(&spec.expand_links)
        .into_iter()
        .map(|link| (link.url, depth + 1))
        .collect()
}

/// Checks a field's values against its black words and required words
///
/// Returns the reason when the owning item must be rejected.
fn word_violation(field: &FieldSelectorSpec, values: &[String]) -> Option<String> {
    if field.black_words.is_empty() && field.required_words.is_empty() {
        return None;
    }
    let joined = values.join(" ").to_lowercase();

    if let Some(word) = field
        .black_words
        .iter()
        .find(|word| !word.is_empty() && joined.contains(&word.to_lowercase()))
    {
        return Some(format!("black word '{}' found", word));
    }

    if !field.required_words.is_empty() {
        let satisfied = field.required_words.iter().any(|group| {
            group
                .0
                .iter()
                .all(|word| joined.contains(&word.to_lowercase()))
        });
        if !satisfied {
            return Some("required words missing".to_string());
        }
    }
    None
}

/// Serialized markup of matched nodes that contain images
fn image_fragments(matched: &[Matched<'_>]) -> Option<Vec<String>> {
    let nodes: Vec<_> = matched
        .iter()
        .filter_map(|m| match m {
            Matched::Node(el) => Some(*el),
            Matched::Value(_) => None,
        })
        .collect();

    let has_images = nodes.iter().any(|el| !find_images(*el).is_empty());
    has_images.then(|| nodes.iter().map(|el| el.html()).collect())
}

fn string_array(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}
