use super::deferred::resolve_deferred;
use super::detail::{expand_links_of, DetailPage};
use super::{DetailOutcome, ExtractedItem, PageContext};
use crate::config::{CollectorSpec, CrawlSpec};
use crate::crawler::{aggregate_links, FetchResponse};
use crate::document::{select_within, HtmlDocument};
use crate::storage::write_index;
use crate::url::{page_location, resolve_link};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use url::Url;

/// Result of extracting a listing page
#[derive(Debug, Default)]
pub struct ListingResult {
    /// Valid, non-empty items per data item name
    pub data: BTreeMap<String, Vec<ExtractedItem>>,
    /// Expansion links found on the page and its detail pages
    pub expand_links: BTreeMap<String, u32>,
    pub detail_fetched: usize,
    pub detail_failed: usize,
    pub items_rejected: usize,
    pub items_dropped: usize,
}

impl ListingResult {
    pub fn item_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// A page enumerating item instances
pub struct ListingPage<'s> {
    document: HtmlDocument,
    depth: u32,
    location: String,
    spec: &'s CrawlSpec,
}

/// Where a collector's data comes from for one item instance
enum CollectorSource {
    /// Serialized markup of the item's base element
    Inline { markup: String, tag: String },
    /// Detail links found below the base element
    Links(Vec<String>),
}

struct CollectorPlan<'s> {
    collector: &'s CollectorSpec,
    source: CollectorSource,
}

struct ItemPlan<'s> {
    name: &'s str,
    collectors: Vec<CollectorPlan<'s>>,
}

/// Per-item outcome while assembling
enum ItemState {
    Pending(Option<ExtractedItem>),
    Rejected,
}

impl<'s> ListingPage<'s> {
    /// Parses a fetched listing page
    ///
    /// The storage location is derived from the URL.
    pub fn new(url: &str, body: &[u8], depth: u32, spec: &'s CrawlSpec) -> crate::Result<Self> {
        let parsed = Url::parse(url)?;
        Ok(Self {
            document: HtmlDocument::from_bytes(body, parsed),
            depth,
            location: page_location(url),
            spec,
        })
    }

    pub fn url(&self) -> &Url {
        self.document.url()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn find_expand_links(&self) -> BTreeMap<String, u32> {
        expand_links_of(&self.document, self.depth, self.spec)
    }

    /// Extracts every item on the page
    ///
    /// # Process
    ///
    /// 1. Find expansion links and, per data item, the base elements and
    ///    each collector's source (inline markup or detail links)
    /// 2. Fetch the detail links of all items in one batch
    /// 3. Extract each item collector by collector; an invalid detail page
    ///    discards the whole item and skips its remaining collectors
    /// 4. Resolve deferred downloads of the items that remain
    /// 5. Drop empty items and write the page's index record
    pub async fn extract_data(self, ctx: &PageContext) -> ListingResult {
        let ListingPage {
            document,
            depth,
            location,
            spec,
        } = self;
        let page_url = document.url().clone();
        tracing::info!("Extracting listing page {} (depth {})", page_url, depth);

        let mut expand_links = expand_links_of(&document, depth, spec);
        let plans = plan_items(&document, spec);
        drop(document);

        let detail_urls: Vec<String> = plans
            .iter()
            .flat_map(|item| &item.collectors)
            .filter_map(|plan| match &plan.source {
                CollectorSource::Links(links) => Some(links.iter().cloned()),
                CollectorSource::Inline { .. } => None,
            })
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        tracing::info!("Found {} detail links on {}", detail_urls.len(), page_url);

        let sources = ctx.fetcher.fetch(&detail_urls, ctx.concurrency).await;
        let detail_fetched = detail_urls.iter().filter(|u| sources.contains_key(*u)).count();

        let mut states = Vec::with_capacity(plans.len());
        for plan in &plans {
            let mut state = ItemState::Pending(None);
            'collectors: for collector_plan in &plan.collectors {
                let pages = detail_pages(collector_plan, &sources, &page_url, depth, &location, spec);
                for page in pages {
                    let result = page.extract();
                    aggregate_links(&mut expand_links, result.expand_links, spec.max_depth);
                    match result.outcome {
                        DetailOutcome::Invalid => {
                            state = ItemState::Rejected;
                            break 'collectors;
                        }
                        DetailOutcome::Valid(extracted) => {
                            if let ItemState::Pending(slot) = &mut state {
                                slot.get_or_insert_with(ExtractedItem::default).merge(extracted);
                            }
                        }
                    }
                }
            }
            states.push((plan.name, state));
        }

        let mut result = ListingResult {
            detail_fetched,
            detail_failed: detail_urls.len() - detail_fetched,
            ..ListingResult::default()
        };
        for item_spec in &spec.data_items {
            result.data.entry(item_spec.name.clone()).or_default();
        }

        for (name, state) in states {
            match state {
                ItemState::Rejected => result.items_rejected += 1,
                ItemState::Pending(None) => result.items_dropped += 1,
                ItemState::Pending(Some(mut item)) => {
                    if item.has_deferred() {
                        resolve_deferred(&mut item, &ctx.downloader, &location).await;
                    }
                    item.deferred = None;
                    if item.is_empty() {
                        result.items_dropped += 1;
                    } else {
                        result.data.entry(name.to_string()).or_default().push(item);
                    }
                }
            }
        }

        if let Err(e) = write_index(ctx.sink.as_ref(), &location, page_url.as_str(), &result.data) {
            tracing::warn!("Failed to write index for {}: {}", page_url, e);
        }

        tracing::info!(
            "Listing page {}: {} item(s) kept, {} rejected, {} empty",
            page_url,
            result.item_count(),
            result.items_rejected,
            result.items_dropped
        );
        result.expand_links = expand_links;
        result
    }
}

/// Locates item instances and the sources of their collectors
fn plan_items<'s>(document: &HtmlDocument, spec: &'s CrawlSpec) -> Vec<ItemPlan<'s>> {
    let mut plans = Vec::new();
    for item_spec in &spec.data_items {
        let bases = match item_spec.base_path() {
            Some(path) => document.query(path),
            None => vec![document.root()],
        };
        tracing::debug!("Found {} '{}' item(s)", bases.len(), item_spec.name);

        for base in bases {
            let collectors = item_spec
                .collectors
                .iter()
                .map(|collector| {
                    let source = match collector.link_path() {
                        None => CollectorSource::Inline {
                            markup: base.html(),
                            tag: base.value().name().to_string(),
                        },
                        Some(path) => CollectorSource::Links(
                            select_within(base, path)
                                .into_iter()
                                .filter_map(|el| el.value().attr("href"))
                                .filter_map(|href| resolve_link(document.url(), href))
                                .collect(),
                        ),
                    };
                    CollectorPlan { collector, source }
                })
                .collect();
            plans.push(ItemPlan {
                name: &item_spec.name,
                collectors,
            });
        }
    }
    plans
}

/// Builds the detail pages of one collector; links whose fetch failed are skipped
fn detail_pages<'s>(
    plan: &CollectorPlan<'s>,
    sources: &HashMap<String, FetchResponse>,
    page_url: &Url,
    depth: u32,
    location: &str,
    spec: &'s CrawlSpec,
) -> Vec<DetailPage<'s>> {
    match &plan.source {
        CollectorSource::Inline { markup, tag } => {
            let document = HtmlDocument::from_fragment(markup, tag, page_url.clone());
            vec![DetailPage::new(document, depth, location, spec, plan.collector)]
        }
        CollectorSource::Links(links) => links
            .iter()
            .filter_map(|link| {
                let response = sources.get(link)?;
                let url = Url::parse(&response.final_url)
                    .or_else(|_| Url::parse(link))
                    .ok()?;
                let document = HtmlDocument::from_bytes(&response.body, url);
                Some(DetailPage::new(document, depth + 1, location, spec, plan.collector))
            })
            .collect(),
    }
}
