//! Crawl runner - frontier-driven harvest orchestration
//!
//! The runner owns one crawl from root URLs to the aggregated result:
//! - Seeding the frontier from the spec's root URLs
//! - Fetching each round of listing pages in one batch
//! - Extracting every fetched page and merging its item data
//! - Queueing the expansion links for the next round
//!
//! Rounds are strictly sequential, so a page at depth d is fully processed
//! before any page it discovered starts downloading.

use crate::config::{CrawlSpec, EngineConfig};
use crate::crawler::{aggregate_links, BatchFetcher, Frontier, HttpTransport, Transport};
use crate::extract::{ExtractedItem, ListingPage, PageContext};
use crate::output::RunStats;
use crate::storage::StorageSink;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Aggregated output of a crawl
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlResult {
    /// Extracted items per data item name
    pub data: BTreeMap<String, Vec<ExtractedItem>>,

    /// Work-sink locations written by the crawled listing pages
    pub locations: Vec<String>,
}

impl CrawlResult {
    /// Total number of items across all data item names
    pub fn item_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    fn absorb(&mut self, data: BTreeMap<String, Vec<ExtractedItem>>) {
        for (name, items) in data {
            self.data.entry(name).or_default().extend(items);
        }
    }
}

/// Main crawl runner structure
pub struct CrawlRunner {
    spec: Arc<CrawlSpec>,
    engine: EngineConfig,
    ctx: PageContext,
    cancel: CancellationToken,
    stats: RunStats,
}

impl CrawlRunner {
    /// Creates a runner over an arbitrary transport
    ///
    /// # Arguments
    ///
    /// * `spec` - The crawl spec, read once for the whole run
    /// * `engine` - Engine settings (only `concurrency` is used here)
    /// * `transport` - Transport used for pages and file downloads
    /// * `sink` - Work sink receiving index records and downloaded files
    /// * `cancel` - Token that stops the run between rounds
    pub fn new(
        spec: CrawlSpec,
        engine: EngineConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn StorageSink>,
        cancel: CancellationToken,
    ) -> Self {
        let fetcher = BatchFetcher::new(transport, cancel.clone());
        let ctx = PageContext::new(fetcher, sink, engine.concurrency);
        Self {
            spec: Arc::new(spec),
            engine,
            ctx,
            cancel,
            stats: RunStats::default(),
        }
    }

    /// Creates a runner fetching over HTTP with the engine's client settings
    pub fn with_http(
        spec: CrawlSpec,
        engine: EngineConfig,
        sink: Arc<dyn StorageSink>,
        cancel: CancellationToken,
    ) -> crate::Result<Self> {
        let transport = Arc::new(HttpTransport::new(&engine)?);
        Ok(Self::new(spec, engine, transport, sink, cancel))
    }

    pub fn spec(&self) -> &CrawlSpec {
        &self.spec
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the crawl until the frontier is empty or the run is cancelled
    ///
    /// Failed fetches are counted and skipped; only an invalid root URL
    /// definition fails the run.
    pub async fn run(&mut self) -> crate::Result<CrawlResult> {
        let spec = Arc::clone(&self.spec);
        let roots = spec.root_urls()?;
        tracing::info!(
            "Starting harvest '{}' with {} root URL(s), max depth {}",
            spec.name,
            roots.len(),
            spec.max_depth
        );

        let mut frontier = Frontier::with_roots(&roots, spec.max_depth);
        let mut result = CrawlResult::default();
        for item in &spec.data_items {
            result.data.entry(item.name.clone()).or_default();
        }

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                tracing::warn!("Harvest cancelled with {} page(s) pending", frontier.len());
                self.stats.cancelled = true;
                break;
            }

            self.stats.rounds += 1;
            let round = frontier.take_round();
            tracing::info!(
                "Round {}: fetching {} listing page(s)",
                self.stats.rounds,
                round.len()
            );

            let urls: Vec<String> = round.iter().map(|(url, _)| url.clone()).collect();
            let sources = self.ctx.fetcher.fetch(&urls, self.engine.concurrency).await;

            let mut discovered = BTreeMap::new();
            for (url, depth) in round {
                let Some(response) = sources.get(&url) else {
                    tracing::warn!("Listing page not fetched: {}", url);
                    self.stats.listing_failed += 1;
                    continue;
                };

                let page = match ListingPage::new(&url, &response.body, depth, &spec) {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::warn!("Skipping listing page {}: {}", url, e);
                        self.stats.listing_failed += 1;
                        continue;
                    }
                };
                let location = page.location().to_string();

                let page_result = page.extract_data(&self.ctx).await;
                tracing::debug!(
                    "Listing page {} (depth {}): {} item(s), {} expansion link(s)",
                    url,
                    depth,
                    page_result.item_count(),
                    page_result.expand_links.len()
                );

                self.stats.record_listing(&page_result);
                frontier.mark_visited(&url);
                if !result.locations.contains(&location) {
                    result.locations.push(location);
                }
                aggregate_links(&mut discovered, page_result.expand_links, spec.max_depth);
                result.absorb(page_result.data);
            }

            frontier.extend(discovered);
        }

        tracing::info!(
            "Harvest '{}' finished after {} round(s): {} item(s) from {} page(s)",
            spec.name,
            self.stats.rounds,
            result.item_count(),
            self.stats.listing_fetched
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::crawler::{FetchError, FetchResponse};
    use crate::storage::FsStorage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct PageMap {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl PageMap {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.as_str() == url)
                .count()
        }
    }

    #[async_trait]
    impl Transport for PageMap {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(FetchResponse {
                    final_url: url.to_string(),
                    status_code: 200,
                    content_type: Some("text/html".to_string()),
                    body: body.as_bytes().to_vec(),
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    const CONFIG: &str = r#"
[spider]
name = "runner"
max-depth = 2
expand-links = ["a.next"]

[[spider.urls]]
base = "https://site.test/list"

[[spider.data-items]]
name = "entry"
base = "li"

[[spider.data-items.collectors]]
[[spider.data-items.collectors.selectors]]
key = "title"
path = "span"
"#;

    fn runner(transport: Arc<PageMap>, dir: &TempDir) -> CrawlRunner {
        runner_for(CONFIG, transport, dir)
    }

    fn runner_for(config: &str, transport: Arc<PageMap>, dir: &TempDir) -> CrawlRunner {
        let config = parse_config(config).unwrap();
        CrawlRunner::new(
            config.spider,
            config.engine,
            transport,
            Arc::new(FsStorage::new(dir.path())),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_run_follows_expansion_once() {
        let transport = Arc::new(PageMap::new(&[
            (
                "https://site.test/list",
                r#"<ul><li><span>one</span></li></ul><a class="next" href="/page2">next</a>"#,
            ),
            (
                "https://site.test/page2",
                r#"<ul><li><span>two</span></li></ul><a class="next" href="/list">back</a>"#,
            ),
        ]));
        let dir = TempDir::new().unwrap();
        let mut runner = runner(Arc::clone(&transport), &dir);

        let result = runner.run().await.unwrap();

        let titles: Vec<&str> = result.data["entry"]
            .iter()
            .flat_map(|item| item.values("title"))
            .collect();
        assert_eq!(titles, vec!["one", "two"]);
        assert_eq!(result.locations.len(), 2);
        assert_eq!(runner.stats().rounds, 2);
        assert_eq!(transport.requested("https://site.test/list"), 1);
    }

    #[tokio::test]
    async fn test_root_without_path_not_revisited() {
        let config = CONFIG
            .replace("https://site.test/list", "https://site.test")
            .replace("max-depth = 2", "max-depth = 3");
        let transport = Arc::new(PageMap::new(&[(
            "https://site.test/",
            r#"<ul><li><span>home</span></li></ul><a class="next" href="https://site.test/">home</a>"#,
        )]));
        let dir = TempDir::new().unwrap();
        let mut runner = runner_for(&config, Arc::clone(&transport), &dir);

        let result = runner.run().await.unwrap();

        assert_eq!(result.item_count(), 1);
        assert_eq!(runner.stats().rounds, 1);
        assert_eq!(transport.requested("https://site.test/"), 1);
        assert_eq!(transport.requested("https://site.test"), 0);
    }

    #[tokio::test]
    async fn test_failed_listing_counted() {
        let transport = Arc::new(PageMap::new(&[]));
        let dir = TempDir::new().unwrap();
        let mut runner = runner(transport, &dir);

        let result = runner.run().await.unwrap();

        assert_eq!(result.item_count(), 0);
        assert!(result.data.contains_key("entry"));
        assert!(result.locations.is_empty());
        assert_eq!(runner.stats().listing_failed, 1);
        assert_eq!(runner.stats().rounds, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_round() {
        let transport = Arc::new(PageMap::new(&[]));
        let dir = TempDir::new().unwrap();
        let mut runner = runner(Arc::clone(&transport), &dir);
        runner.cancel_token().cancel();

        let result = runner.run().await.unwrap();

        assert_eq!(result.item_count(), 0);
        assert!(runner.stats().cancelled);
        assert_eq!(runner.stats().rounds, 0);
        assert_eq!(transport.requested("https://site.test/list"), 0);
    }
}
