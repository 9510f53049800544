//! Concurrent batch fetching
//!
//! A batch is a set of URLs fetched by a bounded number of workers sharing
//! one queue. Workers stop pulling new URLs once the run is cancelled;
//! requests already in flight are allowed to finish.

use super::fetcher::{FetchResponse, Transport};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fetches groups of URLs concurrently through a [`Transport`]
#[derive(Clone)]
pub struct BatchFetcher {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl BatchFetcher {
    pub fn new(transport: Arc<dyn Transport>, cancel: CancellationToken) -> Self {
        Self { transport, cancel }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetches every URL with at most `concurrency` requests in flight
    ///
    /// Duplicate URLs are fetched once. The result maps each URL to its
    /// response; URLs whose fetch failed (or never started because the run
    /// was cancelled) are absent.
    pub async fn fetch(&self, urls: &[String], concurrency: usize) -> HashMap<String, FetchResponse> {
        let mut seen = HashSet::new();
        let unique: VecDeque<String> = urls
            .iter()
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect();

        if unique.is_empty() {
            return HashMap::new();
        }

        let workers = concurrency.max(1).min(unique.len());
        tracing::debug!("Fetching {} URLs with {} workers", unique.len(), workers);

        let queue = Arc::new(Mutex::new(unique));
        let results = Arc::new(Mutex::new(HashMap::new()));

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let results = Arc::clone(&results);
            let transport = Arc::clone(&self.transport);
            let cancel = self.cancel.clone();

            set.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        queue.lock().await.clear();
                        break;
                    }

                    let Some(url) = queue.lock().await.pop_front() else {
                        break;
                    };

                    match transport.get(&url).await {
                        Ok(response) => {
                            results.lock().await.insert(url, response);
                        }
                        Err(e) => {
                            tracing::warn!("Failed to fetch {}: {}", url, e);
                        }
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Fetch worker failed: {}", e);
            }
        }

        let mut results = results.lock().await;
        std::mem::take(&mut *results)
    }
}
