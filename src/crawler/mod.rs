//! Crawler module for page fetching and frontier traversal
//!
//! This module contains the core crawling logic, including:
//! - The [`Transport`] seam and its reqwest-backed [`HttpTransport`]
//! - Bounded concurrent batch fetching with cancellation
//! - The frontier of pending listing pages with minimum-depth tracking
//! - The [`CrawlRunner`] driving rounds until the frontier is empty

mod batch;
mod fetcher;
mod frontier;
mod runner;

pub use batch::BatchFetcher;
pub use fetcher::{build_http_client, FetchError, FetchResponse, HttpTransport, Transport};
pub use frontier::{aggregate_links, Frontier};
pub use runner::{CrawlResult, CrawlRunner};
