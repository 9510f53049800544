//! Statistics collected while a harvest runs
//!
//! This module provides the counters the runner updates per round and page,
//! and their console rendering.

use crate::extract::ListingResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Number of frontier rounds executed
    pub rounds: usize,

    /// Listing pages fetched and extracted
    pub listing_fetched: usize,

    /// Listing pages whose fetch failed
    pub listing_failed: usize,

    /// Detail pages fetched
    pub detail_fetched: usize,

    /// Detail pages whose fetch failed
    pub detail_failed: usize,

    /// Items kept in the result
    pub items_kept: usize,

    /// Items discarded by a black word or missing required words
    pub items_rejected: usize,

    /// Items dropped because nothing was extracted
    pub items_dropped: usize,

    /// Kept items per data item name
    pub items_by_name: BTreeMap<String, usize>,

    /// Whether the run was cancelled before the frontier emptied
    pub cancelled: bool,
}

impl RunStats {
    /// Adds the counters of one extracted listing page
    pub fn record_listing(&mut self, result: &ListingResult) {
        self.listing_fetched += 1;
        self.detail_fetched += result.detail_fetched;
        self.detail_failed += result.detail_failed;
        self.items_rejected += result.items_rejected;
        self.items_dropped += result.items_dropped;
        for (name, items) in &result.data {
            self.items_kept += items.len();
            *self.items_by_name.entry(name.clone()).or_default() += items.len();
        }
    }

    /// Share of fetched pages (listing and detail) that succeeded, in percent
    pub fn fetch_success_rate(&self) -> f64 {
        let fetched = self.listing_fetched + self.detail_fetched;
        let total = fetched + self.listing_failed + self.detail_failed;
        if total == 0 {
            return 0.0;
        }
        fetched as f64 / total as f64 * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStats) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Rounds: {}", stats.rounds);
    if stats.cancelled {
        println!("  Run was cancelled before completion");
    }
    println!();

    println!("Pages:");
    println!(
        "  Listing pages: {} fetched, {} failed",
        stats.listing_fetched, stats.listing_failed
    );
    println!(
        "  Detail pages: {} fetched, {} failed",
        stats.detail_fetched, stats.detail_failed
    );
    println!();

    println!("Items:");
    println!("  Kept: {}", stats.items_kept);
    for (name, count) in &stats.items_by_name {
        println!("    {}: {}", name, count);
    }
    println!("  Rejected by rule: {}", stats.items_rejected);
    println!("  Dropped (empty): {}", stats.items_dropped);
    println!();

    println!("Fetch Success Rate: {:.1}%", stats.fetch_success_rate());
}
