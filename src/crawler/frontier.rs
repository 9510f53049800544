//! Frontier of listing pages awaiting a crawl round
//!
//! The frontier maps each pending URL to the smallest depth it was
//! discovered at. URLs that have already been processed are remembered in
//! the visited set and are never queued again.

use std::collections::{BTreeMap, HashSet};

/// Merges newly discovered links into a URL → depth map
///
/// A URL's recorded depth becomes the minimum over every discovery; a URL
/// not yet in `current` is compared against `max_depth`.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use sumi_harvest::crawler::aggregate_links;
///
/// let mut current = BTreeMap::new();
/// aggregate_links(&mut current, [("https://e.com/a".to_string(), 3)], 5);
/// aggregate_links(&mut current, [("https://e.com/a".to_string(), 2)], 5);
/// assert_eq!(current["https://e.com/a"], 2);
/// ```
pub fn aggregate_links(
    current: &mut BTreeMap<String, u32>,
    discovered: impl IntoIterator<Item = (String, u32)>,
    max_depth: u32,
) {
    for (url, depth) in discovered {
        let recorded = current.get(&url).copied().unwrap_or(max_depth);
        current.insert(url, recorded.min(depth));
    }
}

/// Pending listing pages plus the set of pages already processed
#[derive(Debug)]
pub struct Frontier {
    max_depth: u32,
    pending: BTreeMap<String, u32>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            pending: BTreeMap::new(),
            visited: HashSet::new(),
        }
    }

    /// Creates a frontier seeded with root URLs at depth 1
    pub fn with_roots(roots: &[String], max_depth: u32) -> Self {
        let mut frontier = Self::new(max_depth);
        frontier.extend(roots.iter().map(|url| (url.clone(), 1)));
        frontier
    }

    /// Queues discovered links for the next round
    ///
    /// Visited URLs and links deeper than the maximum depth are ignored.
    pub fn extend(&mut self, links: impl IntoIterator<Item = (String, u32)>) {
        let max_depth = self.max_depth;
        let visited = &self.visited;
        let accepted: Vec<(String, u32)> = links
            .into_iter()
            .filter(|(url, depth)| *depth <= max_depth && !visited.contains(url))
            .collect();
        aggregate_links(&mut self.pending, accepted, max_depth);
    }

    /// Removes and returns every pending URL with its recorded depth
    ///
    /// URLs come out in lexical order.
    pub fn take_round(&mut self) -> Vec<(String, u32)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Records a URL as processed; it will never be queued again
    pub fn mark_visited(&mut self, url: &str) {
        self.pending.remove(url);
        self.visited.insert(url.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn depth_of(&self, url: &str) -> Option<u32> {
        self.pending.get(url).copied()
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}
