//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating the TOML file that
//! carries both the engine settings and the crawl spec.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Spider {} crawls to depth {}", config.spider.name, config.spider.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CollectorSpec, Config, ContentKind, CrawlSpec, DataItemSpec, EngineConfig,
    FieldSelectorSpec, ReplaceRule, RootUrl, WordGroup,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, SpecProvider,
    TomlSpecProvider,
};
pub use validation::{validate_crawl_spec, validate_selector};

use crate::UrlResult;

impl CrawlSpec {
    /// Expands every root URL entry into concrete URLs, in declaration order
    ///
    /// Each URL is normalized the way discovered links are, so a link back
    /// to a root matches the root's visited entry.
    pub fn root_urls(&self) -> UrlResult<Vec<String>> {
        let mut urls = Vec::new();
        for root in &self.urls {
            for generated in crate::url::generate_urls(root)? {
                let url = crate::url::normalize_url(&generated)?;
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }
}
