use crate::config::types::{
    CollectorSpec, Config, CrawlSpec, DataItemSpec, EngineConfig, RootUrl,
};
use crate::ConfigError;
use regex::RegexBuilder;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_crawl_spec(&config.spider)?;
    Ok(())
}

/// Validates engine configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates a crawl spec
pub fn validate_crawl_spec(spec: &CrawlSpec) -> Result<(), ConfigError> {
    if spec.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "spider name cannot be empty".to_string(),
        ));
    }

    if spec.max_depth < 1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be >= 1, got {}",
            spec.max_depth
        )));
    }

    if spec.urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "spider '{}' must have at least one root URL",
            spec.name
        )));
    }

    for root in &spec.urls {
        validate_root_url(root)?;
    }

    for path in &spec.expand_links {
        validate_selector(path)?;
    }

    if spec.data_items.is_empty() {
        return Err(ConfigError::Validation(format!(
            "spider '{}' must have at least one data item",
            spec.name
        )));
    }

    for item in &spec.data_items {
        validate_data_item(item)?;
    }

    Ok(())
}

fn validate_root_url(root: &RootUrl) -> Result<(), ConfigError> {
    if let Some(pattern) = &root.number_pattern {
        if pattern.len() != 3 {
            return Err(ConfigError::Validation(format!(
                "number pattern for '{}' must be [start, stop, step], got {:?}",
                root.base, pattern
            )));
        }
        if pattern.iter().any(|n| *n < 0) {
            return Err(ConfigError::Validation(format!(
                "number pattern for '{}' must contain non-negative integers, got {:?}",
                root.base, pattern
            )));
        }
        if pattern[2] == 0 {
            return Err(ConfigError::Validation(format!(
                "number pattern step for '{}' must be > 0",
                root.base
            )));
        }
    }

    // Validate the URL with the first substitution in place
    let sample = root.base.replace("{0}", "0");
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid root URL '{}': {}", root.base, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Root URL '{}' must use http or https",
            root.base
        )));
    }

    Ok(())
}

fn validate_data_item(item: &DataItemSpec) -> Result<(), ConfigError> {
    if item.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "data item name cannot be empty".to_string(),
        ));
    }

    if let Some(base) = item.base_path() {
        validate_selector(base)?;
    }

    for collector in &item.collectors {
        validate_collector(&item.name, collector)?;
    }

    Ok(())
}

fn validate_collector(item_name: &str, collector: &CollectorSpec) -> Result<(), ConfigError> {
    if let Some(link) = collector.link_path() {
        validate_selector(link)?;
    }

    for rule in &collector.replace_rules {
        RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidRule {
                rule: rule.pattern.clone(),
                message: e.to_string(),
            })?;
    }

    let mut keys = HashSet::new();
    for selector in &collector.selectors {
        if selector.key.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector key cannot be empty in data item '{}'",
                item_name
            )));
        }
        if !keys.insert(selector.key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate selector key '{}' in data item '{}'",
                selector.key, item_name
            )));
        }
        validate_selector(&selector.path)?;
        if selector.required_words.iter().any(|group| group.0.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "required word groups of '{}' cannot be empty",
                selector.key
            )));
        }
    }

    Ok(())
}

/// Checks that a selector string parses
pub fn validate_selector(path: &str) -> Result<(), ConfigError> {
    Selector::parse(path).map_err(|e| ConfigError::InvalidSelector {
        selector: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}
