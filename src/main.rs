//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest site harvester.

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::output::print_statistics;
use sumi_harvest::storage::{finalize_run, FsStorage, ResultStore, SqliteResultStore};
use sumi_harvest::CrawlRunner;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a rule-driven site harvester
///
/// Sumi-Harvest crawls listing pages and their detail pages according to a
/// declarative spec, validates every extracted item against its word rules
/// and stores the surviving records together with the files they reference.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A rule-driven site harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["list", "delete"])]
    dry_run: bool,

    /// Identifier of this run (defaults to a timestamp plus config hash)
    #[arg(long, value_name = "ID", conflicts_with_all = ["list", "delete"])]
    task_id: Option<String>,

    /// List stored results and exit
    #[arg(long, conflicts_with_all = ["dry_run", "delete"])]
    list: bool,

    /// Delete a stored result and release its files, then exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["dry_run", "list"])]
    delete: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.list {
        handle_list(&config)?;
    } else if let Some(task_id) = &cli.delete {
        handle_delete(&config, task_id)?;
    } else {
        let task_id = cli
            .task_id
            .clone()
            .unwrap_or_else(|| default_task_id(&config_hash));
        handle_harvest(config, &task_id).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds a run identifier from the current time and the config hash
fn default_task_id(config_hash: &str) -> String {
    let short_hash = config_hash.get(..8).unwrap_or(config_hash);
    format!("{}-{}", Local::now().format("%Y%m%d-%H%M%S"), short_hash)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Engine Configuration:");
    println!("  Concurrency: {}", config.engine.concurrency);
    println!("  Timeout: {}s", config.engine.timeout_secs);
    println!("  Strict status check: {}", config.engine.strict);
    if let Some(proxy) = &config.engine.proxy {
        println!("  Proxy: {}", proxy);
    }
    println!("  Work dir: {}", config.engine.work_dir.display());
    println!("  Storage dir: {}", config.engine.storage_dir.display());
    println!("  Database: {}", config.engine.database_path.display());

    let spec = &config.spider;
    println!("\nSpider '{}':", spec.name);
    println!("  Max depth: {}", spec.max_depth);
    if spec.expand_links.is_empty() {
        println!("  Expansion links: every anchor");
    } else {
        println!("  Expansion links: {}", spec.expand_links.join(", "));
    }

    println!("\nData Items ({}):", spec.data_items.len());
    for item in &spec.data_items {
        println!(
            "  - {} (base: {}, {} collector(s))",
            item.name,
            item.base_path().unwrap_or("<page>"),
            item.collectors.len()
        );
        for collector in &item.collectors {
            let keys: Vec<&str> = collector.selectors.iter().map(|s| s.key.as_str()).collect();
            println!(
                "    * {} -> [{}]",
                collector.link_path().unwrap_or("<inline>"),
                keys.join(", ")
            );
        }
    }

    let roots = spec.root_urls()?;
    println!("\nRoot URLs ({}):", roots.len());
    for url in &roots {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start harvesting with {} root URLs", roots.len());

    Ok(())
}

/// Handles the --list mode: shows stored results
fn handle_list(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.engine.database_path.display());

    let store = SqliteResultStore::new(&config.engine.database_path)?;
    let results = store.list_results()?;
    if results.is_empty() {
        println!("No stored results");
        return Ok(());
    }

    for record in results {
        let items: usize = record
            .data
            .as_object()
            .map(|data| {
                data.values()
                    .filter_map(|items| items.as_array())
                    .map(Vec::len)
                    .sum()
            })
            .unwrap_or(0);
        println!(
            "{}  {}  {} item(s)  {}",
            record.task_id,
            record.created_at,
            items,
            record.local_path.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Handles the --delete mode: removes a stored result and its files
fn handle_delete(config: &Config, task_id: &str) -> anyhow::Result<()> {
    let mut store = SqliteResultStore::new(&config.engine.database_path)?;
    let storage = FsStorage::new(&config.engine.storage_dir);

    if store.delete_result(task_id, &storage)? {
        println!("✓ Deleted result {}", task_id);
    } else {
        println!("No result with ID {}", task_id);
    }

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, task_id: &str) -> anyhow::Result<()> {
    let Config { engine, spider } = config;
    tracing::info!(
        "Starting harvest task {} for spider '{}' ({} data item(s))",
        task_id,
        spider.name,
        spider.data_items.len()
    );

    let work = Arc::new(FsStorage::new(&engine.work_dir));
    let storage = FsStorage::new(&engine.storage_dir);
    let mut store = SqliteResultStore::new(&engine.database_path)?;
    let destination = format!("{}/{}", spider.name, task_id);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            interrupt.cancel();
        }
    });

    let mut runner = CrawlRunner::with_http(spider, engine, work.clone(), cancel)?;
    let result = match runner.run().await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    let target = finalize_run(
        work.as_ref(),
        &storage,
        &destination,
        &result,
        &result.locations,
    )
    .context("failed to finalize harvest")?;

    let data = serde_json::to_value(&result.data)?;
    store.save_result(task_id, &data, Some(destination.as_str()))?;
    tracing::info!("Result {} stored in {}", task_id, target.display());

    println!();
    print_statistics(runner.stats());

    Ok(())
}
