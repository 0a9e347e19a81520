//! Wallwatch main entry point
//!
//! This is the command-line interface for the Wallwatch community monitor.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wallwatch::config::{load_config_with_hash, Config};
use wallwatch::crawler::{BulkConfig, CrawlOptions};
use wallwatch::output::{generate_markdown_report, generate_summary, print_statistics};
use wallwatch::server::{self, AppState};
use wallwatch::storage::{self, SharedStorage};
use wallwatch::tasks::{TaskFilter, TaskRegistry, TaskStatus};
use wallwatch::CrawlOrchestrator;

/// Wallwatch: keyword monitoring for community walls
///
/// Wallwatch crawls the walls of configured communities through the
/// upstream API while respecting its rate limits, scans new comments for
/// keywords and their word forms, and records every crawl as a task.
#[derive(Parser, Debug)]
#[command(name = "wallwatch")]
#[command(version = "1.0.0")]
#[command(about = "Keyword monitoring for community walls", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP interface
    Serve,

    /// Crawl one group and wait for it to finish
    Crawl {
        /// Group to crawl
        #[arg(long)]
        group: i64,

        /// Posts to check, overriding the group's limit
        #[arg(long)]
        max_posts: Option<u32>,
    },

    /// Crawl every active group with bounded concurrency
    Bulk {
        /// Groups crawled at once (defaults to [crawler] max-concurrent)
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Re-scan stored comments against the current keywords
        #[arg(long)]
        force_reparse: bool,
    },

    /// Show task and content statistics
    Stats,

    /// List recorded tasks, newest first
    Tasks {
        /// Only tasks in this status (pending, running, completed, failed, stopped)
        #[arg(long)]
        status: Option<String>,
    },

    /// Write configured groups and keywords into storage
    Sync,

    /// Write a markdown report
    ExportSummary {
        /// Output path for the report
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let storage = storage::open_shared(Path::new(&config.storage.database_path))
        .context("failed to open the database")?;
    let registry =
        TaskRegistry::from_config(&config.storage).context("failed to open the task registry")?;

    match cli.command {
        Command::Serve => handle_serve(&config, &config_hash, storage, registry).await,
        Command::Crawl { group, max_posts } => {
            handle_crawl(&config, &config_hash, storage, registry, group, max_posts).await
        }
        Command::Bulk {
            max_concurrent,
            force_reparse,
        } => {
            let bulk = BulkConfig {
                max_concurrent,
                force_reparse,
                ..BulkConfig::default()
            };
            handle_bulk(&config, &config_hash, storage, registry, bulk).await
        }
        Command::Stats => handle_stats(&storage, &registry),
        Command::Tasks { status } => handle_tasks(&registry, status.as_deref()),
        Command::Sync => sync(&config, &storage),
        Command::ExportSummary { path } => handle_export_summary(&storage, &registry, &path),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wallwatch=info,warn"),
            1 => EnvFilter::new("wallwatch=debug,info"),
            2 => EnvFilter::new("wallwatch=trace,debug"),
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

fn sync(config: &Config, storage: &SharedStorage) -> anyhow::Result<()> {
    let mut guard = storage::lock(storage)?;
    let (groups, keywords) = storage::sync_config(&mut *guard, config)?;
    println!("✓ Synchronised {} groups and {} keywords", groups, keywords);
    Ok(())
}

fn orchestrator(
    config: &Config,
    config_hash: &str,
    storage: SharedStorage,
    registry: TaskRegistry,
) -> anyhow::Result<CrawlOrchestrator> {
    Ok(CrawlOrchestrator::from_config(config, storage, registry)?.with_config_hash(config_hash))
}

/// Handles `serve`: syncs configuration, then serves HTTP until interrupted
async fn handle_serve(
    config: &Config,
    config_hash: &str,
    storage: SharedStorage,
    registry: TaskRegistry,
) -> anyhow::Result<()> {
    sync(config, &storage)?;
    let orchestrator = orchestrator(config, config_hash, storage, registry)?;
    server::serve(AppState::new(orchestrator), &config.server.bind).await?;
    Ok(())
}

/// Handles `crawl`: one group, waiting for the task to finish
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    storage: SharedStorage,
    registry: TaskRegistry,
    group: i64,
    max_posts: Option<u32>,
) -> anyhow::Result<()> {
    sync(config, &storage)?;
    let orchestrator = orchestrator(config, config_hash, storage, registry)?;

    let options = CrawlOptions {
        max_posts,
        ..CrawlOptions::default()
    };
    let handle = orchestrator.start(vec![group], options)?;
    println!("Task {} started for group {}", handle.id(), group);

    let task = handle.wait().await?;
    println!("Task {} finished: {}", task.id, task.status);
    println!(
        "  Posts: {} ({} skipped), comments: {} ({} new), keyword matches: {}",
        task.stats.posts_processed,
        task.stats.posts_skipped,
        task.stats.comments_found,
        task.stats.new_comments,
        task.stats.keyword_matches
    );
    if let Some(error) = &task.error_message {
        println!("  Error: {}", error);
    }

    if task.status == TaskStatus::Failed {
        anyhow::bail!("crawl of group {} failed", group);
    }
    Ok(())
}

/// Handles `bulk`: every active group, bounded by max-concurrent
async fn handle_bulk(
    config: &Config,
    config_hash: &str,
    storage: SharedStorage,
    registry: TaskRegistry,
    bulk: BulkConfig,
) -> anyhow::Result<()> {
    sync(config, &storage)?;
    let orchestrator = orchestrator(config, config_hash, storage, registry)?;

    let result = orchestrator.start_bulk(bulk).await?;

    println!(
        "Crawled {} groups ({} tasks started)",
        result.total_groups, result.started_tasks
    );
    for task in &result.tasks {
        println!(
            "  {:?}: {} ({} new comments, {} matches)",
            task.group_ids, task.status, task.stats.new_comments, task.stats.keyword_matches
        );
    }
    if !result.failed_groups.is_empty() {
        println!("\nFailed groups ({}):", result.failed_groups.len());
        for failure in &result.failed_groups {
            println!("  - {}: {}", failure.group_id, failure.error);
        }
    }
    Ok(())
}

/// Handles `stats`: shows statistics from the database and task registry
fn handle_stats(storage: &SharedStorage, registry: &TaskRegistry) -> anyhow::Result<()> {
    let summary = generate_summary(&*storage::lock(storage)?, registry)?;
    print_statistics(&summary);
    Ok(())
}

/// Handles `tasks`: lists the most recent tasks
fn handle_tasks(registry: &TaskRegistry, status: Option<&str>) -> anyhow::Result<()> {
    let status = match status {
        Some(s) => Some(
            TaskStatus::from_db_string(s)
                .with_context(|| format!("unknown task status '{}'", s))?,
        ),
        None => None,
    };
    let filter = TaskFilter {
        status,
        group_id: None,
    };

    let page = registry.list(&filter, 1, 50)?;
    println!("Tasks ({} total):", page.total);
    for task in &page.items {
        println!(
            "  {} {:<9} groups={:?} posts={} new_comments={} matches={}",
            task.id,
            task.status.to_string(),
            task.group_ids,
            task.stats.posts_processed,
            task.stats.new_comments,
            task.stats.keyword_matches
        );
    }
    Ok(())
}

/// Handles `export-summary`: generates a markdown report
fn handle_export_summary(
    storage: &SharedStorage,
    registry: &TaskRegistry,
    path: &Path,
) -> anyhow::Result<()> {
    println!("=== Exporting Report ===\n");
    println!("Output: {}", path.display());

    tracing::info!("Loading monitor data from database...");
    let summary = generate_summary(&*storage::lock(storage)?, registry)?;

    tracing::info!("Generating markdown report...");
    generate_markdown_report(&summary, path)?;

    println!("✓ Report exported to: {}", path.display());
    Ok(())
}
