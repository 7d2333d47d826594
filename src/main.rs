//! doc-crawler main entry point
//!
//! This is the command-line interface for the resumable documentation crawler.

use anyhow::Context;
use clap::Parser;
use doc_crawler::config::{load_config_with_hash, validate, Config};
use doc_crawler::crawler::{crawl, CrawlOutcome};
use doc_crawler::storage::SqliteStore;
use doc_crawler::Canonicalizer;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// doc-crawler: a resumable, same-domain documentation crawler
///
/// Every discovered URL is kept in a SQLite frontier, so an interrupted crawl
/// picks up where it stopped and never fetches a finished page twice.
#[derive(Parser, Debug)]
#[command(name = "doc-crawler")]
#[command(version)]
#[command(about = "A resumable same-domain documentation crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Override the start URL
    #[arg(long)]
    start_url: Option<String>,

    /// Override the allowed domain
    #[arg(long)]
    allowed_domain: Option<String>,

    /// Override the path prefix
    #[arg(long)]
    path_prefix: Option<String>,

    /// Override the number of concurrent dispatches
    #[arg(long)]
    workers: Option<u32>,

    /// Override the number of fetch sessions
    #[arg(long)]
    pool_size: Option<u32>,

    /// Override the database path
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Stop after dispatching this many pages
    #[arg(long)]
    max_pages: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "normalize"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "normalize"])]
    stats: bool,

    /// Re-canonicalize stored URLs, merge duplicates and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    normalize: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(start_url) = &self.start_url {
            config.crawl.start_url = start_url.clone();
        }
        if let Some(domain) = &self.allowed_domain {
            config.crawl.allowed_domain = domain.clone();
        }
        if let Some(prefix) = &self.path_prefix {
            config.crawl.path_prefix = prefix.clone();
        }
        if let Some(workers) = self.workers {
            config.pool.workers = workers;
        }
        if let Some(pool_size) = self.pool_size {
            config.pool.pool_size = pool_size;
        }
        if let Some(database) = &self.database {
            config.output.database_path = database.display().to_string();
        }
        if self.max_pages.is_some() {
            config.crawl.max_pages = self.max_pages;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    cli.apply_overrides(&mut config);
    validate(&config).context("invalid configuration")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.normalize {
        handle_normalize(&config)?;
    } else {
        handle_crawl(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("doc_crawler=info,warn"),
            1 => EnvFilter::new("doc_crawler=debug,info"),
            2 => EnvFilter::new("doc_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== doc-crawler Dry Run ===\n");

    println!("Scope:");
    println!("  Start URL: {}", config.crawl.start_url);
    println!("  Allowed domain: {}", config.crawl.allowed_domain);
    println!("  Path prefix: {}", config.crawl.path_prefix);
    match config.crawl.max_pages {
        Some(max) => println!("  Max pages per run: {}", max),
        None => println!("  Max pages per run: unlimited"),
    }

    println!("\nConcurrency:");
    println!("  Workers: {}", config.pool.workers);
    println!("  Fetch sessions: {}", config.pool.pool_size);
    println!(
        "  Session recycle interval: {}s",
        config.pool.recycle_interval_secs
    );

    println!("\nRetries:");
    println!("  Attempts per dispatch: {}", config.retry.max_retries);
    println!("  Retry ceiling: {}", config.retry.retry_ceiling);
    println!(
        "  Backoff: {}ms doubling, capped at {}ms",
        config.retry.backoff_base_ms, config.retry.backoff_cap_ms
    );

    println!("\nFetching:");
    println!("  Readiness timeout: {}s", config.fetch.readiness_timeout_secs);
    println!(
        "  Ready title token: {}",
        config.fetch.ready_title_token.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Content selector: {}",
        config.fetch.content_selector.as_deref().unwrap_or("(body)")
    );
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use doc_crawler::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let store = SqliteStore::open(Path::new(&config.output.database_path))
        .context("failed to open the frontier database")?;

    let stats = load_statistics(&store, config.retry.retry_ceiling)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --normalize mode: merges URLs that share a canonical form
fn handle_normalize(config: &Config) -> anyhow::Result<()> {
    println!("=== Normalizing Frontier ===\n");
    println!("Database: {}", config.output.database_path);

    let canonicalizer = Canonicalizer::new(&config.crawl.allowed_domain, &config.crawl.path_prefix)?;
    let mut store = SqliteStore::open(Path::new(&config.output.database_path))
        .context("failed to open the frontier database")?;

    let report = store.merge_duplicates(&canonicalizer)?;

    println!("  Rows scanned: {}", report.scanned);
    println!("  Duplicates merged: {}", report.merged);
    println!("  Rows rewritten: {}", report.rewritten);
    println!("  Out-of-scope rows removed: {}", report.removed_out_of_scope);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} (scope: {})",
        config.crawl.start_url,
        config.crawl.path_prefix
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, finishing in-flight pages (progress is saved)");
                cancel.cancel();
            }
        });
    }

    let report = crawl(config, cancel).await?;

    match report.outcome {
        CrawlOutcome::Interrupted => {
            println!("Interrupted: {}/{} pages done; run again to resume", report.done, report.total)
        }
        _ => println!("Done: {}/{} pages", report.done, report.total),
    }

    Ok(())
}
