//! Forum-Loader main entry point
//!
//! This is the command-line interface for the Forum-Loader image downloader.

use anyhow::Context;
use clap::Parser;
use forum_loader::config::{load_config_with_hash, Config};
use forum_loader::crawler::HttpPageFetcher;
use forum_loader::output::{load_statistics, print_block_reports, print_statistics, print_summary};
use forum_loader::{LoaderError, Orchestrator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Forum-Loader: a resumable forum image downloader
///
/// Forum-Loader walks a paginated forum thread, groups the images of each post into
/// numbered blocks and downloads them with per-host limits, retries and resume.
/// Progress is kept in SQLite, so an interrupted run continues where it stopped.
#[derive(Parser, Debug)]
#[command(name = "forum-loader")]
#[command(version = "1.0.0")]
#[command(about = "A resumable forum image downloader", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Process a saved HTML page instead of crawling
    #[arg(long, value_name = "PATH", conflicts_with = "html")]
    html_file: Option<PathBuf>,

    /// Process an HTML string instead of crawling
    #[arg(long, value_name = "STRING")]
    html: Option<String>,

    /// Stop after this many listing pages (overrides [forum] max-pages)
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Re-export every block from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Validate config and show the resolved layout without doing anything
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let orchestrator = Orchestrator::new(&config).context("Failed to initialize")?;

    if cli.stats {
        handle_stats(&orchestrator)?;
    } else if cli.export {
        handle_export(&orchestrator)?;
    } else if let Some(path) = &cli.html_file {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        handle_html(&orchestrator, &html).await?;
    } else if let Some(html) = &cli.html {
        handle_html(&orchestrator, html).await?;
    } else {
        handle_crawl(&orchestrator, &config, cli.max_pages).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_loader=info,warn"),
            1 => EnvFilter::new("forum_loader=debug,info"),
            2 => EnvFilter::new("forum_loader=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Forum-Loader Dry Run ===\n");

    match &config.forum {
        Some(forum) => {
            println!("Forum:");
            println!("  Domain: {}", forum.domain);
            println!("  Start URL: {}", forum.start_url);
            println!(
                "  Pagination: {} ({:?}, {} per page)",
                forum.page_param,
                forum.page_kind(),
                forum.page_size
            );
            match forum.max_pages {
                Some(max) => println!("  Max pages: {}", max),
                None => println!("  Max pages: unlimited"),
            }
        }
        None => println!("Forum: not configured (HTML input only)"),
    }

    let download = &config.download;
    println!("\nDownloads:");
    println!("  Global limit: {}", download.global_limit);
    println!("  Per-host limit: {}", download.per_host_limit);
    println!("  Max retries: {}", download.max_retries);
    println!("  Timeout: {}s", download.timeout_secs);
    println!(
        "  Backoff: {}ms base, {}ms cap, {}ms jitter",
        download.backoff_base_ms, download.backoff_cap_ms, download.jitter_ms
    );

    let layout = config.layout();
    println!("\nOutput:");
    println!("  Database: {}", layout.database_path.display());
    println!("  Images: {}", layout.img_dir.display());
    println!("  Exports: {}", layout.links_dir.display());

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let storage = orchestrator.storage();
    let storage = storage
        .lock()
        .map_err(|_| anyhow::anyhow!("Storage lock poisoned"))?;
    let stats = load_statistics(&*storage)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --export mode: rewrites every block's export snapshot
fn handle_export(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let exported = orchestrator.export_all()?;
    println!(
        "✓ Exported {} blocks to {}",
        exported.len(),
        orchestrator.layout().links_dir.display()
    );
    Ok(())
}

/// Handles --html-file and --html: processes one document
async fn handle_html(orchestrator: &Orchestrator, html: &str) -> anyhow::Result<()> {
    let reports = orchestrator.process_html(html, None).await?;
    println!("Processed {} blocks:", reports.len());
    print_block_reports(&reports);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    orchestrator: &Orchestrator,
    config: &Config,
    max_pages: Option<u32>,
) -> anyhow::Result<()> {
    let forum = config
        .forum
        .as_ref()
        .ok_or(LoaderError::MissingConfig("[forum]"))?;
    tracing::info!("Crawling {}{}", forum.domain, forum.start_url);

    let fetcher = HttpPageFetcher::from_config(config)?;
    match orchestrator.crawl(&fetcher, max_pages).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
