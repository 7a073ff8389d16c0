//! pagesift main entry point
//!
//! This is the command-line interface for the pagesift table scraper.

use anyhow::{bail, Context};
use clap::Parser;
use pagesift::config::{load_config_with_hash, Config, JobConfig};
use pagesift::output::print_summary;
use pagesift::scrape::{build_http_client, reset_job_state, RetryPolicy, RetryingFetcher};
use pagesift::storage::open_checkpoint;
use pagesift::{Job, Pipeline, TracingEventSink};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// pagesift: a resumable paginated table scraper
///
/// pagesift fetches every page of a paginated listing, turns table rows into
/// CSV records and checkpoints progress so an interrupted run resumes where
/// the completed pages end.
#[derive(Parser, Debug)]
#[command(name = "pagesift")]
#[command(version)]
#[command(about = "A resumable paginated table scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Run only the named job (repeatable; default is every job)
    #[arg(long = "job", value_name = "NAME")]
    jobs: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Delete checkpoints and outputs before running
    #[arg(long, conflicts_with = "dry_run")]
    fresh: bool,

    /// Validate config and show what would be scraped without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let selected = select_jobs(&config, &cli.jobs)?;

    if cli.dry_run {
        handle_dry_run(&config, &selected)?;
    } else {
        handle_scrape(&config, &selected, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagesift=info,warn"),
            1 => EnvFilter::new("pagesift=debug,info"),
            2 => EnvFilter::new("pagesift=trace,debug"),
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

/// Picks the jobs named on the command line, or all of them
fn select_jobs<'a>(config: &'a Config, names: &[String]) -> anyhow::Result<Vec<&'a JobConfig>> {
    if names.is_empty() {
        return Ok(config.jobs.iter().collect());
    }

    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        match config.jobs.iter().find(|job| &job.name == name) {
            Some(job) => selected.push(job),
            None => bail!("no job named '{}' in configuration", name),
        }
    }
    Ok(selected)
}

/// Handles the --dry-run mode: validates config and shows each job's plan
fn handle_dry_run(config: &Config, jobs: &[&JobConfig]) -> anyhow::Result<()> {
    println!("=== pagesift Dry Run ===\n");

    println!("HTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Request timeout: {}s", config.http.request_timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);
    if let Some(ca_cert) = &config.http.ca_cert {
        println!("  Extra root certificate: {}", ca_cert);
    }
    println!("  Retry backoff unit: {}ms", config.retry.backoff_unit_ms);

    println!("\nJobs ({}):", jobs.len());
    for job_config in jobs {
        let job = Job::from_config(job_config)?;
        let checkpoint = open_checkpoint(&job.output)?;

        println!("  - {}", job.name);
        println!("    Listing: {}", job.base_url);
        println!("    Output: {}", job.output.display());
        println!("    Columns: {}", job.columns.join(", "));
        println!("    Concurrency: {}", job.concurrency);
        println!("    Max pages: {}", job.max_pages);
        match checkpoint.load() {
            0 => println!("    Starts at page 1"),
            frontier => println!(
                "    Resumes at page {} (checkpoint {})",
                checkpoint.next_page(),
                frontier
            ),
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Runs the selected jobs one after another
async fn handle_scrape(config: &Config, jobs: &[&JobConfig], fresh: bool) -> anyhow::Result<()> {
    let client = build_http_client(&config.http).context("failed to build HTTP client")?;
    let fetcher = RetryingFetcher::new(client, RetryPolicy::from_config(&config.retry));
    let interrupted = Arc::new(AtomicBool::new(false));

    for job_config in jobs {
        let job = Job::from_config(job_config)?;
        if fresh {
            tracing::info!("Starting job '{}' fresh", job.name);
            reset_job_state(&job)?;
        }

        let name = job.name.clone();
        let mut pipeline = Pipeline::new(job, fetcher.clone(), Arc::new(TracingEventSink));

        let handle = pipeline.handle();
        let flag = interrupted.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, letting in-flight pages finish");
                flag.store(true, Ordering::SeqCst);
                handle.cancel();
            }
        });

        let result = pipeline.run().await;
        watcher.abort();

        let summary = result.with_context(|| format!("job '{}' failed", name))?;
        print_summary(&summary);

        if interrupted.load(Ordering::SeqCst) {
            tracing::warn!("Stopping after interrupted job '{}'", name);
            break;
        }
    }

    Ok(())
}
