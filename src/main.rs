mod catalog;
mod config;
mod error;
mod fetch;
mod filters;
mod results;
mod scheduler;
mod verify;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::fetch::{DirectFetcher, Fetcher, ProxyFetcher};
use crate::filters::FilterRules;
use crate::results::ResultSet;
use crate::scheduler::{ScanReport, Scheduler};
use crate::verify::Verifier;

#[derive(Parser)]
#[command(name = "handle_probe", about = "Check where a handle is registered across the WhatsMyName catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every catalog site for a handle
    Check {
        handle: String,
        /// Only sites in this category (e.g. "social", "coding")
        #[arg(short, long)]
        category: Option<String>,
        /// Only these sites (repeatable)
        #[arg(short, long = "site")]
        sites: Vec<String>,
        /// Write results to CSV in the results directory
        #[arg(long)]
        csv: bool,
        /// Write results to JSON in the results directory
        #[arg(long)]
        json: bool,
        /// Fetch service endpoint (overrides PROXY_URL)
        #[arg(long)]
        proxy: Option<String>,
        /// Sites per batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Concurrent probes per batch
        #[arg(long)]
        connections: Option<usize>,
        /// Per-probe timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Show catalog size per category
    Catalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("loading settings")?;

    let result = match cli.command {
        Commands::Catalog => {
            let catalog = Catalog::load(&settings.catalog_url, &settings.cache_path()).await?;
            let counts = catalog.category_counts();
            println!("{:<20} | {:>5}", "Category", "Sites");
            println!("{}", "-".repeat(28));
            for (category, count) in &counts {
                println!("{:<20} | {:>5}", truncate(category, 20), count);
            }
            println!("\n{} sites in {} categories", catalog.len(), counts.len());
            Ok(())
        }
        Commands::Check {
            handle,
            category,
            sites,
            csv,
            json,
            proxy,
            batch_size,
            connections,
            timeout,
        } => {
            if let Some(proxy) = proxy {
                settings.proxy_url = Some(proxy);
            }
            if let Some(n) = batch_size {
                settings.batch_size = n;
            }
            if let Some(n) = connections {
                settings.connection_limit = n;
            }
            if let Some(secs) = timeout {
                settings.request_timeout_secs = secs;
            }

            let catalog = Catalog::load(&settings.catalog_url, &settings.cache_path()).await?;
            let catalog = catalog.filtered(category.as_deref(), &sites);
            if catalog.is_empty() {
                println!("No sites match the given filters.");
                return Ok(());
            }

            let fetcher = build_fetcher(&settings)?;
            let scheduler = Scheduler::new(fetcher, Verifier::new(FilterRules::default()), settings.schedule_options());

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing up...");
                    on_interrupt.cancel();
                }
            });

            let (results, report) = scheduler.run(&catalog, &handle, cancel).await?;
            print_results(&results);
            print_report(&report);

            let now = chrono::Local::now().naive_local();
            if csv {
                let path = results.export_path(&settings.results_dir, "csv", now)?;
                results
                    .write_csv(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("CSV written to {}", path.display());
            }
            if json {
                let path = results.export_path(&settings.results_dir, "json", now)?;
                results
                    .write_json(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("JSON written to {}", path.display());
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_fetcher(settings: &Settings) -> anyhow::Result<Arc<dyn Fetcher>> {
    let timeout = Duration::from_secs(settings.fetch_timeout_secs);
    let fetcher: Arc<dyn Fetcher> = match &settings.proxy_url {
        Some(endpoint) => {
            info!("Using fetch service at {}", endpoint);
            Arc::new(ProxyFetcher::new(endpoint.as_str(), timeout)?)
        }
        None => Arc::new(DirectFetcher::new(timeout)?),
    };
    Ok(fetcher)
}

fn print_results(results: &ResultSet) {
    if results.is_empty() {
        println!("\nNo accounts found for '{}'.", results.handle());
        return;
    }

    println!("\n{} accounts found for '{}'", results.len(), results.handle());
    println!(
        "\n{:<24} | {:<12} | {:<16} | {:<48} | {:>5}",
        "Site", "Category", "Status", "URL", "Links"
    );
    println!("{}", "-".repeat(118));

    for record in results.records() {
        let links = record.extraction.as_ref().map_or(0, |e| e.links.len());
        println!(
            "{:<24} | {:<12} | {:<16} | {:<48} | {:>5}",
            truncate(&record.site.name, 24),
            truncate(&record.site.category, 12),
            truncate(&record.verdict.label(), 16),
            truncate(&record.site.url, 48),
            links
        );
    }

    // Per-site details, only where extraction found something
    let detailed: Vec<_> = results
        .records()
        .iter()
        .filter_map(|r| r.extraction.as_ref().map(|e| (r, e)))
        .filter(|(_, e)| !e.links.is_empty() || !e.metadata.is_empty() || !e.content.is_empty())
        .collect();
    if !detailed.is_empty() {
        println!("\n--- Details ---");
        for (record, extraction) in detailed {
            println!("  {}:", record.site.name);
            for link in &extraction.links {
                println!("    -> {}", link);
            }
            let summary = extraction.summary();
            if !summary.is_empty() {
                println!("    {}", truncate(&summary, 200));
            }
        }
    }
}

fn print_report(report: &ScanReport) {
    println!(
        "\n{} matched | {}/{} sites checked | {} failed | {} batches in {}{}",
        report.matched,
        report.processed,
        report.total,
        report.failed,
        report.batches,
        format_duration(report.elapsed),
        if report.cancelled { " | interrupted" } else { "" }
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
