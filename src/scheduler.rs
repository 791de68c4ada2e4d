use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{Catalog, SiteDefinition};
use crate::error::{ProbeError, Result};
use crate::fetch::Fetcher;
use crate::results::{ResultRecord, ResultSet};
use crate::verify::{check_site, Verifier};

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub batch_size: usize,
    /// Batches kept in flight at once.
    pub concurrent_batches: usize,
    /// Concurrent probes within one batch.
    pub connection_limit: usize,
    pub request_timeout: Duration,
    /// Pause between batch pairs.
    pub progress_delay: Duration,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        ScheduleOptions {
            batch_size: 50,
            concurrent_batches: 2,
            connection_limit: 50,
            request_timeout: Duration::from_secs(15),
            progress_delay: Duration::from_millis(10),
        }
    }
}

/// Run stats returned after completion.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub total: usize,
    pub processed: usize,
    pub matched: usize,
    pub failed: usize,
    pub batches: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    records: Vec<ResultRecord>,
    completed: usize,
    failed: usize,
    cancelled: bool,
}

/// Consecutive chunks of at most `size` sites, last one possibly shorter.
pub fn partition(sites: &[Arc<SiteDefinition>], size: usize) -> Vec<&[Arc<SiteDefinition>]> {
    sites.chunks(size.max(1)).collect()
}

pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    verifier: Arc<Verifier>,
    options: ScheduleOptions,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn Fetcher>, verifier: Verifier, options: ScheduleOptions) -> Self {
        Scheduler {
            fetcher,
            verifier: Arc::new(verifier),
            options,
        }
    }

    /// Probe every catalog site for `handle`. Results are merged a whole
    /// batch at a time; on cancellation the records gathered so far are
    /// returned with `cancelled` set.
    pub async fn run(
        &self,
        catalog: &Catalog,
        handle: &str,
        cancel: CancellationToken,
    ) -> Result<(ResultSet, ScanReport)> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(ProbeError::EmptyInput);
        }

        let start = Instant::now();
        let batches = partition(catalog.sites(), self.options.batch_size);
        let mut results = ResultSet::new(handle);
        let mut report = ScanReport {
            total: catalog.len(),
            batches: batches.len(),
            ..Default::default()
        };

        info!(
            "Checking {} sites for '{}' ({} batches of {})",
            report.total,
            handle,
            report.batches,
            self.options.batch_size
        );

        let pb = ProgressBar::new(report.total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        for group in batches.chunks(self.options.concurrent_batches.max(1)) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcomes = join_all(
                group
                    .iter()
                    .map(|batch| self.run_batch(batch, handle, &cancel, &pb)),
            )
            .await;

            for outcome in outcomes {
                report.processed += outcome.completed + outcome.failed;
                report.failed += outcome.failed;
                report.matched += results.extend_batch(outcome.records);
                report.cancelled |= outcome.cancelled;
            }

            pb.set_message(format!("{} matched", report.matched));
            info!(
                processed = report.processed,
                matched = report.matched,
                failed = report.failed,
                "Progress: {}/{} sites",
                report.processed,
                report.total
            );

            if report.cancelled {
                break;
            }
            tokio::time::sleep(self.options.progress_delay).await;
        }

        pb.finish_and_clear();
        report.elapsed = start.elapsed();
        if report.cancelled {
            warn!(
                "Scan interrupted after {}/{} sites",
                report.processed, report.total
            );
        }

        Ok((results, report))
    }

    /// Probe one batch under its own connection limit. A failed, timed-out
    /// or panicked task only counts against itself.
    async fn run_batch(
        &self,
        batch: &[Arc<SiteDefinition>],
        handle: &str,
        cancel: &CancellationToken,
        pb: &ProgressBar,
    ) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.options.connection_limit.max(1)));
        let mut tasks = JoinSet::new();

        for site in batch {
            let site = Arc::clone(site);
            let fetcher = Arc::clone(&self.fetcher);
            let verifier = Arc::clone(&self.verifier);
            let sem = Arc::clone(&semaphore);
            let handle = handle.to_string();
            let timeout = self.options.request_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return Err(ProbeError::ProbeFailure {
                        site: site.name.clone(),
                        kind: "cancelled".into(),
                        message: "connection pool closed".into(),
                    });
                };
                let probe = check_site(fetcher.as_ref(), &verifier, &site, &handle);
                match tokio::time::timeout(timeout, probe).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::ProbeFailure {
                        site: site.name.clone(),
                        kind: "timeout".into(),
                        message: format!("no response within {:.1}s", timeout.as_secs_f64()),
                    }),
                }
            });
        }

        let mut outcome = BatchOutcome::default();
        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            pb.inc(1);
            match joined {
                Ok(Ok(Some(record))) => {
                    pb.println(format!(
                        "[+] {} ({}): {}",
                        record.site.name,
                        record.verdict.label(),
                        record.site.url
                    ));
                    outcome.completed += 1;
                    outcome.records.push(record);
                }
                Ok(Ok(None)) => outcome.completed += 1,
                Ok(Err(e)) => {
                    warn!("{}", e);
                    outcome.failed += 1;
                }
                Err(e) => {
                    warn!("Probe task failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        tasks.abort_all();
        outcome
    }
}
