// Background collector: summarizes the trailing window on a schedule and
// stores each report in the history DB, then prunes expired rows.
// Schedule is a cron expression (local time) or a fixed interval.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::history_repo::HistoryRepo;
use crate::models::SummaryReport;
use crate::prom_client::MetricsBackend;
use crate::summary::{MetricsSummary, SummaryOptions};
use crate::window::TimeWindow;
use tracing::{info, instrument, warn};

/// Config for the collector worker.
#[derive(Debug, Clone)]
pub struct CollectorWorkerConfig {
    pub nseconds: i64,
    pub end_offset_secs: i64,
    pub step_secs: i64,
    /// Optional cron expression (e.g. "0 */5 * * * *"). Uses local time.
    pub schedule: Option<String>,
    /// Run every N seconds when schedule is not set.
    pub interval_secs: u64,
}

/// Spawns the collector worker. Returns a join handle.
pub fn spawn<B>(
    backend: Arc<B>,
    repo: Arc<HistoryRepo>,
    options: Arc<SummaryOptions>,
    config: CollectorWorkerConfig,
) -> tokio::task::JoinHandle<()>
where
    B: MetricsBackend + Send + Sync + 'static,
{
    tokio::spawn(async move {
        run(backend, repo, options, config).await;
    })
}

#[instrument(skip(backend, repo, options), fields(nseconds = config.nseconds))]
async fn run<B>(
    backend: Arc<B>,
    repo: Arc<HistoryRepo>,
    options: Arc<SummaryOptions>,
    config: CollectorWorkerConfig,
) where
    B: MetricsBackend + Send + Sync + 'static,
{
    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(scheduler(config.clone(), tick_tx));

    while tick_rx.recv().await.is_some() {
        match run_one_tick(backend.as_ref(), &repo, &options, &config).await {
            Ok(report) => info!(
                values = report.values.len(),
                failures = report.failures.len(),
                "summary stored"
            ),
            Err(e) => warn!(error = %e, "collector tick failed"),
        }
        match repo.prune_old_data().await {
            Ok(n) if n > 0 => info!(pruned = n, "pruned old summaries"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "prune failed"),
        }
    }
}

/// Sends a message on `tx` at each collection time (cron or fixed interval).
async fn scheduler(config: CollectorWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid collector schedule; collection will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Summarizes the trailing window ending now and stores it.
pub async fn run_one_tick<B: MetricsBackend + Sync>(
    backend: &B,
    repo: &HistoryRepo,
    options: &SummaryOptions,
    config: &CollectorWorkerConfig,
) -> anyhow::Result<SummaryReport> {
    let window = TimeWindow::ending_now(config.nseconds, config.end_offset_secs)?
        .with_step(config.step_secs)?;
    collect_and_store(backend, repo, options, window).await
}

/// Runs one summarization pass over `window` and stores the report.
pub async fn collect_and_store<B: MetricsBackend + Sync>(
    backend: &B,
    repo: &HistoryRepo,
    options: &SummaryOptions,
    window: TimeWindow,
) -> anyhow::Result<SummaryReport> {
    let report = MetricsSummary::new(backend, window, options).collect().await;
    let now_ms = chrono::Utc::now().timestamp_millis();
    repo.save_report(&report, now_ms).await?;
    Ok(report)
}
