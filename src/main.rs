use anyhow::Result;
use clap::Parser;
use meshperf::checks::run_checks;
use meshperf::cli::{CliArgs, Command, PrometheusArgs, SummaryArgs};
use meshperf::collector_worker::{self, CollectorWorkerConfig};
use meshperf::config::AppConfig;
use meshperf::history_repo::HistoryRepo;
use meshperf::prom_client::PromClient;
use meshperf::summary::MetricsSummary;
use meshperf::window::TimeWindow;
use meshperf::*;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries JSON output; logs go to stderr
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    match args.command {
        Command::Summary(ref summary) => {
            let config = load_config(args.config.as_deref(), &summary.prometheus)?;
            run_summary(&config, summary).await
        }
        Command::Check(ref prom) => {
            let config = load_config(args.config.as_deref(), prom)?;
            run_check(&config).await
        }
        Command::Collect(ref prom) => {
            let config = load_config(args.config.as_deref(), prom)?;
            run_collect(&config).await
        }
        Command::Serve(ref prom) => {
            let config = load_config(args.config.as_deref(), prom)?;
            run_serve(&config).await
        }
    }
}

/// Config file when given (or present), else defaults around `--url`; CLI flags win.
fn load_config(path: Option<&str>, prom: &PrometheusArgs) -> Result<AppConfig> {
    let config = match (path, prom.url.as_deref()) {
        (Some(path), _) => AppConfig::load_from_path(path)?,
        (None, Some(url)) => AppConfig::for_url(url)?,
        (None, None) => AppConfig::load()?,
    };
    config.with_prometheus_overrides(prom.url.as_deref(), prom.host.as_deref())
}

fn client(config: &AppConfig) -> Result<PromClient> {
    PromClient::new(
        &config.prometheus.url,
        config.prometheus.host.clone(),
        config.prometheus.timeout(),
    )
}

async fn run_summary(config: &AppConfig, args: &SummaryArgs) -> Result<ExitCode> {
    let client = client(config)?;
    let window = match args.start {
        Some(start) => TimeWindow::starting_at(start, args.nseconds)?,
        None => TimeWindow::ending_now(args.nseconds, args.end)?,
    }
    .with_step(config.prometheus.step_secs)?;

    let mut options = config.summary_options();
    if let Some(aggregate) = args.aggregate_override() {
        options.aggregate = aggregate;
    }
    let report = MetricsSummary::new(&client, window, &options).collect().await;

    let out = match args.indent {
        Some(indent) => {
            let indent = " ".repeat(indent);
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            serde::Serialize::serialize(&report.values, &mut ser)?;
            String::from_utf8(buf)?
        }
        None => serde_json::to_string(&report.values)?,
    };
    println!("{}", out);

    if report.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

async fn run_check(config: &AppConfig) -> Result<ExitCode> {
    anyhow::ensure!(!config.checks.is_empty(), "no [[checks]] configured");
    let client = client(config)?;
    let results = run_checks(&client, &config.checks).await;

    let mut failed = false;
    for r in &results {
        println!("{}: {}", r.description, r.outcome);
        failed |= !matches!(
            r.outcome,
            checks::CheckOutcome::Passed { .. } | checks::CheckOutcome::Skipped
        );
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn collector_config(config: &AppConfig) -> CollectorWorkerConfig {
    CollectorWorkerConfig {
        nseconds: config.collector.nseconds,
        end_offset_secs: config.collector.end_offset_secs,
        step_secs: config.prometheus.step_secs,
        schedule: config.collector.schedule.clone(),
        interval_secs: config.collector.interval_secs,
    }
}

async fn open_history(config: &AppConfig) -> Result<Arc<HistoryRepo>> {
    let repo = HistoryRepo::connect(&config.database.path, config.database.retention_days).await?;
    repo.init().await?;
    Ok(Arc::new(repo))
}

async fn run_collect(config: &AppConfig) -> Result<ExitCode> {
    let client = Arc::new(client(config)?);
    let history_repo = open_history(config).await?;
    let options = Arc::new(config.summary_options());

    let handle = collector_worker::spawn(client, history_repo, options, collector_config(config));
    tracing::info!(db = %config.database.path, "collector running");
    tokio::select! {
        _ = handle => {}
        _ = shutdown_signal() => tracing::info!("Received shutdown signal"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_serve(config: &AppConfig) -> Result<ExitCode> {
    let client = Arc::new(client(config)?);
    let history_repo = open_history(config).await?;
    let options = Arc::new(config.summary_options());

    let worker_handle = collector_worker::spawn(
        client.clone(),
        history_repo.clone(),
        options.clone(),
        collector_config(config),
    );

    let app = routes::app(
        client,
        history_repo,
        options,
        config.checks.clone(),
        config.prometheus.step_secs,
    );
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            worker_handle.abort();
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
