use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::checks::Check;
use crate::classifier::{DeploymentRules, default_aliases, default_watched_deployments};
use crate::summary::{
    HistogramMetric, SumMetric, SummaryOptions, default_containers, default_expected_groups,
    default_histograms, default_proxy_families, default_response_codes, default_sum_metrics,
};
use crate::window::DEFAULT_STEP_SECS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    pub url: String,
    /// Host header override when Prometheus sits behind an ingress.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_step_secs")]
    pub step_secs: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_step_secs() -> i64 {
    DEFAULT_STEP_SECS
}

fn default_timeout_secs() -> u64 {
    30
}

impl PrometheusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_watched_deployments")]
    pub watched_deployments: Vec<String>,
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
    #[serde(default = "default_pod_label")]
    pub pod_label: String,
    #[serde(default = "default_container_label")]
    pub container_label: String,
}

fn default_pod_label() -> String {
    "pod_name".into()
}

fn default_container_label() -> String {
    "container_name".into()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            watched_deployments: default_watched_deployments(),
            aliases: default_aliases(),
            pod_label: default_pod_label(),
            container_label: default_container_label(),
        }
    }
}

impl ClassifierConfig {
    pub fn rules(&self) -> DeploymentRules {
        DeploymentRules {
            watched: self.watched_deployments.iter().cloned().collect(),
            aliases: self.aliases.clone(),
            pod_label: self.pod_label.clone(),
            container_label: self.container_label.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub aggregate: bool,
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,
    #[serde(default = "default_expected_groups")]
    pub expected_groups: Vec<String>,
    #[serde(default = "default_response_codes")]
    pub response_codes: Vec<u16>,
    #[serde(default = "default_proxy_families")]
    pub proxy_families: Vec<String>,
    #[serde(default = "default_sum_metrics")]
    pub sum_metrics: Vec<SumMetric>,
    #[serde(default = "default_histograms")]
    pub histograms: Vec<HistogramMetric>,
}

fn default_true() -> bool {
    true
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            aggregate: true,
            containers: default_containers(),
            expected_groups: default_expected_groups(),
            response_codes: default_response_codes(),
            proxy_families: default_proxy_families(),
            sum_metrics: default_sum_metrics(),
            histograms: default_histograms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            host: "0.0.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/meshperf.db".into(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Length of the trailing window summarized on each run.
    pub nseconds: i64,
    #[serde(default)]
    pub end_offset_secs: i64,
    /// Optional cron expression (local time). Falls back to `interval_secs` when unset.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    300
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            nseconds: 300,
            end_offset_secs: 0,
            schedule: None,
            interval_secs: default_interval_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "meshperf.toml".into());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Defaults for everything but the Prometheus URL.
    pub fn for_url(url: &str) -> anyhow::Result<Self> {
        let url = toml::Value::String(url.to_string());
        Self::load_from_str(&format!("[prometheus]\nurl = {}\n", url))
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line Prometheus overrides and validates the result.
    pub fn with_prometheus_overrides(
        mut self,
        url: Option<&str>,
        host: Option<&str>,
    ) -> anyhow::Result<Self> {
        if let Some(url) = url {
            self.prometheus.url = url.to_string();
        }
        if let Some(host) = host {
            self.prometheus.host = Some(host.to_string());
        }
        self.validate()?;
        Ok(self)
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            rules: self.classifier.rules(),
            aggregate: self.summary.aggregate,
            containers: self.summary.containers.clone(),
            expected_groups: self.summary.expected_groups.clone(),
            response_codes: self.summary.response_codes.clone(),
            proxy_families: self.summary.proxy_families.clone(),
            sum_metrics: self.summary.sum_metrics.clone(),
            histograms: self.summary.histograms.clone(),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.prometheus.url.starts_with("http://")
                || self.prometheus.url.starts_with("https://"),
            "prometheus.url must be an http(s) URL, got {:?}",
            self.prometheus.url
        );
        anyhow::ensure!(
            self.prometheus.step_secs > 0,
            "prometheus.step_secs must be > 0, got {}",
            self.prometheus.step_secs
        );
        anyhow::ensure!(
            self.prometheus.timeout_secs > 0,
            "prometheus.timeout_secs must be > 0, got {}",
            self.prometheus.timeout_secs
        );
        anyhow::ensure!(
            !self.classifier.pod_label.is_empty(),
            "classifier.pod_label must be non-empty"
        );
        anyhow::ensure!(
            !self.classifier.container_label.is_empty(),
            "classifier.container_label must be non-empty"
        );
        anyhow::ensure!(
            !self.summary.containers.is_empty(),
            "summary.containers must be non-empty"
        );
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        anyhow::ensure!(
            self.collector.nseconds > 0,
            "collector.nseconds must be > 0, got {}",
            self.collector.nseconds
        );
        anyhow::ensure!(
            self.collector.end_offset_secs >= 0,
            "collector.end_offset_secs must be >= 0, got {}",
            self.collector.end_offset_secs
        );
        anyhow::ensure!(
            self.collector.interval_secs > 0,
            "collector.interval_secs must be > 0, got {}",
            self.collector.interval_secs
        );
        if let Some(schedule) = &self.collector.schedule {
            anyhow::ensure!(
                cron::Schedule::from_str(schedule).is_ok(),
                "collector.schedule is not a valid cron expression: {:?}",
                schedule
            );
        }
        for check in &self.checks {
            anyhow::ensure!(
                !check.query.is_empty(),
                "checks: query for {:?} must be non-empty",
                check.description
            );
        }
        Ok(())
    }
}
