// Metrics summary facade: fixed query templates over one shared window,
// flattened into a single string-keyed mapping.
// Each template fails on its own; a failed template falls back to its "0"
// defaults and is listed in the report.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::aggregation::SeriesAggregator;
use crate::classifier::{
    DeploymentClassifier, DeploymentRules, GroupClassifier, GroupKey, LabelClassifier,
};
use crate::error::QueryError;
use crate::models::{
    AggregatedSummary, RawSeries, SummaryMap, SummaryReport, SummaryValue, TemplateFailure,
};
use crate::prom_client::MetricsBackend;
use crate::units::UnitTransform;
use crate::window::TimeWindow;

pub const CPU_METRIC: &str = "cpu_mili";
pub const MEM_METRIC: &str = "mem_MB";
pub const SERVER_ERROR_METRIC: &str = "grpc_server_handled_total_5xx";
const PROXY_CONTAINER: &str = "istio-proxy";

/// `sum(rate(metric[window]))`, optionally `by (groupby)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SumMetric {
    pub metric: String,
    #[serde(default)]
    pub groupby: Option<String>,
}

/// `histogram_quantile(percent, ...) by (groupby)`, reported in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistogramMetric {
    pub metric: String,
    pub percent: String,
    pub groupby: String,
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub rules: DeploymentRules,
    /// min/avg/max per group when true; full per-timestamp trend when false.
    pub aggregate: bool,
    /// Containers included in the CPU/memory breakdown.
    pub containers: Vec<String>,
    /// `deployment/container` groups that always get a column, "0" when absent.
    pub expected_groups: Vec<String>,
    pub response_codes: Vec<u16>,
    /// Pod-name substrings for the per-pod istio-proxy averages.
    pub proxy_families: Vec<String>,
    pub sum_metrics: Vec<SumMetric>,
    pub histograms: Vec<HistogramMetric>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            rules: DeploymentRules::default(),
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

pub fn default_containers() -> Vec<String> {
    [
        "mixer",
        "policy",
        "discovery",
        "istio-proxy",
        "captured",
        "uncaptured",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_expected_groups() -> Vec<String> {
    vec![
        "fortioserver_deployment/istio-proxy".into(),
        "fortio_deployment/istio-proxy".into(),
    ]
}

pub fn default_response_codes() -> Vec<u16> {
    vec![404, 503, 504]
}

pub fn default_proxy_families() -> Vec<String> {
    vec![
        "fortioclient".into(),
        "fortioserver".into(),
        "istio-ingressgateway".into(),
    ]
}

pub fn default_sum_metrics() -> Vec<SumMetric> {
    [
        "mixer_config_rule_config_count",
        "mixer_config_instance_config_count",
        "mixer_config_handler_config_count",
    ]
    .into_iter()
    .map(|metric| SumMetric {
        metric: metric.into(),
        groupby: Some("configID".into()),
    })
    .collect()
}

pub fn default_histograms() -> Vec<HistogramMetric> {
    vec![HistogramMetric {
        metric: "grpc_server_handling_seconds_bucket".into(),
        percent: "0.99".into(),
        groupby: "grpc_method".into(),
    }]
}

pub struct MetricsSummary<'a, B> {
    backend: &'a B,
    window: TimeWindow,
    options: &'a SummaryOptions,
}

impl<'a, B: MetricsBackend + Sync> MetricsSummary<'a, B> {
    pub fn new(backend: &'a B, window: TimeWindow, options: &'a SummaryOptions) -> Self {
        Self {
            backend,
            window,
            options,
        }
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Runs every template against the shared window.
    #[instrument(skip(self), fields(start = self.window.start(), end = self.window.end()))]
    pub async fn collect(&self) -> SummaryReport {
        let mut report = SummaryReport {
            window: self.window,
            values: SummaryMap::new(),
            failures: Vec::new(),
        };

        let cpu_mem = self.cpu_and_memory().await;
        merge(&mut report, "cpu_and_memory", cpu_mem, self.cpu_mem_defaults());

        let proxy = self.istio_proxy_usage().await;
        merge(&mut report, "istio_proxy_usage", proxy, self.proxy_defaults());

        let codes = self.requests_by_code().await;
        merge(&mut report, "requests_by_code", codes, self.code_defaults());

        for sum in &self.options.sum_metrics {
            let res = self.sum_by_metric(&sum.metric, sum.groupby.as_deref()).await;
            merge(&mut report, &sum.metric, res, zero_keys([sum.metric.clone()]));
        }

        for hist in &self.options.histograms {
            let res = self
                .histogram_by_metric(&hist.metric, &hist.percent, &hist.groupby)
                .await;
            merge(&mut report, &hist.metric, res, SummaryMap::new());
        }

        let errors = self.server_error_rate().await;
        let defaults = zero_keys([SERVER_ERROR_METRIC.to_string()]);
        merge(&mut report, SERVER_ERROR_METRIC, errors, defaults);

        report
    }

    /// CPU (millicores) and memory (MB) per watched deployment/container.
    pub async fn cpu_and_memory(&self) -> Result<SummaryMap, QueryError> {
        let mut out = flatten(&self.fetch_cpu_by_container().await?, CPU_METRIC);
        out.extend(flatten(&self.fetch_memory_by_container().await?, MEM_METRIC));
        for (k, v) in self.cpu_mem_defaults() {
            out.entry(k).or_insert(v);
        }
        Ok(out)
    }

    pub async fn fetch_cpu_by_container(
        &self,
    ) -> Result<BTreeMap<GroupKey, AggregatedSummary>, QueryError> {
        let query = format!(
            "rate(container_cpu_usage_seconds_total{{{}}}[1m])",
            self.container_selector()
        );
        self.fetch_grouped(&query, UnitTransform::Millicores).await
    }

    pub async fn fetch_memory_by_container(
        &self,
    ) -> Result<BTreeMap<GroupKey, AggregatedSummary>, QueryError> {
        let query = format!(
            "container_memory_usage_bytes{{{}}}",
            self.container_selector()
        );
        self.fetch_grouped(&query, UnitTransform::Megabytes).await
    }

    async fn fetch_grouped(
        &self,
        query: &str,
        transform: UnitTransform,
    ) -> Result<BTreeMap<GroupKey, AggregatedSummary>, QueryError> {
        let series = self.backend.fetch_range(query, &self.window).await?;
        let classifier = DeploymentClassifier::per_container(self.options.rules.clone());
        Ok(SeriesAggregator::new(self.options.aggregate)
            .with_transform(transform)
            .aggregate(&series, &classifier))
    }

    fn container_selector(&self) -> String {
        format!(
            "{}=~\"{}\"",
            self.options.rules.container_label,
            self.options.containers.join("|")
        )
    }

    /// Average istio-proxy CPU and memory per pod family (client, server, ingress).
    pub async fn istio_proxy_usage(&self) -> Result<SummaryMap, QueryError> {
        let rules = &self.options.rules;
        let cpu_query = format!(
            "sum(rate(container_cpu_usage_seconds_total{{{}=\"{}\"}}[1m])) by ({})",
            rules.container_label, PROXY_CONTAINER, rules.pod_label
        );
        let mem_query = format!(
            "container_memory_usage_bytes{{{}=\"{}\"}}",
            rules.container_label, PROXY_CONTAINER
        );

        let cpu = self.backend.fetch_range(&cpu_query, &self.window).await?;
        let mem = self.backend.fetch_range(&mem_query, &self.window).await?;

        let mut out = SummaryMap::new();
        for family in &self.options.proxy_families {
            out.insert(
                format!("cpu_mili_avg_istio_proxy_{}", family),
                self.family_average(&cpu, family, UnitTransform::Millicores),
            );
            out.insert(
                format!("mem_Mi_avg_istio_proxy_{}", family),
                self.family_average(&mem, family, UnitTransform::Megabytes),
            );
        }
        Ok(out)
    }

    /// Mean of the last series whose pod name contains `family`.
    fn family_average(
        &self,
        series: &[RawSeries],
        family: &str,
        transform: UnitTransform,
    ) -> SummaryValue {
        series
            .iter()
            .filter(|s| {
                s.label(&self.options.rules.pod_label)
                    .is_some_and(|pod| pod.contains(family))
            })
            .filter_map(|s| crate::aggregation::reduce(&s.values()))
            .next_back()
            .map(|(_, avg, _, _)| SummaryValue::number(transform.apply(avg)))
            .unwrap_or_else(SummaryValue::zero)
    }

    /// Destination-reported request rate per response code, last sample of the window.
    pub async fn requests_by_code(&self) -> Result<SummaryMap, QueryError> {
        let mut out = SummaryMap::new();
        for code in &self.options.response_codes {
            let query = format!(
                "sum(rate(istio_requests_total{{reporter=\"destination\", response_code=\"{}\"}}[{}s]))",
                code,
                self.window.duration()
            );
            let series = self.backend.fetch_range(&query, &self.window).await?;
            let value = series
                .first()
                .and_then(RawSeries::last_value)
                .map(SummaryValue::number)
                .unwrap_or_else(SummaryValue::zero);
            out.insert(format!("istio_requests_total_{}", code), value);
        }
        Ok(out)
    }

    /// `<metric>_<label-value>` per group, or `<metric>` without grouping.
    pub async fn sum_by_metric(
        &self,
        metric: &str,
        groupby: Option<&str>,
    ) -> Result<SummaryMap, QueryError> {
        let mut query = format!("sum(rate({}[{}s]))", metric, self.window.duration());
        if let Some(label) = groupby {
            query.push_str(&format!(" by ({})", label));
        }

        let series = self.backend.fetch_range(&query, &self.window).await?;
        let mut out = SummaryMap::new();
        if series.is_empty() {
            out.insert(metric.to_string(), SummaryValue::zero());
            return Ok(out);
        }
        match groupby {
            Some(label) => {
                out.extend(last_values_by_label(&series, &LabelClassifier::new(label), metric));
            }
            None => {
                let value = series[0]
                    .last_value()
                    .map(SummaryValue::number)
                    .unwrap_or_else(SummaryValue::zero);
                out.insert(metric.to_string(), value);
            }
        }
        Ok(out)
    }

    /// Quantile latency in milliseconds, `<metric>_<percent>_<label-value>`.
    pub async fn histogram_by_metric(
        &self,
        metric: &str,
        percent: &str,
        groupby: &str,
    ) -> Result<SummaryMap, QueryError> {
        let query = format!(
            "histogram_quantile({}, sum(rate({}{{}}[{}s])) by ({}, le)) * 1000",
            percent,
            metric,
            self.window.duration(),
            groupby
        );
        let series = self.backend.fetch_range(&query, &self.window).await?;
        let prefix = format!("{}_{}", metric, percent);
        Ok(last_values_by_label(
            &series,
            &LabelClassifier::new(groupby),
            &prefix,
        ))
    }

    /// gRPC server-side error rate by method.
    pub async fn server_error_rate(&self) -> Result<SummaryMap, QueryError> {
        let query = format!(
            "sum(rate(grpc_server_handled_total{{grpc_code=~\"Unknown|Unimplemented|Internal|DataLoss\"}}[{}s])) by (grpc_method)",
            self.window.duration()
        );
        let series = self.backend.fetch_range(&query, &self.window).await?;
        let mut out = last_values_by_label(
            &series,
            &LabelClassifier::new("grpc_method"),
            SERVER_ERROR_METRIC,
        );
        if series.is_empty() {
            out.insert(SERVER_ERROR_METRIC.to_string(), SummaryValue::zero());
        }
        Ok(out)
    }

    fn cpu_mem_defaults(&self) -> SummaryMap {
        let mut keys = Vec::new();
        for group in &self.options.expected_groups {
            let col = column_name(group);
            for metric in [CPU_METRIC, MEM_METRIC] {
                if self.options.aggregate {
                    for stat in ["min", "avg", "max"] {
                        keys.push(format!("{}_{}_{}", metric, stat, col));
                    }
                } else {
                    keys.push(format!("{}_{}", metric, col));
                }
            }
        }
        zero_keys(keys)
    }

    fn proxy_defaults(&self) -> SummaryMap {
        zero_keys(self.options.proxy_families.iter().flat_map(|f| {
            [
                format!("cpu_mili_avg_istio_proxy_{}", f),
                format!("mem_Mi_avg_istio_proxy_{}", f),
            ]
        }))
    }

    fn code_defaults(&self) -> SummaryMap {
        zero_keys(
            self.options
                .response_codes
                .iter()
                .map(|c| format!("istio_requests_total_{}", c)),
        )
    }
}

/// Folds one template's result into `report`; a failure keeps its "0" defaults.
fn merge(
    report: &mut SummaryReport,
    template: &str,
    result: Result<SummaryMap, QueryError>,
    defaults: SummaryMap,
) {
    match result {
        Ok(map) => report.values.extend(map),
        Err(e) => {
            warn!(template = %template, error = %e, "query template failed; using defaults");
            report.failures.push(TemplateFailure {
                template: template.to_string(),
                error: e.to_string(),
            });
            for (k, v) in defaults {
                report.values.entry(k).or_insert(v);
            }
        }
    }
}

/// Last sample per label value, keyed `<prefix>_<value>`; series without the label are skipped.
fn last_values_by_label(
    series: &[RawSeries],
    classifier: &dyn GroupClassifier,
    prefix: &str,
) -> SummaryMap {
    let mut out = SummaryMap::new();
    for s in series {
        let Some(key) = classifier.classify(&s.labels) else {
            continue;
        };
        let value = s
            .last_value()
            .map(SummaryValue::number)
            .unwrap_or_else(SummaryValue::zero);
        out.insert(format!("{}_{}", prefix, key), value);
    }
    out
}

fn zero_keys(keys: impl IntoIterator<Item = String>) -> SummaryMap {
    keys.into_iter().map(|k| (k, SummaryValue::zero())).collect()
}

/// Output column for a group: drops "istio-", then "-" and "/" become "_".
pub fn column_name(group: &str) -> String {
    group.replace("istio-", "").replace(['-', '/'], "_")
}

/// `<metric>_<min|avg|max>_<group>` in aggregate mode, `<metric>_<group>` in raw mode.
pub fn flatten(data: &BTreeMap<GroupKey, AggregatedSummary>, metric: &str) -> SummaryMap {
    let mut out = SummaryMap::new();
    for (group, summary) in data {
        let col = column_name(group);
        match summary {
            AggregatedSummary::Aggregate { min, avg, max, .. } => {
                out.insert(format!("{}_min_{}", metric, col), SummaryValue::number(*min));
                out.insert(format!("{}_avg_{}", metric, col), SummaryValue::number(*avg));
                out.insert(format!("{}_max_{}", metric, col), SummaryValue::number(*max));
            }
            AggregatedSummary::Raw { values } => {
                out.insert(
                    format!("{}_{}", metric, col),
                    SummaryValue::Trend(values.clone()),
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_name_strips_istio_prefix_and_separators() {
        assert_eq!(
            column_name("fortioserver_deployment/istio-proxy"),
            "fortioserver_deployment_proxy"
        );
        assert_eq!(column_name("istio-pilot/discovery"), "pilot_discovery");
        assert_eq!(column_name("istio-ingressgateway"), "ingressgateway");
    }
}
