// Shared test helpers: series builders, an in-memory backend, a fake Prometheus server
#![allow(dead_code)]

use std::sync::Mutex;

use meshperf::error::QueryError;
use meshperf::models::{Labels, RawSeries, Sample};
use meshperf::prom_client::MetricsBackend;
use meshperf::window::TimeWindow;

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Series with samples at 15s steps starting at t=1000.
pub fn series(pairs: &[(&str, &str)], values: &[f64]) -> RawSeries {
    let samples = values
        .iter()
        .enumerate()
        .map(|(i, v)| Sample {
            timestamp: 1000.0 + 15.0 * i as f64,
            value: *v,
        })
        .collect();
    RawSeries::new(labels(pairs), samples)
}

pub fn pod(pod_name: &str, container: &str, values: &[f64]) -> RawSeries {
    series(
        &[("pod_name", pod_name), ("container_name", container)],
        values,
    )
}

pub fn window() -> TimeWindow {
    TimeWindow::ending_at(100_000, 600).unwrap()
}

pub enum Canned {
    Series(Vec<RawSeries>),
    Fail(&'static str),
}

/// Answers queries from canned responses; the first entry whose needle occurs in the query wins.
/// Unmatched queries return an empty result.
#[derive(Default)]
pub struct StaticBackend {
    range: Vec<(String, Canned)>,
    instant: Vec<(String, Result<f64, &'static str>)>,
    pub calls: Mutex<Vec<String>>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(mut self, needle: &str, series: Vec<RawSeries>) -> Self {
        self.range.push((needle.to_string(), Canned::Series(series)));
        self
    }

    pub fn range_error(mut self, needle: &str, error: &'static str) -> Self {
        self.range.push((needle.to_string(), Canned::Fail(error)));
        self
    }

    pub fn instant(mut self, needle: &str, value: f64) -> Self {
        self.instant.push((needle.to_string(), Ok(value)));
        self
    }

    pub fn instant_error(mut self, needle: &str, error: &'static str) -> Self {
        self.instant.push((needle.to_string(), Err(error)));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn unsuccessful(error: &str) -> QueryError {
    QueryError::Unsuccessful {
        status: "error".into(),
        error_type: "bad_data".into(),
        error: error.into(),
    }
}

impl MetricsBackend for StaticBackend {
    async fn fetch_range(
        &self,
        query: &str,
        _window: &TimeWindow,
    ) -> Result<Vec<RawSeries>, QueryError> {
        self.calls.lock().unwrap().push(query.to_string());
        match self.range.iter().find(|(needle, _)| query.contains(needle.as_str())) {
            Some((_, Canned::Series(series))) => Ok(series.clone()),
            Some((_, Canned::Fail(error))) => Err(unsuccessful(error)),
            None => Ok(vec![]),
        }
    }

    async fn fetch_instant(&self, query: &str) -> Result<f64, QueryError> {
        self.calls.lock().unwrap().push(query.to_string());
        match self.instant.iter().find(|(needle, _)| query.contains(needle.as_str())) {
            Some((_, Ok(v))) => Ok(*v),
            Some((_, Err(error))) => Err(unsuccessful(error)),
            None => Ok(0.0),
        }
    }
}

/// Serves `app` on an ephemeral local port; returns its base URL.
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn matrix_body(result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "data": { "resultType": "matrix", "result": result }
    })
}
