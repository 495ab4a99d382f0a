// Prometheus HTTP API client (query_range + instant query)

mod response;

pub use response::{decode_instant, decode_matrix, parse_value};

use std::future::Future;
use std::time::Duration;

use tracing::instrument;

use crate::error::QueryError;
use crate::models::RawSeries;
use crate::window::TimeWindow;

/// Source of range and instant query results.
pub trait MetricsBackend {
    /// Range query over `window`; the result must be a matrix.
    fn fetch_range(
        &self,
        query: &str,
        window: &TimeWindow,
    ) -> impl Future<Output = Result<Vec<RawSeries>, QueryError>> + Send;

    /// Instant query; an empty result yields 0.
    fn fetch_instant(&self, query: &str) -> impl Future<Output = Result<f64, QueryError>> + Send;
}

pub struct PromClient {
    client: reqwest::Client,
    base_url: String,
    host: Option<String>,
}

impl PromClient {
    /// `host` overrides the Host header, for backends reached through an ingress.
    pub fn new(base_url: &str, host: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<u8>, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url).query(params);
        if let Some(host) = &self.host {
            req = req.header(reqwest::header::HOST, host);
        }

        let resp = req.send().await.map_err(|source| QueryError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to read error body");
                String::new()
            });
            return Err(QueryError::HttpStatus {
                url,
                status: status.as_u16(),
                body,
            });
        }
        let body = resp
            .bytes()
            .await
            .map_err(|source| QueryError::Transport { url, source })?;
        Ok(body.to_vec())
    }
}

impl MetricsBackend for PromClient {
    #[instrument(skip(self, window), fields(backend = "prometheus", start = window.start(), end = window.end()))]
    async fn fetch_range(
        &self,
        query: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RawSeries>, QueryError> {
        let params = [
            ("query", query.to_string()),
            ("start", window.start().to_string()),
            ("end", window.end().to_string()),
            ("step", window.step().to_string()),
        ];
        let body = self.get("/api/v1/query_range", &params).await?;
        let series = decode_matrix(&body)?;
        tracing::debug!(series_count = series.len(), "range query complete");
        Ok(series)
    }

    #[instrument(skip(self), fields(backend = "prometheus"))]
    async fn fetch_instant(&self, query: &str) -> Result<f64, QueryError> {
        let body = self
            .get("/api/v1/query", &[("query", query.to_string())])
            .await?;
        decode_instant(&body, 0.0)
    }
}
