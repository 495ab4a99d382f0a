// Aggregation results and the flat output mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;

/// Placeholder emitted for keys with no data.
pub const ZERO: &str = "0";

/// Per-group reduction of the summed per-timestamp totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum AggregatedSummary {
    Aggregate {
        min: f64,
        avg: f64,
        max: f64,
        count: usize,
    },
    Raw { values: Vec<f64> },
}

/// One output value: a stringified number, or a per-timestamp trend in raw mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryValue {
    Text(String),
    Trend(Vec<f64>),
}

impl SummaryValue {
    pub fn zero() -> Self {
        SummaryValue::Text(ZERO.to_string())
    }

    pub fn number(v: f64) -> Self {
        SummaryValue::Text(v.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SummaryValue::Text(s) => Some(s),
            SummaryValue::Trend(_) => None,
        }
    }
}

impl From<&str> for SummaryValue {
    fn from(s: &str) -> Self {
        SummaryValue::Text(s.to_string())
    }
}

/// Flat key -> value mapping, ordered by key for stable JSON/CSV output.
pub type SummaryMap = BTreeMap<String, SummaryValue>;

/// A query template that failed during one summarization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFailure {
    pub template: String,
    pub error: String,
}

/// Result of one summarization pass over a single window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub window: TimeWindow,
    pub values: SummaryMap,
    pub failures: Vec<TemplateFailure>,
}

impl SummaryReport {
    /// Text value for `key`, or "0" when the key is absent.
    pub fn get_or_zero(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(SummaryValue::as_text)
            .unwrap_or(ZERO)
    }
}

/// One stored summary row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub created_at: i64,
    pub window_start: i64,
    pub window_end: i64,
    pub values: SummaryMap,
    pub failures: Vec<TemplateFailure>,
}
