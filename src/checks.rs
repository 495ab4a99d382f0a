// Threshold alarms over instant queries (post-run sanity checks).

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::prom_client::MetricsBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Check {
    pub description: String,
    pub query: String,
    /// Alarm fires when the value is strictly above/below `threshold`.
    pub when: Comparison,
    pub threshold: f64,
    pub message: String,
    /// When set and it evaluates to 0, the workload is not running and the check is skipped.
    #[serde(default)]
    pub running_query: Option<String>,
}

impl Check {
    pub fn in_alarm(&self, value: f64) -> bool {
        match self.when {
            Comparison::Above => value > self.threshold,
            Comparison::Below => value < self.threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CheckOutcome {
    Passed { value: f64 },
    Alarm { value: f64, message: String },
    Skipped,
    Failed { error: String },
}

impl CheckOutcome {
    pub fn is_alarm(&self) -> bool {
        matches!(self, CheckOutcome::Alarm { .. })
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Passed { value } => write!(f, "ok ({})", value),
            CheckOutcome::Alarm { value, message } => write!(f, "{} Response: {}", message, value),
            CheckOutcome::Skipped => write!(f, "skipped (not running)"),
            CheckOutcome::Failed { error } => write!(f, "query failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub description: String,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

pub async fn run_check<B: MetricsBackend + Sync>(backend: &B, check: &Check) -> CheckOutcome {
    if let Some(running) = &check.running_query {
        match backend.fetch_instant(running).await {
            Ok(v) if v == 0.0 => return CheckOutcome::Skipped,
            Ok(_) => {}
            Err(e) => {
                return CheckOutcome::Failed {
                    error: e.to_string(),
                };
            }
        }
    }

    match backend.fetch_instant(&check.query).await {
        Ok(value) if check.in_alarm(value) => CheckOutcome::Alarm {
            value,
            message: check.message.clone(),
        },
        Ok(value) => CheckOutcome::Passed { value },
        Err(e) => CheckOutcome::Failed {
            error: e.to_string(),
        },
    }
}

/// Runs checks in order; one failing query does not stop the rest.
pub async fn run_checks<B: MetricsBackend + Sync>(
    backend: &B,
    checks: &[Check],
) -> Vec<CheckResult> {
    let mut out = Vec::with_capacity(checks.len());
    for check in checks {
        let outcome = run_check(backend, check).await;
        match &outcome {
            CheckOutcome::Alarm { .. } | CheckOutcome::Failed { .. } => {
                warn!(check = %check.description, result = %outcome, "check did not pass")
            }
            _ => info!(check = %check.description, result = %outcome, "check evaluated"),
        }
        out.push(CheckResult {
            description: check.description.clone(),
            outcome,
        });
    }
    out
}
