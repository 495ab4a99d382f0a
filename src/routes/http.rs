// GET handlers: version, summary, history, checks

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::checks::run_checks;
use crate::summary::MetricsSummary;
use crate::version::{NAME, VERSION};
use crate::window::TimeWindow;

const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// GET /version: service name and version from Cargo.toml.
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SummaryParams {
    nseconds: i64,
    /// Seconds before now at which the window ends; ignored when `start` is set.
    #[serde(default)]
    end: i64,
    #[serde(default)]
    start: Option<i64>,
    #[serde(default)]
    aggregate: Option<bool>,
}

/// GET /api/summary?nseconds=N[&end=S|&start=T][&aggregate=bool]: one summarization pass.
pub(super) async fn summary_handler(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Response {
    let window = match params.start {
        Some(start) => TimeWindow::starting_at(start, params.nseconds),
        None => TimeWindow::ending_now(params.nseconds, params.end),
    }
    .and_then(|w| w.with_step(state.step_secs));
    let window = match window {
        Ok(w) => w,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let mut options = state.options.as_ref().clone();
    if let Some(aggregate) = params.aggregate {
        options.aggregate = aggregate;
    }
    let report = MetricsSummary::new(state.client.as_ref(), window, &options)
        .collect()
        .await;
    axum::Json(report).into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryParams {
    #[serde(default)]
    limit: Option<u32>,
}

/// GET /api/history[?limit=N]: most recent stored summaries, oldest first.
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.history_repo.get_recent(limit).await {
        Ok(entries) => axum::Json(entries).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "history query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /api/checks: evaluates configured threshold checks now.
pub(super) async fn checks_handler(State(state): State<AppState>) -> impl IntoResponse {
    let results = run_checks(state.client.as_ref(), &state.checks).await;
    axum::Json(results)
}
