// HTTP routes: on-demand summaries, stored history, checks, version

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::checks::Check;
use crate::history_repo::HistoryRepo;
use crate::prom_client::PromClient;
use crate::summary::SummaryOptions;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) client: Arc<PromClient>,
    pub(crate) history_repo: Arc<HistoryRepo>,
    pub(crate) options: Arc<SummaryOptions>,
    pub(crate) checks: Arc<Vec<Check>>,
    pub(crate) step_secs: i64,
}

pub fn app(
    client: Arc<PromClient>,
    history_repo: Arc<HistoryRepo>,
    options: Arc<SummaryOptions>,
    checks: Vec<Check>,
    step_secs: i64,
) -> Router {
    let state = AppState {
        client,
        history_repo,
        options,
        checks: Arc::new(checks),
        step_secs,
    };
    Router::new()
        .route("/", get(|| async { "meshperf" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/summary", get(http::summary_handler)) // GET /api/summary
        .route("/api/history", get(http::history_handler)) // GET /api/history
        .route("/api/checks", get(http::checks_handler)) // GET /api/checks
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
