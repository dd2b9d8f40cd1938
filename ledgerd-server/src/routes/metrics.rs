//! Prometheus scrape endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// GET /metrics - Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Monitoring",
    responses((status = 200, description = "Prometheus-formatted metrics", body = String, content_type = "text/plain"))
)]
pub(crate) async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.render(state.db.status().open);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

/// Monitoring routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics))
}
