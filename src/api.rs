//! Admin read surface
//!
//! Thin HTTP queries over state the core owns: persisted history, aggregate
//! stats and the heatmap projection, plus health and Prometheus metrics.
//! The realtime transport is not served here.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bubble::Bubble;
use crate::fanout::Hub;
use crate::history::{HeatPoint, Stats};
use crate::metrics;

pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/history", get(history_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/heatmap", get(heatmap_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler() -> String {
    metrics::export_metrics()
}

async fn history_handler(
    State(hub): State<Arc<Hub>>,
) -> Result<Json<Vec<Bubble>>, (StatusCode, String)> {
    let bubbles = hub
        .service()
        .history()
        .read_all()
        .await
        .map_err(internal_error)?;
    Ok(Json(bubbles))
}

async fn stats_handler(State(hub): State<Arc<Hub>>) -> Result<Json<Stats>, (StatusCode, String)> {
    let active_bubbles = hub.service().live_count().await.map_err(internal_error)?;
    let stats = hub
        .service()
        .counters()
        .stats(hub.active_users(), active_bubbles)
        .await
        .map_err(internal_error)?;
    Ok(Json(stats))
}

async fn heatmap_handler(
    State(hub): State<Arc<Hub>>,
) -> Result<Json<Vec<HeatPoint>>, (StatusCode, String)> {
    let points = hub
        .service()
        .history()
        .heatmap()
        .await
        .map_err(internal_error)?;
    Ok(Json(points))
}

fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %e, "admin query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "query failed".to_string())
}
