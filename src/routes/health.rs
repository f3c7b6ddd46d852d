// src/routes/health.rs
//! Liveness endpoint of the collector service.
//!
//! `/health` answers as long as the HTTP server runs and reports how many
//! stations are currently tracked. It does not touch storage or wait on the
//! collector lock, so it still answers while a flush cycle is stuck on a busy
//! database.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::Collector;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_stations: usize,
}

/// Handle `GET /health`.
async fn health(State(collector): State<Arc<Collector>>) -> Json<HealthResponse> {
    // ---
    Json(HealthResponse {
        status: "ok",
        active_stations: collector.station_count(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<Arc<Collector>> {
    Router::new().route("/health", get(health))
}
