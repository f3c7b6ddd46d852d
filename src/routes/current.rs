//! Live overview of every active station (`/`, `/index.html`, `/current`).
//!
//! Served straight from the collector's in-memory map, so it reflects the
//! latest smoothed values even between two flush cycles.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};

use super::params::{ApiError, Format, FormatQuery};
use super::render;
use crate::Collector;

// ---

async fn current(
    Query(params): Query<FormatQuery>,
    State(collector): State<Arc<Collector>>,
) -> Result<Response, ApiError> {
    // ---
    let format = Format::parse(params.format.as_deref())?;
    let stations = collector.active_stations().await;
    tracing::debug!("GET /current - {} active stations", stations.len());

    Ok(render::respond(
        format,
        || {
            render::page(
                "Current readings",
                Some(render::REFRESH_SECONDS),
                &render::stations_table(&stations),
            )
        },
        || render::stations_csv(&stations),
    ))
}

pub fn router() -> Router<Arc<Collector>> {
    // ---
    Router::new()
        .route("/", get(current))
        .route("/index.html", get(current))
        .route("/current", get(current))
}
