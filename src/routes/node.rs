//! Flushed history of a single station (`/node?id=..`).

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};

use super::params::{ApiError, HistoryQuery};
use super::render;
use crate::Collector;

// ---

/// Handle `GET /node`.
///
/// `id` is required; `t_min`, `t_max`, `limit` and `offset` narrow the
/// result, which is always ordered newest first.
async fn node(
    Query(params): Query<HistoryQuery>,
    State(collector): State<Arc<Collector>>,
) -> Result<Response, ApiError> {
    // ---
    let format = params.format()?;
    let id = params.require_station_id()?;
    let window = params.window()?;

    let points = collector.query(id, window).await?;
    tracing::debug!("GET /node id={} - {} data points", id, points.len());

    let title = match collector.station(id).await {
        Some(station) if !station.name.is_empty() => format!("Station {} ({})", id, station.name),
        _ => format!("Station {}", id),
    };

    Ok(render::respond(
        format,
        || render::page(&title, None, &render::datapoints_table(&points)),
        || render::datapoints_csv(&points),
    ))
}

pub fn router() -> Router<Arc<Collector>> {
    Router::new().route("/node", get(node))
}
