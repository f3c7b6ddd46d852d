//! Lightning history (`/lightnings`), for one station or all of them.

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

async fn lightnings(
    Query(params): Query<HistoryQuery>,
    State(collector): State<Arc<Collector>>,
) -> Result<Response, ApiError> {
    // ---
    let format = params.format()?;
    let window = params.window()?;

    let (title, events) = match params.station_id()? {
        Some(id) => (
            format!("Lightnings of station {}", id),
            collector.query_lightnings(id, window).await?,
        ),
        None => (
            "Lightnings".to_string(),
            collector.query_all_lightnings(window).await?,
        ),
    };
    tracing::debug!("GET /lightnings - {} events", events.len());

    Ok(render::respond(
        format,
        || render::page(&title, None, &render::lightnings_table(&events)),
        || render::lightnings_csv(&events),
    ))
}

pub fn router() -> Router<Arc<Collector>> {
    Router::new().route("/lightnings", get(lightnings))
}
