//! Station directory (`/nodes`): every station ever flushed, with a mark for
//! the ones currently reporting.

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

async fn nodes(
    Query(params): Query<FormatQuery>,
    State(collector): State<Arc<Collector>>,
) -> Result<Response, ApiError> {
    // ---
    let format = Format::parse(params.format.as_deref())?;
    let registry = collector.registered_stations().await?;
    let active: Vec<i64> = collector
        .active_stations()
        .await
        .iter()
        .map(|s| s.id)
        .collect();

    Ok(render::respond(
        format,
        || render::page("Stations", None, &render::directory_table(&registry, &active)),
        || render::directory_csv(&registry),
    ))
}

pub fn router() -> Router<Arc<Collector>> {
    Router::new().route("/nodes", get(nodes))
}
