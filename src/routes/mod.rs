//! HTTP gateway: merges the sub-routers of every page into one [`Router`].
use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Router,
};

use crate::Collector;

mod current;
mod health;
mod lightnings;
mod node;
mod nodes;
mod params;
mod render;

pub use params::{ApiError, Format};

// ---

pub fn router(collector: Arc<Collector>) -> Router {
    // ---
    Router::new()
        .merge(current::router())
        .merge(node::router())
        .merge(nodes::router())
        .merge(lightnings::router())
        .merge(health::router())
        .fallback(not_found)
        .with_state(collector)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "404 - Not found",
    )
}
