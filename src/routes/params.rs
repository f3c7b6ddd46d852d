//! Query-string handling shared by the HTML/CSV routes.
//!
//! Every parameter arrives as an optional string so a bad value can be
//! answered with a readable 400 instead of the extractor's generic rejection.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{CollectorError, Window};

// ---

pub const DEFAULT_LIMIT: i64 = 1000;
pub const MAX_LIMIT: i64 = 10_000;

/// Errors a request handler reports back to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Collector(#[from] CollectorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = match &self {
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Collector(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("rejected request: {}", self);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Output encoding selected with `format=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Html,
    Csv,
    Plain,
}

impl Format {
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        // ---
        match raw.map(str::trim).unwrap_or("") {
            "" | "html" => Ok(Format::Html),
            "csv" => Ok(Format::Csv),
            "plain" | "txt" => Ok(Format::Plain),
            other => Err(ApiError::InvalidParameter(format!(
                "Illegal format '{}' (expected html, csv or plain)",
                other
            ))),
        }
    }
}

/// Parameters of routes that only choose an output format.
#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// Parameters of the history routes (`/node`, `/lightnings`).
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    // ---
    pub id: Option<String>,
    pub t_min: Option<String>,
    pub t_max: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub format: Option<String>,
}

/// Parse an optional integer parameter; an empty value counts as absent.
fn parse_i64(name: &str, raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    // ---
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<i64>().map(Some).map_err(|_| {
            ApiError::InvalidParameter(format!("Invalid value for '{}': '{}'", name, v))
        }),
    }
}

impl HistoryQuery {
    // ---
    pub fn format(&self) -> Result<Format, ApiError> {
        Format::parse(self.format.as_deref())
    }

    pub fn station_id(&self) -> Result<Option<i64>, ApiError> {
        parse_i64("id", self.id.as_deref())
    }

    pub fn require_station_id(&self) -> Result<i64, ApiError> {
        // ---
        self.station_id()?
            .ok_or_else(|| ApiError::InvalidParameter("Missing parameter 'id'".to_string()))
    }

    /// Time range and paging with defaults and clamping applied.
    ///
    /// Missing bounds are unbounded, `limit` defaults to [`DEFAULT_LIMIT`] and is
    /// clamped to `1..=MAX_LIMIT`, a negative `offset` becomes 0.
    pub fn window(&self) -> Result<Window, ApiError> {
        // ---
        let min_timestamp = parse_i64("t_min", self.t_min.as_deref())?.unwrap_or(-1);
        let max_timestamp = parse_i64("t_max", self.t_max.as_deref())?.unwrap_or(-1);
        let limit = parse_i64("limit", self.limit.as_deref())?
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let offset = parse_i64("offset", self.offset.as_deref())?
            .unwrap_or(0)
            .max(0);

        Ok(Window {
            min_timestamp,
            max_timestamp,
            limit,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HistoryQuery {
        // ---
        let mut q = HistoryQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "id" => q.id = v,
                "t_min" => q.t_min = v,
                "t_max" => q.t_max = v,
                "limit" => q.limit = v,
                "offset" => q.offset = v,
                "format" => q.format = v,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn test_defaults() {
        // ---
        let window = query(&[]).window().unwrap();
        assert_eq!(window, Window::default());
        assert_eq!(query(&[]).format().unwrap(), Format::Html);
        assert_eq!(query(&[]).station_id().unwrap(), None);
    }

    #[test]
    fn test_limit_and_offset_are_clamped() {
        // ---
        let w = query(&[("limit", "0"), ("offset", "-5")]).window().unwrap();
        assert_eq!(w.limit, 1);
        assert_eq!(w.offset, 0);

        let w = query(&[("limit", "999999")]).window().unwrap();
        assert_eq!(w.limit, MAX_LIMIT);

        let w = query(&[("limit", "-3")]).window().unwrap();
        assert_eq!(w.limit, 1);
    }

    #[test]
    fn test_bounds_and_empty_values() {
        // ---
        let w = query(&[("t_min", "100"), ("t_max", "")]).window().unwrap();
        assert_eq!(w.min_timestamp, 100);
        assert_eq!(w.max_timestamp, -1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        // ---
        assert!(matches!(
            query(&[("id", "abc")]).station_id(),
            Err(ApiError::InvalidParameter(_))
        ));
        assert!(matches!(
            query(&[("limit", "ten")]).window(),
            Err(ApiError::InvalidParameter(_))
        ));
        assert!(matches!(
            query(&[("format", "xml")]).format(),
            Err(ApiError::InvalidParameter(_))
        ));
        assert!(matches!(
            query(&[]).require_station_id(),
            Err(ApiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_format_names() {
        // ---
        assert_eq!(Format::parse(Some("csv")).unwrap(), Format::Csv);
        assert_eq!(Format::parse(Some("plain")).unwrap(), Format::Plain);
        assert_eq!(Format::parse(Some("")).unwrap(), Format::Html);
        assert_eq!(Format::parse(None).unwrap(), Format::Html);
    }
}
