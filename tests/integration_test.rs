//! End-to-end checks over a real TCP listener.
//!
//! Each test boots the router on an ephemeral port with an in-memory
//! collector, feeds it through the ingestion bridge exactly like the MQTT
//! listener does, and reads the pages back with an HTTP client.
use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_test::assert_ok;

use meteod::{routes, Collector, CollectorSettings, IngestBridge};

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    active_stations: usize,
}

/// Serve the app on `127.0.0.1:0` and return its base URL.
async fn spawn_app(collector: Arc<Collector>) -> Result<String> {
    // ---
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = routes::router(collector);
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{}", addr))
}

async fn open_collector() -> Result<Arc<Collector>> {
    // ---
    let collector = Arc::new(Collector::new(CollectorSettings::default()));
    collector.open(":memory:", 1).await?;
    Ok(collector)
}

#[tokio::test]
async fn weather_packets_flow_to_history() -> Result<()> {
    // ---
    let collector = open_collector().await?;
    let bridge = IngestBridge::new(Arc::clone(&collector));
    let base = spawn_app(Arc::clone(&collector)).await?;
    let client = Client::new();

    bridge
        .on_message(
            "meteo/8",
            br#"{"node": 8, "name": "Outdoor", "t": 21.0, "hum": 55.0, "p": 1013.0, "l_ir": 10, "l_vis": 20}"#,
        )
        .await;
    bridge
        .on_message("meteo/8", br#"{"node": 8, "t": 23.0, "hum": 55.0, "p": 1013.0, "l_ir": 10, "l_vis": 20}"#)
        .await;

    // Live value is smoothed before any flush
    let live = client
        .get(format!("{}/current?format=csv", base))
        .send()
        .await?
        .text()
        .await?;
    let fields: Vec<&str> = live.trim_end().split(',').collect();
    assert_eq!(fields[0], "8");
    assert_eq!(fields[1], "Outdoor");
    let temperature: f64 = fields[2].parse()?;
    assert!((temperature - 21.2).abs() < 1e-9, "got {temperature}");

    let report = assert_ok!(collector.cycle().await);
    assert_eq!(report.written, 1);

    let response = client
        .get(format!("{}/node?id=8&format=csv", base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"), "got {content_type}");

    let body = response.text().await?;
    let rows: Vec<&str> = body.lines().collect();
    assert_eq!(rows.len(), 1, "one flush gives one row: {body:?}");
    let fields: Vec<&str> = rows[0].split(',').collect();
    assert_eq!(fields.len(), 5, "timestamp,t,hum,p,l_ir/l_vis: {:?}", rows[0]);
    assert_eq!(fields[0], report.timestamp.to_string());
    let flushed: f64 = fields[1].parse()?;
    assert!((flushed - 21.2).abs() < 1e-9, "got {flushed}");
    assert!(fields[4].contains('/'));

    let directory = client
        .get(format!("{}/nodes?format=csv", base))
        .send()
        .await?
        .text()
        .await?;
    assert_eq!(directory, "8,Outdoor\n");

    collector.close().await;
    Ok(())
}

#[tokio::test]
async fn health_reports_tracked_stations() -> Result<()> {
    // ---
    let collector = open_collector().await?;
    let bridge = IngestBridge::new(Arc::clone(&collector));
    let base = spawn_app(Arc::clone(&collector)).await?;

    bridge.on_message("meteo/1", br#"{"node": 1}"#).await;
    bridge.on_message("meteo/2", br#"{"node": 2}"#).await;
    bridge.on_message("meteo/3", b"garbage").await;

    let health: HealthResponse = Client::new()
        .get(format!("{}/health", base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health.status, "ok");
    assert_eq!(health.active_stations, 2);

    collector.close().await;
    Ok(())
}

#[tokio::test]
async fn bad_requests_get_plain_text_reasons() -> Result<()> {
    // ---
    let collector = open_collector().await?;
    let base = spawn_app(Arc::clone(&collector)).await?;
    let client = Client::new();

    let response = client
        .get(format!("{}/node?id=8&t_min=yesterday", base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await?.contains("t_min"));

    let response = client.get(format!("{}/no/such/page", base)).send().await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Storage gone: history fails, the live page keeps working
    collector.close().await;
    let response = client.get(format!("{}/node?id=8", base)).send().await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let response = client.get(format!("{}/", base)).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}
