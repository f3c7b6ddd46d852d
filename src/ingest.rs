//! Bridge between the message bus and the collector.
//!
//! Two topic families are understood:
//! - `meteo/...` carries a weather packet
//!   `{"node": 8, "name": "Outdoor", "t": 21.0, "hum": 55.0, "p": 1013.0, "l_ir": 10, "l_vis": 20}`
//!   where only `node` is required and absent readings count as `0.0`; a
//!   fractional `node` is truncated toward zero
//! - `lightning/...` carries a strike `{"station": 3, "timestamp": 1700000000, "distance": 12.5}`
//!
//! Anything that fails to decode is logged and dropped; errors never travel
//! back to the bus client.
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::collector::Collector;
use crate::models::{Lightning, Reading};

// ---

pub const WEATHER_PREFIX: &str = "meteo/";
pub const LIGHTNING_PREFIX: &str = "lightning/";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed message on '{topic}': {reason}")]
    MalformedMessage { topic: String, reason: String },

    #[error("no handler for topic '{0}'")]
    UnknownTopic(String),
}

/// Weather packet as published by the sensor nodes.
#[derive(Debug, Deserialize)]
struct WeatherPacket {
    // ---
    #[serde(deserialize_with = "node_id")]
    node: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    hum: Option<f64>,
    #[serde(default)]
    p: Option<f64>,
    #[serde(default)]
    l_ir: Option<f64>,
    #[serde(default)]
    l_vis: Option<f64>,
}

/// Accept a station id sent as an integer or as a JSON float.
fn node_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Float(f64),
    }

    match Id::deserialize(deserializer)? {
        Id::Int(id) => Ok(id),
        Id::Float(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f.trunc() as i64)
        }
        Id::Float(f) => Err(serde::de::Error::custom(format!(
            "station id {} out of range",
            f
        ))),
    }
}

/// A decoded bus message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Weather {
        id: i64,
        name: String,
        reading: Reading,
    },
    Lightning(Lightning),
}

/// Decode `payload` according to the family of `topic`.
pub fn decode(topic: &str, payload: &[u8]) -> Result<Message, IngestError> {
    // ---
    let malformed = |e: serde_json::Error| IngestError::MalformedMessage {
        topic: topic.to_string(),
        reason: e.to_string(),
    };

    if topic.starts_with(WEATHER_PREFIX) {
        let packet: WeatherPacket = serde_json::from_slice(payload).map_err(malformed)?;
        Ok(Message::Weather {
            id: packet.node,
            name: packet.name.unwrap_or_default(),
            reading: Reading {
                temperature: packet.t.unwrap_or(0.0),
                humidity: packet.hum.unwrap_or(0.0),
                pressure: packet.p.unwrap_or(0.0),
                light_ir: packet.l_ir.unwrap_or(0.0),
                light_vis: packet.l_vis.unwrap_or(0.0),
            },
        })
    } else if topic.starts_with(LIGHTNING_PREFIX) {
        let lightning: Lightning = serde_json::from_slice(payload).map_err(malformed)?;
        Ok(Message::Lightning(lightning))
    } else {
        Err(IngestError::UnknownTopic(topic.to_string()))
    }
}

/// Feeds decoded bus messages into a shared collector.
#[derive(Clone)]
pub struct IngestBridge {
    collector: Arc<Collector>,
}

impl IngestBridge {
    // ---
    pub fn new(collector: Arc<Collector>) -> Self {
        IngestBridge { collector }
    }

    /// Handle one bus message. Failures are logged, never returned.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) {
        // ---
        match decode(topic, payload) {
            Ok(Message::Weather { id, name, reading }) => {
                tracing::debug!(station = id, name = %name, ?reading, "weather packet");
                self.collector.push(id, &name, reading).await;
            }
            Ok(Message::Lightning(lightning)) => {
                if let Err(e) = self.collector.push_lightning(&lightning).await {
                    tracing::error!(station = lightning.station, "failed to store lightning: {}", e);
                }
            }
            Err(IngestError::UnknownTopic(topic)) => {
                tracing::debug!(topic = %topic, "ignoring message");
            }
            Err(e) => {
                tracing::warn!(
                    payload = %String::from_utf8_lossy(payload),
                    "dropping message: {}",
                    e
                );
            }
        }
    }
}
