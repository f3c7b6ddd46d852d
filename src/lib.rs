//! `meteod`: weather station collector.
//!
//! Sensor nodes publish readings over MQTT; the [`Collector`] smooths them in
//! memory, flushes one row per live station to SQLite every cycle and serves
//! the history back through the HTML/CSV routes in [`routes`].
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): each
//! module exposes a narrow surface and the commonly used types are
//! re-exported here so siblings only depend on the crate root.

pub mod collector;
pub mod config;
pub mod ingest;
pub mod models;
pub mod mqtt;
pub mod routes;
pub mod schema;
pub mod storage;

pub use collector::{Collector, CollectorError, CollectorSettings, CycleReport};
pub use config::Config;
pub use ingest::IngestBridge;
pub use models::{DataPoint, Lightning, Reading, RegisteredStation, Station, Window};
pub use storage::{Storage, StorageError};
