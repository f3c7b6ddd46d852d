//! Station collector: ingestion sink, periodic persister and history reader.
//!
//! Weather pushes only touch the in-memory station map. A background cycle
//! wakes up every `delay`, evicts stations that did not report since the
//! previous cycle, and writes the smoothed reading of every remaining station
//! to storage. Lightning events bypass the map and are written immediately.
//!
//! One async mutex guards both the station map and every storage path, so
//! pushes, the cycle and history queries never interleave on the database.
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

use crate::models::{DataPoint, Lightning, Reading, RegisteredStation, Station, Window};
use crate::storage::{Connection, Param, Storage, StorageError};

// ---

/// Errors surfaced by the collector.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("collector cycle already running")]
    AlreadyRunning,

    #[error("collector storage already open")]
    AlreadyOpen,

    #[error("collector storage is not open")]
    NotOpen,
}

/// Tunables of the aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectorSettings {
    // ---
    /// Weight of the previous smoothed value.
    pub alpha: f64,
    /// Period between two flush cycles.
    pub delay: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        CollectorSettings {
            alpha: crate::models::DEFAULT_ALPHA,
            delay: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub timestamp: i64,
    pub written: usize,
    pub failed: usize,
    pub evicted: usize,
}

struct State {
    stations: BTreeMap<i64, Station>,
    storage: Option<Storage>,
}

struct CycleHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Collector {
    // ---
    settings: CollectorSettings,
    state: Mutex<State>,
    cycle: StdMutex<Option<CycleHandle>>,
    /// Mirror of `state.stations.len()`, written under the state lock.
    tracked: AtomicUsize,
}

impl Collector {
    // ---
    pub fn new(settings: CollectorSettings) -> Self {
        // ---
        Collector {
            settings,
            state: Mutex::new(State {
                stations: BTreeMap::new(),
                storage: None,
            }),
            cycle: StdMutex::new(None),
            tracked: AtomicUsize::new(0),
        }
    }

    /// Open the backing store and make sure the schema exists.
    pub async fn open(&self, location: &str, max_connections: u32) -> Result<(), CollectorError> {
        // ---
        let mut state = self.state.lock().await;
        if state.storage.is_some() {
            return Err(CollectorError::AlreadyOpen);
        }
        state.storage = Some(Storage::open(location, max_connections).await?);
        tracing::info!(location, "collector storage opened");
        Ok(())
    }

    /// Record a weather reading for station `id`.
    ///
    /// Never touches storage; the reading is persisted by the next cycle.
    pub async fn push(&self, id: i64, name: &str, reading: Reading) {
        // ---
        let mut state = self.state.lock().await;
        let station = state.stations.entry(id).or_insert_with(|| {
            tracing::info!(station = id, name, "new station");
            Station::new(id)
        });
        station.adopt_name(name);
        station.push(reading, self.settings.alpha);
        self.tracked.store(state.stations.len(), Ordering::Relaxed);
        tracing::trace!(station = id, ?reading, "reading pushed");
    }

    /// Persist a lightning event right away.
    pub async fn push_lightning(&self, lightning: &Lightning) -> Result<(), CollectorError> {
        // ---
        let state = self.state.lock().await;
        let mut conn = open_connection(&state).await?;
        conn.exec(
            "INSERT OR REPLACE INTO lightnings (station_id, timestamp, distance) VALUES (?1, ?2, ?3)",
            &[
                Param::Int(lightning.station),
                Param::Int(lightning.timestamp),
                Param::Real(lightning.distance),
            ],
        )
        .await?;
        tracing::info!(
            station = lightning.station,
            timestamp = lightning.timestamp,
            distance_km = lightning.distance,
            "lightning recorded"
        );
        Ok(())
    }

    /// Spawn the background flush cycle. Storage must be open.
    pub async fn start(self: &Arc<Self>) -> Result<(), CollectorError> {
        // ---
        if self.state.lock().await.storage.is_none() {
            return Err(CollectorError::NotOpen);
        }

        let mut cycle = self.cycle.lock().unwrap_or_else(|e| e.into_inner());
        if cycle.is_some() {
            return Err(CollectorError::AlreadyRunning);
        }

        let (shutdown, mut stop) = watch::channel(false);
        let collector = Arc::clone(self);
        let delay = self.settings.delay;
        let task = tokio::spawn(async move {
            // ---
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => break,
                }
                match collector.cycle().await {
                    Ok(report) => tracing::debug!(
                        written = report.written,
                        failed = report.failed,
                        evicted = report.evicted,
                        "collector cycle done"
                    ),
                    Err(e) => tracing::error!("collector cycle failed: {}", e),
                }
            }
            tracing::debug!("collector cycle stopped");
        });

        *cycle = Some(CycleHandle { shutdown, task });
        tracing::info!(delay_secs = delay.as_secs(), "collector cycle started");
        Ok(())
    }

    /// Run one flush cycle now.
    ///
    /// Stations still marked not-alive from the previous cycle are evicted
    /// first; every remaining station is marked not-alive and written. A
    /// station whose write fails is logged and skipped.
    pub async fn cycle(&self) -> Result<CycleReport, CollectorError> {
        // ---
        let mut state = self.state.lock().await;
        let State { stations, storage } = &mut *state;
        let storage = storage.as_ref().ok_or(CollectorError::NotOpen)?;

        let before = stations.len();
        stations.retain(|_, station| station.alive());
        self.tracked.store(stations.len(), Ordering::Relaxed);
        let mut report = CycleReport {
            timestamp: Utc::now().timestamp(),
            evicted: before - stations.len(),
            ..CycleReport::default()
        };
        if report.evicted > 0 {
            tracing::info!(evicted = report.evicted, "purged silent stations");
        }

        let mut conn = match storage.connect().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::error!("cannot reach storage for flush: {}", e);
                None
            }
        };

        for station in stations.values_mut() {
            station.set_alive(false);
            let Some(conn) = conn.as_mut() else {
                report.failed += 1;
                continue;
            };
            match write_station(conn, station, report.timestamp).await {
                Ok(()) => {
                    report.written += 1;
                    tracing::debug!(station = station.id, name = %station.name, "station flushed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(station = station.id, "failed to flush station: {}", e);
                }
            }
        }

        Ok(report)
    }

    /// Snapshot of every tracked station.
    pub async fn active_stations(&self) -> Vec<Station> {
        // ---
        let state = self.state.lock().await;
        state.stations.values().cloned().collect()
    }

    /// Number of tracked stations, read without waiting on a running cycle.
    pub fn station_count(&self) -> usize {
        self.tracked.load(Ordering::Relaxed)
    }

    /// Copy of one tracked station, if any.
    pub async fn station(&self, id: i64) -> Option<Station> {
        // ---
        let state = self.state.lock().await;
        state.stations.get(&id).cloned()
    }

    /// Flushed samples of `station`, newest first.
    pub async fn query(&self, station: i64, window: Window) -> Result<Vec<DataPoint>, CollectorError> {
        // ---
        let state = self.state.lock().await;
        let mut conn = open_connection(&state).await?;

        let sql = r#"
            SELECT timestamp, temperature, humidity, pressure, light_ir, light_vis
              FROM readings
             WHERE station_id = ?1
               AND (?2 < 0 OR timestamp >= ?2)
               AND (?3 < 0 OR timestamp <= ?3)
             ORDER BY timestamp DESC
             LIMIT ?4 OFFSET ?5
        "#;
        let mut params = window_params(window);
        params.insert(0, Param::Int(station));

        let mut rs = conn.query(sql, &params);
        let mut points = Vec::new();
        loop {
            match rs.next().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_missing_table() => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
            points.push(DataPoint {
                station,
                timestamp: rs.get_long(0)?,
                temperature: rs.get_float(1)?,
                humidity: rs.get_float(2)?,
                pressure: rs.get_float(3)?,
                light_ir: rs.get_float(4)?,
                light_vis: rs.get_float(5)?,
            });
        }
        Ok(points)
    }

    /// Lightning events of `station`, newest first.
    pub async fn query_lightnings(
        &self,
        station: i64,
        window: Window,
    ) -> Result<Vec<Lightning>, CollectorError> {
        // ---
        let sql = r#"
            SELECT station_id, timestamp, distance
              FROM lightnings
             WHERE station_id = ?1
               AND (?2 < 0 OR timestamp >= ?2)
               AND (?3 < 0 OR timestamp <= ?3)
             ORDER BY timestamp DESC
             LIMIT ?4 OFFSET ?5
        "#;
        let mut params = window_params(window);
        params.insert(0, Param::Int(station));
        self.fetch_lightnings(sql, &params).await
    }

    /// Lightning events of every station, newest first.
    pub async fn query_all_lightnings(&self, window: Window) -> Result<Vec<Lightning>, CollectorError> {
        // ---
        let sql = r#"
            SELECT station_id, timestamp, distance
              FROM lightnings
             WHERE (?1 < 0 OR timestamp >= ?1)
               AND (?2 < 0 OR timestamp <= ?2)
             ORDER BY timestamp DESC, station_id
             LIMIT ?3 OFFSET ?4
        "#;
        self.fetch_lightnings(sql, &window_params(window)).await
    }

    async fn fetch_lightnings(
        &self,
        sql: &str,
        params: &[Param],
    ) -> Result<Vec<Lightning>, CollectorError> {
        // ---
        let state = self.state.lock().await;
        let mut conn = open_connection(&state).await?;

        let mut rs = conn.query(sql, params);
        let mut events = Vec::new();
        loop {
            match rs.next().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_missing_table() => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
            events.push(Lightning {
                station: rs.get_long(0)?,
                timestamp: rs.get_long(1)?,
                distance: rs.get_float(2)?,
            });
        }
        Ok(events)
    }

    /// The station registry, ordered by id.
    pub async fn registered_stations(&self) -> Result<Vec<RegisteredStation>, CollectorError> {
        // ---
        let state = self.state.lock().await;
        let mut conn = open_connection(&state).await?;

        let mut rs = conn.query("SELECT id, name, description FROM stations ORDER BY id", &[]);
        let mut registry = Vec::new();
        while rs.next().await? {
            registry.push(RegisteredStation {
                id: rs.get_long("id")?,
                name: rs.get_string("name")?,
                description: rs.get_string("description")?,
            });
        }
        Ok(registry)
    }

    /// Stop the cycle, flush the stations once more and release storage.
    /// Safe to call more than once.
    pub async fn close(&self) {
        // ---
        let handle = self
            .cycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(CycleHandle { shutdown, task }) = handle {
            let _ = shutdown.send(true);
            if let Err(e) = task.await {
                tracing::warn!("collector cycle ended abnormally: {}", e);
            }
        }

        match self.cycle().await {
            Ok(report) => tracing::info!(written = report.written, "final flush done"),
            Err(CollectorError::NotOpen) => {}
            Err(e) => tracing::error!("final flush failed: {}", e),
        }

        let storage = self.state.lock().await.storage.take();
        if let Some(storage) = storage {
            storage.close().await;
            tracing::info!("collector closed");
        }
    }
}

// ---

async fn open_connection(state: &State) -> Result<Connection, CollectorError> {
    // ---
    let storage = state.storage.as_ref().ok_or(CollectorError::NotOpen)?;
    Ok(storage.connect().await?)
}

fn window_params(window: Window) -> Vec<Param> {
    // ---
    vec![
        Param::Int(window.min_timestamp),
        Param::Int(window.max_timestamp),
        Param::Int(window.limit),
        Param::Int(window.offset),
    ]
}

/// Register `station` and store its current reading at `timestamp`.
async fn write_station(
    conn: &mut Connection,
    station: &Station,
    timestamp: i64,
) -> Result<(), StorageError> {
    // ---
    conn.exec(
        r#"
        INSERT INTO stations (id, name, description) VALUES (?1, ?2, '')
        ON CONFLICT (id) DO UPDATE SET name = excluded.name
         WHERE excluded.name <> '' AND stations.name = ''
        "#,
        &[Param::Int(station.id), Param::Text(station.name.clone())],
    )
    .await?;

    let reading = station.reading();
    conn.exec(
        r#"
        INSERT OR REPLACE INTO readings
            (station_id, timestamp, temperature, humidity, pressure, light_ir, light_vis)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        &[
            Param::Int(station.id),
            Param::Int(timestamp),
            Param::Real(reading.temperature),
            Param::Real(reading.humidity),
            Param::Real(reading.pressure),
            Param::Real(reading.light_ir),
            Param::Real(reading.light_vis),
        ],
    )
    .await?;
    Ok(())
}
