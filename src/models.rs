//! Data models for the meteo collector.

use serde::{Deserialize, Serialize};

// ---

/// Default smoothing factor applied to every new reading.
pub const DEFAULT_ALPHA: f64 = 0.9;

/// One raw weather sample as delivered by a sensor node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Reading {
    // ---
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub light_ir: f64,
    pub light_vis: f64,
}

/// Live, exponentially smoothed state of one sensor node.
///
/// Owned by the collector; callers only ever see copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    // ---
    pub id: i64,
    pub name: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub light_ir: f64,
    pub light_vis: f64,
    alive: bool,
    #[serde(skip)]
    seeded: bool,
}

impl Station {
    // ---
    pub fn new(id: i64) -> Self {
        // ---
        Station {
            id,
            name: String::new(),
            temperature: 0.0,
            humidity: 0.0,
            pressure: 0.0,
            light_ir: 0.0,
            light_vis: 0.0,
            alive: true,
            seeded: false,
        }
    }

    /// Fold a new reading into the smoothed state and mark the station alive.
    ///
    /// The first reading is taken as-is; every later one is blended as
    /// `v' = alpha * v + (1 - alpha) * v_new`.
    pub fn push(&mut self, reading: Reading, alpha: f64) {
        // ---
        if self.seeded {
            let blend = |current: f64, new: f64| alpha * current + (1.0 - alpha) * new;
            self.temperature = blend(self.temperature, reading.temperature);
            self.humidity = blend(self.humidity, reading.humidity);
            self.pressure = blend(self.pressure, reading.pressure);
            self.light_ir = blend(self.light_ir, reading.light_ir);
            self.light_vis = blend(self.light_vis, reading.light_vis);
        } else {
            self.seeded = true;
            self.temperature = reading.temperature;
            self.humidity = reading.humidity;
            self.pressure = reading.pressure;
            self.light_ir = reading.light_ir;
            self.light_vis = reading.light_vis;
        }
        self.alive = true;
    }

    /// Keep the first non-empty name a node reports.
    pub fn adopt_name(&mut self, name: &str) {
        // ---
        if self.name.is_empty() && !name.is_empty() {
            self.name = name.to_string();
        }
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    /// Current smoothed values as a reading.
    pub fn reading(&self) -> Reading {
        // ---
        Reading {
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            light_ir: self.light_ir,
            light_vis: self.light_vis,
        }
    }
}

/// One persisted weather sample of a station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    // ---
    pub station: i64,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub light_ir: f64,
    pub light_vis: f64,
}

/// A single lightning strike reported by a station.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Lightning {
    // ---
    pub station: i64,
    /// Seconds since the epoch.
    pub timestamp: i64,
    /// Distance from the station in km.
    pub distance: f64,
}

/// Row of the station registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredStation {
    // ---
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Time range and pagination of a history query.
///
/// A negative bound leaves that side of the range open; both bounds are
/// inclusive otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    // ---
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub limit: i64,
    pub offset: i64,
}

impl Default for Window {
    fn default() -> Self {
        Window {
            min_timestamp: -1,
            max_timestamp: -1,
            limit: 1000,
            offset: 0,
        }
    }
}

impl Window {
    /// Unbounded window returning at most `limit` rows.
    pub fn latest(limit: i64) -> Self {
        Window {
            limit,
            ..Window::default()
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn reading(temperature: f64) -> Reading {
        // ---
        Reading {
            temperature,
            humidity: 55.0,
            pressure: 1013.0,
            light_ir: 10.0,
            light_vis: 20.0,
        }
    }

    #[test]
    fn test_first_push_is_taken_verbatim() {
        // ---
        let mut station = Station::new(8);
        station.push(reading(21.0), DEFAULT_ALPHA);

        assert_eq!(station.temperature, 21.0);
        assert_eq!(station.humidity, 55.0);
        assert_eq!(station.pressure, 1013.0);
        assert_eq!(station.light_ir, 10.0);
        assert_eq!(station.light_vis, 20.0);
        assert!(station.alive());
    }

    #[test]
    fn test_second_push_is_smoothed() {
        // ---
        let mut station = Station::new(8);
        station.push(reading(21.0), 0.9);
        station.push(reading(23.0), 0.9);

        assert!((station.temperature - 21.2).abs() < 1e-9);
        // Unchanged inputs stay put
        assert!((station.humidity - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_matches_recurrence() {
        // ---
        let alpha = 0.75;
        let inputs = [10.0, 14.0, 9.5, 30.0, -2.0, 17.25];

        let mut station = Station::new(1);
        let mut expected = inputs[0];
        station.push(reading(inputs[0]), alpha);
        for value in &inputs[1..] {
            expected = alpha * expected + (1.0 - alpha) * value;
            station.push(reading(*value), alpha);
        }

        assert!((station.temperature - expected).abs() < 1e-9);
    }

    #[test]
    fn test_push_revives_station() {
        // ---
        let mut station = Station::new(3);
        station.push(reading(1.0), DEFAULT_ALPHA);
        station.set_alive(false);
        assert!(!station.alive());

        station.push(reading(2.0), DEFAULT_ALPHA);
        assert!(station.alive());
    }

    #[test]
    fn test_first_non_empty_name_wins() {
        // ---
        let mut station = Station::new(4);
        station.adopt_name("");
        assert_eq!(station.name, "");

        station.adopt_name("Outdoor");
        station.adopt_name("");
        station.adopt_name("Garage");
        assert_eq!(station.name, "Outdoor");
    }

    #[test]
    fn test_default_window_is_unbounded() {
        // ---
        let window = Window::default();
        assert_eq!(window.min_timestamp, -1);
        assert_eq!(window.max_timestamp, -1);
        assert_eq!(window.limit, 1000);
        assert_eq!(window.offset, 0);
        assert_eq!(Window::latest(1).limit, 1);
    }
}
