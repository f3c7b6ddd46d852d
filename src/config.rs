//! Configuration loader for the `meteod` collector service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, time::Duration};

use anyhow::{anyhow, bail, Result};

use crate::collector::CollectorSettings;

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Broker endpoint parsed from `[user[:password]@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttRemote {
    // ---
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttRemote {
    // ---
    /// Parse a remote of the form `[user[:password]@]host[:port]`.
    pub fn parse(input: &str) -> Result<Self> {
        // ---
        let input = input.trim();
        let (credentials, endpoint) = match input.rsplit_once('@') {
            Some((credentials, endpoint)) => (Some(credentials.trim()), endpoint),
            None => (None, input),
        };

        let (username, password) = match credentials {
            None | Some("") => (None, None),
            Some(c) => match c.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(c.to_string()), None),
            },
        };

        let (host, port) = match endpoint.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| anyhow!("Illegal port in MQTT remote '{}': {}", input, e))?;
                (host, port)
            }
            None => (endpoint, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            bail!("MQTT remote '{}' has no host", input);
        }

        Ok(MqttRemote {
            host: host.to_string(),
            port,
            username,
            password,
        })
    }
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite database file (or `:memory:`).
    pub db_path: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP listener port.
    pub http_port: u16,

    /// Seconds between two collector flush cycles.
    pub collector_delay: u64,

    /// Weight of the previous value in the exponential smoothing.
    pub smoothing_alpha: f64,

    /// MQTT broker endpoint.
    pub mqtt: MqttRemote,

    /// Topic filters to subscribe to.
    pub mqtt_topics: Vec<String>,

    /// Client id presented to the broker.
    pub mqtt_client_id: String,

    /// MQTT keep-alive in seconds.
    pub mqtt_keepalive: u64,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `METEOD_DB` – SQLite database file (default: `meteod.db`)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `HTTP_PORT` – HTTP port (default: 8900)
/// - `COLLECTOR_DELAY` – flush period in seconds (default: 300)
/// - `SMOOTHING_ALPHA` – smoothing weight in `[0, 1]` (default: 0.9)
/// - `MQTT_REMOTE` – `[user[:password]@]host[:port]` (default: `localhost`)
/// - `MQTT_TOPICS` – comma separated topic filters (default: `meteo/#,lightning/#`)
/// - `MQTT_CLIENT_ID` – broker client id (default: `meteod-<random>`)
/// - `MQTT_KEEPALIVE` – keep-alive seconds (default: 30)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_path = env_or!("METEOD_DB", "meteod.db");
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, 5);
    let http_port = parse_env!("HTTP_PORT", u16, 8900);
    let collector_delay = parse_env!("COLLECTOR_DELAY", u64, 300);
    let smoothing_alpha = parse_env!("SMOOTHING_ALPHA", f64, crate::models::DEFAULT_ALPHA);
    let mqtt = MqttRemote::parse(&env_or!("MQTT_REMOTE", "localhost"))?;
    let mqtt_topics = split_topics(&env_or!("MQTT_TOPICS", "meteo/#,lightning/#"));
    let mqtt_client_id = env::var("MQTT_CLIENT_ID")
        .unwrap_or_else(|_| format!("meteod-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));
    let mqtt_keepalive = parse_env!("MQTT_KEEPALIVE", u64, 30);

    let config = Config {
        db_path,
        db_pool_max,
        http_port,
        collector_delay,
        smoothing_alpha,
        mqtt,
        mqtt_topics,
        mqtt_client_id,
        mqtt_keepalive,
    };
    config.validate()?;
    Ok(config)
}

fn split_topics(raw: &str) -> Vec<String> {
    // ---
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    // ---
    /// Reject values the collector cannot work with.
    pub fn validate(&self) -> Result<()> {
        // ---
        if !(0.0..=1.0).contains(&self.smoothing_alpha) {
            bail!(
                "SMOOTHING_ALPHA must lie within [0, 1], got {}",
                self.smoothing_alpha
            );
        }
        if self.collector_delay == 0 {
            bail!("COLLECTOR_DELAY must be at least one second");
        }
        if self.mqtt_topics.is_empty() {
            bail!("MQTT_TOPICS must name at least one topic filter");
        }
        Ok(())
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        // ---
        CollectorSettings {
            alpha: self.smoothing_alpha,
            delay: Duration::from_secs(self.collector_delay),
        }
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive.max(5))
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the broker password while showing all configuration values that
    /// were loaded.
    pub fn log_config(&self) {
        // ---
        let remote = match (&self.mqtt.username, &self.mqtt.password) {
            (Some(user), Some(_)) => format!("{}:****@{}:{}", user, self.mqtt.host, self.mqtt.port),
            (Some(user), None) => format!("{}@{}:{}", user, self.mqtt.host, self.mqtt.port),
            _ => format!("{}:{}", self.mqtt.host, self.mqtt.port),
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  METEOD_DB       : {}", self.db_path);
        tracing::info!("  DB_POOL_MAX     : {}", self.db_pool_max);
        tracing::info!("  HTTP_PORT       : {}", self.http_port);
        tracing::info!("  COLLECTOR_DELAY : {}", self.collector_delay);
        tracing::info!("  SMOOTHING_ALPHA : {}", self.smoothing_alpha);
        tracing::info!("  MQTT_REMOTE     : {}", remote);
        tracing::info!("  MQTT_TOPICS     : {}", self.mqtt_topics.join(","));
        tracing::info!("  MQTT_CLIENT_ID  : {}", self.mqtt_client_id);
        tracing::info!("  MQTT_KEEPALIVE  : {}", self.mqtt_keepalive);
    }
}
