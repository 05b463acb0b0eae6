use std::env;
use std::fmt::Display;
use std::fs::read_to_string;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub mongodb_uri: String,
    pub database_name: String,
    pub database_backend: DatabaseBackend,
    pub cron_secret: String,
    /// Zero disables the in-process sweeper.
    pub sweep_interval: Duration,
    pub reassembly_timeout: Duration,
    pub seed_database: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DatabaseBackend {
    Mongo,
    Memory,
}

impl FromStr for DatabaseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<DatabaseBackend, String> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(DatabaseBackend::Mongo),
            "memory" => Ok(DatabaseBackend::Memory),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        Ok(Config {
            bind_address: try_load("BIND_ADDRESS", "127.0.0.1:8080")?,
            mongodb_uri: try_load("MONGODB_URI", "mongodb://localhost:27017")?,
            database_name: try_load("DATABASE_NAME", "marketplace")?,
            database_backend: try_load("DATABASE_BACKEND", "mongo")?,
            cron_secret: read_secret("CRON_SECRET")?,
            sweep_interval: Duration::from_secs(try_load("SWEEP_INTERVAL_SECS", "300")?),
            reassembly_timeout: Duration::from_secs(try_load("REASSEMBLY_TIMEOUT_SECS", "60")?),
            seed_database: try_load("SEED_DATABASE", "false")?,
        })
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, Error>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        info!("{} not set, using default: {}", key, default);
        default.to_string()
    });

    value.trim().parse().map_err(|err: T::Err| {
        warn!("Invalid {} value: {}", key, err);
        Error::InvalidConfig {
            key,
            reason: err.to_string(),
        }
    })
}

/// Reads from the environment first, then from a mounted docker secret.
fn read_secret(key: &'static str) -> Result<String, Error> {
    if let Ok(value) = env::var(key) {
        if !value.trim().is_empty() {
            return Ok(value.trim().to_string());
        }
    }

    let path = format!("/run/secrets/{}", key);
    let secret = read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|err| {
            warn!("Failed to read {} from file: {}", key, err);
            Error::InvalidConfig {
                key,
                reason: "secret is not set".into(),
            }
        })?;

    if secret.is_empty() {
        return Err(Error::InvalidConfig {
            key,
            reason: "secret is empty".into(),
        });
    }

    Ok(secret)
}
