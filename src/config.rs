use crate::application::point_service::{PointPolicy, DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_POINT};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite:points.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid number: {value}")]
    NotANumber { name: &'static str, value: String },

    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("{name} must not exceed {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        max: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub policy: PointPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections = positive(
            &lookup,
            "DB_MAX_CONNECTIONS",
            u64::from(DEFAULT_MAX_CONNECTIONS),
            u64::from(u32::MAX),
        )?;
        let max_point = positive(
            &lookup,
            "MAX_POINT",
            DEFAULT_MAX_POINT as u64,
            i64::MAX as u64,
        )?;
        let lock_timeout_ms = positive(
            &lookup,
            "LOCK_TIMEOUT_MS",
            DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            u64::MAX,
        )?;

        // Верхние границы проверены в positive, преобразования без потерь
        Ok(Self {
            database_url,
            max_connections: max_connections as u32,
            policy: PointPolicy {
                max_point: max_point as i64,
                lock_timeout: Duration::from_millis(lock_timeout_ms),
            },
        })
    }
}

fn positive<F>(
    lookup: &F,
    name: &'static str,
    default: u64,
    max: u64,
) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    let value = u64::from_str(raw.trim()).map_err(|_| ConfigError::NotANumber {
        name,
        value: raw.clone(),
    })?;
    if value == 0 {
        return Err(ConfigError::NotPositive { name });
    }
    if value > max {
        return Err(ConfigError::OutOfRange { name, value, max });
    }
    Ok(value)
}
