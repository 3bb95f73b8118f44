use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Postgres,
}

impl std::str::FromStr for DatabaseDriver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("unsupported driver: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub driver: DatabaseDriver,
    pub log_mode: bool, // log every SQL statement
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let url = get("DATABASE_URL").context("DATABASE_URL must be set")?;
        let driver = get("DATABASE_DRIVER")
            .unwrap_or_else(|| "postgres".into())
            .parse()?;
        let log_mode = parse_or(&get, "DATABASE_LOG_MODE", false)?;
        let max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?;
        let timeout_ms: u64 = parse_or(&get, "REQUEST_TIMEOUT_MS", 5000)?;

        Ok(Self {
            database: DatabaseConfig {
                url,
                driver,
                log_mode,
                max_connections,
            },
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "APP_PORT", 8080)?,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
