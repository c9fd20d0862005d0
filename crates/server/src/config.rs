//! Process configuration loaded from environment variables.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// How committed events reach projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionDelivery {
    /// Synchronously, before the command returns.
    #[default]
    Inline,
    /// Through one queue and worker per projection.
    Channel,
}

impl FromStr for ProjectionDelivery {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(ProjectionDelivery::Inline),
            "channel" => Ok(ProjectionDelivery::Channel),
            _ => Err(()),
        }
    }
}

/// Server configuration.
///
/// | variable              | default     |
/// |-----------------------|-------------|
/// | `HOST`                | `0.0.0.0`   |
/// | `PORT`                | `3000`      |
/// | `RUST_LOG`            | `info`      |
/// | `LOG_FORMAT`          | `pretty`    |
/// | `DATABASE_URL`        | in-memory   |
/// | `MAX_PAGE_SIZE`       | `100`       |
/// | `PROJECTION_DELIVERY` | `inline`    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub max_page_size: usize,
    pub projection_delivery: ProjectionDelivery,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&get, "LOG_FORMAT")?.unwrap_or_default(),
            database_url: get("DATABASE_URL"),
            max_page_size: match parse(&get, "MAX_PAGE_SIZE")? {
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        key: "MAX_PAGE_SIZE",
                        value: "0".to_string(),
                    });
                }
                Some(size) => size,
                None => defaults.max_page_size,
            },
            projection_delivery: parse(&get, "PROJECTION_DELIVERY")?.unwrap_or_default(),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            max_page_size: projections::query::DEFAULT_MAX_PAGE_SIZE,
            projection_delivery: ProjectionDelivery::Inline,
        }
    }
}
