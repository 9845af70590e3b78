//! Subscriber setup for the binaries.
//!
//! The library only emits `tracing` events; whoever owns `main` calls
//! [`init_logging`] once.
//!
//! Environment variables:
//! - `RUST_LOG`: full filter directives, wins over everything else
//! - `LOG_LEVEL`: trace, debug, info, warn, error
//! - `LOG_FORMAT`: text or json

use crate::{SyncError, SyncResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(SyncError::Config(format!("invalid log format: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level used when neither `RUST_LOG` nor `LOG_LEVEL` is set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    pub fn from_env(default_level: &str) -> SyncResult<Self> {
        let mut config = Self {
            level: default_level.to_string(),
            ..Self::default()
        };
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    fn filter(&self) -> SyncResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(format!(
                "{level},hyper=warn,reqwest=warn",
                level = self.level
            ))
            .map_err(|e| SyncError::Config(format!("invalid log level {}: {e}", self.level))),
        }
    }
}

pub fn init_logging(config: &LogConfig) -> SyncResult<()> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| SyncError::Config(format!("logging already initialized: {e}")))
}
