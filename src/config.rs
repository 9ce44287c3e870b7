//! Service configuration.
//!
//! Defaults come from environment variables (a `.env` file is honoured by the
//! binary through dotenv). An optional YAML file overrides the environment:
//!
//! ```yaml
//! intake:
//!   bind: "0.0.0.0:3000"
//!   ingest_addr: "localhost:5000"
//!   connect_timeout_ms: 3000
//! ingest:
//!   bind: "0.0.0.0:5000"
//!   journal_path: "storage/data.json"
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::wire::DEFAULT_MAX_PAYLOAD;

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Yaml(e) => write!(f, "Failed to parse YAML config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Intake (HTTP) side configuration
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// HTTP listen address
    pub bind: String,
    /// Address of the ingest server the intake relays to
    pub ingest_addr: String,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            bind: env_or("HTTP_BIND", "0.0.0.0:3000".to_string()),
            ingest_addr: env_or("INGEST_ADDR", "localhost:5000".to_string()),
            connect_timeout: Duration::from_millis(env_or("RELAY_CONNECT_TIMEOUT_MS", 3000)),
            write_timeout: Duration::from_millis(env_or("RELAY_WRITE_TIMEOUT_MS", 3000)),
        }
    }
}

/// Ingest (TCP) side configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// TCP listen address
    pub bind: String,
    /// How long a connected sender may take to deliver its payload
    pub read_timeout: Duration,
    pub max_payload: usize,
    pub database_url: String,
    pub journal_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: env_or("INGEST_BIND", "0.0.0.0:5000".to_string()),
            read_timeout: Duration::from_millis(env_or("INGEST_READ_TIMEOUT_MS", 5000)),
            max_payload: env_or("INGEST_MAX_PAYLOAD", DEFAULT_MAX_PAYLOAD),
            database_url: env_or(
                "DATABASE_URL",
                "postgres://localhost:5432/message_db".to_string(),
            ),
            journal_path: PathBuf::from(env_or(
                "JOURNAL_PATH",
                "storage/data.json".to_string(),
            )),
        }
    }
}

/// Combined configuration for both services
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub intake: IntakeConfig,
    pub ingest: IngestConfig,
}

impl RelayConfig {
    /// Environment defaults, overridden by `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = RelayConfig::default();
        if let Some(path) = path {
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply_yaml(&contents)?;
            tracing::info!("Loaded configuration overrides from {}", path.display());
        }
        Ok(config)
    }

    /// Apply overrides from a YAML document
    pub fn apply_yaml(&mut self, contents: &str) -> Result<(), ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(contents).map_err(ConfigError::Yaml)?;

        if let Some(intake) = file.intake {
            if let Some(bind) = intake.bind {
                self.intake.bind = bind;
            }
            if let Some(addr) = intake.ingest_addr {
                self.intake.ingest_addr = addr;
            }
            if let Some(ms) = intake.connect_timeout_ms {
                self.intake.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = intake.write_timeout_ms {
                self.intake.write_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(ingest) = file.ingest {
            if let Some(bind) = ingest.bind {
                self.ingest.bind = bind;
            }
            if let Some(ms) = ingest.read_timeout_ms {
                self.ingest.read_timeout = Duration::from_millis(ms);
            }
            if let Some(max) = ingest.max_payload {
                self.ingest.max_payload = max;
            }
            if let Some(url) = ingest.database_url {
                self.ingest.database_url = url;
            }
            if let Some(path) = ingest.journal_path {
                self.ingest.journal_path = path;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    intake: Option<IntakeFile>,
    ingest: Option<IngestFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IntakeFile {
    bind: Option<String>,
    ingest_addr: Option<String>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IngestFile {
    bind: Option<String>,
    read_timeout_ms: Option<u64>,
    max_payload: Option<usize>,
    database_url: Option<String>,
    journal_path: Option<PathBuf>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid {} value '{}': {}, using default", key, raw, e);
            default
        }),
        Err(_) => default,
    }
}
