//! Process configuration loaded from a YAML file.

use serde::{Deserialize, Deserializer};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::DatasetPaths;
use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP frontend binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Headers checked, in order, for the client address on `GET /`
    #[serde(default)]
    pub real_ip_header: Vec<String>,
    /// Number of request worker threads (defaults to available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Dataset storage and refresh settings
    pub download: DatasetConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Where datasets live, where they come from and how often they refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Storage directory holding `city.mmdb` and `asn.mmdb`
    pub dir: PathBuf,
    /// Refresh interval in seconds; `24h`-style duration strings are
    /// accepted and rounded down to whole seconds
    #[serde(deserialize_with = "deserialize_gap")]
    pub reload_gap: u64,
    pub city_url: String,
    pub asn_url: String,
}

impl DatasetConfig {
    /// Refresh interval as a `Duration`.
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_gap)
    }

    /// Dataset file locations inside the storage directory.
    pub fn paths(&self) -> DatasetPaths {
        DatasetPaths::in_dir(&self.dir)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default level filter; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,
    /// Access log destination (`stderr`, `stdout`, or a file path);
    /// no access log when unset
    #[serde(default)]
    pub access: Option<String>,
    /// Application log destinations, each `stderr`, `stdout`, or a file path
    #[serde(default = "default_output", deserialize_with = "deserialize_outputs")]
    pub output: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            access: None,
            output: default_output(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_level() -> String {
    "info".to_string()
}

fn default_output() -> Vec<String> {
    vec!["stderr".to_string()]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn deserialize_outputs<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(output) => vec![output],
        OneOrMany::Many(outputs) => outputs,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Gap {
    Seconds(u64),
    Text(String),
}

fn deserialize_gap<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match Gap::deserialize(deserializer)? {
        Gap::Seconds(secs) => Ok(secs),
        Gap::Text(text) => humantime::parse_duration(text.trim())
            .map(|gap| gap.as_secs())
            .map_err(|e| serde::de::Error::custom(format!("invalid reload_gap {:?}: {}", text, e))),
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate config from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.download.reload_gap == 0 {
            return Err(Error::Config("download.reload_gap must be positive".to_string()));
        }
        if self.download.city_url.trim().is_empty() {
            return Err(Error::Config("download.city_url is empty".to_string()));
        }
        if self.download.asn_url.trim().is_empty() {
            return Err(Error::Config("download.asn_url is empty".to_string()));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be positive".to_string()));
        }
        if self.log.access.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(Error::Config("log.access is empty".to_string()));
        }
        Ok(())
    }

    /// Worker thread count, falling back to available parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}
