use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub num_threads: usize,
    /// Jobs allowed to wait for a free worker. `None` never rejects.
    pub max_pending: Option<usize>,
    pub thread_name: String,
    /// Run tasks spawned with `spawn_local` to completion before the
    /// isolated scheduler is closed.
    pub drain_local_tasks: bool,
    pub shutdown_timeout_ms: u64,
    /// Scheduler ticks between polls of the isolated runtime's I/O and timer drivers.
    pub event_interval: u32,
}

impl Default for Config {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_threads: num_cpus * 2, // work items mostly sleep on timers and sockets
            max_pending: Some(num_cpus * 20),
            thread_name: "loop-bridge".to_string(),
            drain_local_tasks: true,
            shutdown_timeout_ms: 1_000,
            event_interval: 61,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_threads: num_cpus,
            max_pending: Some(num_cpus * 10),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 2,
            max_pending: None,
            ..Default::default()
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(?path, num_threads = config.num_threads, "loaded pool config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == 0 {
            return Err(ConfigError::Invalid("num_threads must be at least 1".into()));
        }
        if self.max_pending == Some(0) {
            return Err(ConfigError::Invalid(
                "max_pending must be at least 1 (omit it for an unbounded queue)".into(),
            ));
        }
        if self.event_interval == 0 {
            return Err(ConfigError::Invalid("event_interval must be at least 1".into()));
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid("thread_name must not be empty".into()));
        }
        Ok(())
    }
}
