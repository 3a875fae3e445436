//! # Platform Configuration
//!
//! Everything the node needs to boot its root group: the peer's identity,
//! per-role service settings, where advertisements are stored, and the
//! loader and pool tuning.
//!
//! Loaded from an optional TOML file, then overridden from the environment.
//!
//! ```toml
//! [peer]
//! name = "alice"
//!
//! [store]
//! dir = "/var/lib/peer"
//!
//! [pool]
//! core_threads = 4
//! max_threads = 16
//!
//! [services."urn:pg:class:50470001000040008000000000000004"]
//! enabled = false
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `PG_CONFIG` | Path of the TOML file to load |
//! | `PG_PEER_NAME` | Peer name |
//! | `PG_STORE_DIR` | Directory for on-disk content stores |
//! | `PG_DISCOVERY_TIMEOUT_SECS` | Loader discovery timeout |
//! | `PG_WORKER_CORE` | Worker pool core threads |
//! | `PG_WORKER_MAX` | Worker pool maximum threads |
//! | `PG_WORKER_QUEUE` | Worker pool queue capacity |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use peer_group::{LoaderConfig, PoolConfig, StoreLocation};
use serde::{Deserialize, Serialize};
use shared_types::{ConfigParams, ModuleClassId, PeerId, ServiceConfig};
use thiserror::Error;
use tracing::info;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete platform configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub peer: PeerSection,
    pub store: StoreSection,
    pub loader: LoaderSection,
    pub pool: PoolSection,
    /// Per-role enable flags and parameters for the root group.
    pub services: BTreeMap<ModuleClassId, ServiceConfig>,
}

/// Identity of this peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSection {
    /// Human readable peer name. Empty means the host name.
    pub name: String,
    /// Persistent peer id. A fresh one is generated when absent.
    pub id: Option<PeerId>,
}

/// Content store location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Directory for on-disk stores. Stores are kept in memory when absent.
    pub dir: Option<PathBuf>,
}

/// Module loader tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    pub discovery_timeout_secs: u64,
    pub requery_interval_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for LoaderSection {
    fn default() -> Self {
        let defaults = LoaderConfig::default();
        Self {
            discovery_timeout_secs: defaults.discovery_timeout.as_secs(),
            requery_interval_secs: defaults.requery_interval.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

/// Worker pool sizing, applied to every group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub core_threads: usize,
    pub max_threads: usize,
    pub keep_alive_secs: u64,
    pub queue_capacity: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            core_threads: defaults.core_threads,
            max_threads: defaults.max_threads,
            keep_alive_secs: defaults.keep_alive.as_secs(),
            queue_capacity: defaults.queue_capacity,
        }
    }
}

impl PlatformConfig {
    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `PG_CONFIG` if set, then apply the `PG_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("PG_CONFIG") {
            Ok(path) => {
                info!("[Config] Loading {}", path);
                Self::load(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PG_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("PG_PEER_NAME") {
            self.peer.name = name;
        }
        if let Some(dir) = lookup("PG_STORE_DIR") {
            self.store.dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = parse_var(&lookup, "PG_DISCOVERY_TIMEOUT_SECS")? {
            self.loader.discovery_timeout_secs = secs;
        }
        if let Some(core) = parse_var(&lookup, "PG_WORKER_CORE")? {
            self.pool.core_threads = core;
        }
        if let Some(max) = parse_var(&lookup, "PG_WORKER_MAX")? {
            self.pool.max_threads = max;
        }
        if let Some(queue) = parse_var(&lookup, "PG_WORKER_QUEUE")? {
            self.pool.queue_capacity = queue;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.core_threads == 0 {
            return Err(ConfigError::Invalid("pool.core_threads must be at least 1".into()));
        }
        if self.pool.max_threads < self.pool.core_threads {
            return Err(ConfigError::Invalid(format!(
                "pool.max_threads ({}) is below pool.core_threads ({})",
                self.pool.max_threads, self.pool.core_threads
            )));
        }
        if self.pool.queue_capacity == 0 {
            return Err(ConfigError::Invalid("pool.queue_capacity must be at least 1".into()));
        }
        if self.loader.requery_interval_secs == 0 || self.loader.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("loader intervals must be non-zero".into()));
        }
        Ok(())
    }

    /// The root group's configuration.
    pub fn group_config(&self) -> ConfigParams {
        let name = if self.peer.name.is_empty() {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "peer".to_string())
        } else {
            self.peer.name.clone()
        };
        let mut params = ConfigParams::synthesize(name);
        if self.peer.id.is_some() {
            params.peer_id = self.peer.id;
        }
        params.services = self.services.clone();
        params
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            discovery_timeout: Duration::from_secs(self.loader.discovery_timeout_secs),
            requery_interval: Duration::from_secs(self.loader.requery_interval_secs),
            poll_interval: Duration::from_millis(self.loader.poll_interval_ms),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            core_threads: self.pool.core_threads,
            max_threads: self.pool.max_threads,
            keep_alive: Duration::from_secs(self.pool.keep_alive_secs),
            queue_capacity: self.pool.queue_capacity,
        }
    }

    pub fn store_location(&self) -> StoreLocation {
        match &self.store.dir {
            Some(dir) => StoreLocation::Directory(dir.clone()),
            None => StoreLocation::InMemory,
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
