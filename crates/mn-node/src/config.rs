//! Node process configuration, read from `MLNODE_*` environment variables.

use mn_types::{config_error, TaskResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_COORDINATOR_URL: &str = "http://127.0.0.1:10710";
pub const DEFAULT_CLIENT_POOL_SIZE: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub coordinator_url: String,
    pub registry_dir: PathBuf,
    pub client_pool_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            coordinator_url: DEFAULT_COORDINATOR_URL.to_string(),
            registry_dir: default_registry_dir(),
            client_pool_size: DEFAULT_CLIENT_POOL_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> TaskResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or blank keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> TaskResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("MLNODE_COORDINATOR_URL") {
            config.coordinator_url = url;
        }
        if let Some(dir) = get("MLNODE_REGISTRY_DIR") {
            config.registry_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("MLNODE_CLIENT_POOL_SIZE") {
            config.client_pool_size = parse_var("MLNODE_CLIENT_POOL_SIZE", &raw)?;
        }
        if let Some(raw) = get("MLNODE_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("MLNODE_REQUEST_TIMEOUT_SECS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TaskResult<()> {
        if self.coordinator_url.trim().is_empty() {
            return Err(config_error!("coordinator_url must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(config_error!("request_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_registry_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mlnode")
        .join("registry")
}

fn parse_var<T>(key: &str, raw: &str) -> TaskResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| config_error!("invalid {key}={raw:?}: {e}"))
}
