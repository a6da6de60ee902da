//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `POOL_DATA_DIR` overrides `pool.data_dir` so the same file can be used
//! across deployments with different volumes.

use account_pool::PoolPaths;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub pool: PoolConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Admin API listener. Not started when absent.
    #[serde(default)]
    pub admin_listen_addr: Option<SocketAddr>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Origins allowed by CORS; `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_listen_addr: None,
            max_connections: default_max_connections(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Pool file locations and timing
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_available_file")]
    pub available_file: String,
    #[serde(default = "default_cooldown_file")]
    pub cooldown_file: String,
    #[serde(default = "default_released_file")]
    pub released_file: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl PoolConfig {
    pub fn paths(&self) -> PoolPaths {
        PoolPaths {
            available: self.data_dir.join(&self.available_file),
            cooldown: self.data_dir.join(&self.cooldown_file),
            released: self.data_dir.join(&self.released_file),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_max_connections() -> usize {
    1000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_available_file() -> String {
    account_pool::store::DEFAULT_AVAILABLE_FILE.to_string()
}

fn default_cooldown_file() -> String {
    account_pool::store::DEFAULT_COOLDOWN_FILE.to_string()
}

fn default_released_file() -> String {
    account_pool::store::DEFAULT_RELEASED_FILE.to_string()
}

fn default_cooldown_secs() -> u64 {
    account_pool::DEFAULT_COOLDOWN.as_secs()
}

fn default_sweep_interval_secs() -> u64 {
    account_pool::DEFAULT_SWEEP_INTERVAL.as_secs()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(dir) = std::env::var("POOL_DATA_DIR")
            && !dir.trim().is_empty()
        {
            config.pool.data_dir = PathBuf::from(dir.trim());
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let pool = &self.pool;

        if pool.cooldown_secs == 0 {
            return Err(common::Error::Config(
                "cooldown_secs must be greater than 0".into(),
            ));
        }

        if pool.sweep_interval_secs == 0 {
            return Err(common::Error::Config(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        // At least one sweep per cooldown period
        if pool.sweep_interval_secs >= pool.cooldown_secs {
            return Err(common::Error::Config(format!(
                "sweep_interval_secs ({}) must be shorter than cooldown_secs ({})",
                pool.sweep_interval_secs, pool.cooldown_secs
            )));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.server.allowed_origins.is_empty() {
            return Err(common::Error::Config(
                "allowed_origins must not be empty".into(),
            ));
        }
        for origin in &self.server.allowed_origins {
            if origin != "*" && axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(common::Error::Config(format!(
                    "allowed_origins entry {origin:?} is not a valid origin"
                )));
            }
        }

        let names = [
            ("available_file", &pool.available_file),
            ("cooldown_file", &pool.cooldown_file),
            ("released_file", &pool.released_file),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(common::Error::Config(format!("{field} must not be empty")));
            }
        }
        let paths = pool.paths();
        let [available, cooldown, released] =
            [&paths.available, &paths.cooldown, &paths.released].map(|p| normalize(p));
        if available == cooldown || available == released || cooldown == released {
            return Err(common::Error::Config(
                "available_file, cooldown_file and released_file must be distinct".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("account-dispenser.toml")
    }
}

/// Lexically resolve `.` and `..` so equivalent spellings of a path compare
/// equal. Does not touch the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
