//! Configuration management for ember-miner.
//!
//! Configuration is loaded from a TOML file, with a small set of `EMBER_*`
//! environment variables layered on top for container deployments. Every
//! field has a default, so the daemon also runs with no file at all.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::pow::PowFamily;

/// Main configuration structure for the miner.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Proof-of-work family to mine
    #[serde(default)]
    pub pow: PowConfig,

    /// Pool connection; absent means solo mode
    pub pool: Option<PoolConfig>,

    /// Device pool configuration
    #[serde(default)]
    pub devices: DevicesConfig,

    /// Stats API; absent means no HTTP endpoint
    pub stats: Option<StatsConfig>,

    /// Local job generation, used when no pool is configured
    #[serde(default)]
    pub local: LocalConfig,
}

/// Proof-of-work selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PowConfig {
    /// Family name: "blake2bd", "cuckaroo", or "cuckatoo"
    pub family: String,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            family: "blake2bd".into(),
        }
    }
}

/// Pool connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Pool URL (stratum+tcp://...)
    pub url: String,

    /// Worker name
    pub worker: String,

    /// Password (if required)
    pub password: Option<String>,
}

/// Device pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DevicesConfig {
    /// Number of compute units to enumerate
    #[serde(default = "default_device_count")]
    pub count: u32,

    /// Search-space exponent per batch
    #[serde(default = "default_intensity")]
    pub intensity: u32,

    /// Kernel work-group size hint
    #[serde(default = "default_work_size")]
    pub work_size: u32,

    /// Device indices allowed to mine; absent means all
    pub allow: Option<Vec<u32>>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            count: default_device_count(),
            intensity: default_intensity(),
            work_size: default_work_size(),
            allow: None,
        }
    }
}

/// Stats API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    /// Listen address, e.g. "127.0.0.1:7785"
    pub listen: String,
}

/// Local job generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Seconds between synthetic jobs
    #[serde(default = "default_job_interval")]
    pub job_interval_secs: u64,

    /// Leading zero bits required of a solution
    #[serde(default = "default_difficulty_bits")]
    pub difficulty_bits: u32,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            job_interval_secs: default_job_interval(),
            difficulty_bits: default_difficulty_bits(),
        }
    }
}

fn default_device_count() -> u32 {
    1
}

fn default_intensity() -> u32 {
    24
}

fn default_work_size() -> u32 {
    256
}

fn default_job_interval() -> u64 {
    10
}

fn default_difficulty_bits() -> u32 {
    20
}

impl Config {
    /// Load configuration, starting from defaults, merging the file when one
    /// is given, then the `EMBER_*` environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(family) = std::env::var("EMBER_POW") {
            self.pow.family = family;
        }
        if let Ok(url) = std::env::var("EMBER_POOL_URL") {
            let worker = std::env::var("EMBER_POOL_WORKER").unwrap_or_default();
            self.pool = Some(PoolConfig {
                url,
                worker,
                password: std::env::var("EMBER_POOL_PASSWORD").ok(),
            });
        }
        if let Ok(listen) = std::env::var("EMBER_STATS_LISTEN") {
            self.stats = Some(StatsConfig { listen });
        }
    }

    /// The configured pow family. An unknown name is a fatal configuration
    /// error, surfaced before any device is touched.
    pub fn family(&self) -> Result<PowFamily> {
        PowFamily::from_config(&self.pow.family)
    }
}
