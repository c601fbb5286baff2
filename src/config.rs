//! Configuration Module
//!
//! Handles loading and managing proxy configuration from a JSON file or
//! environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Upper bound for `ttl_secs` and `sweep_interval_secs` (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Proxy configuration parameters.
///
/// Immutable once loaded; the cache and router only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lifetime of a cached response in seconds
    pub ttl_secs: u64,
    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Base URL of the origin server
    pub origin_url: String,
    /// HTTP listen port
    pub listen_port: u16,
    /// Headers set on every response, hit or miss
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL` - Entry lifetime in seconds (default: 900)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `ORIGIN_URL` - Origin base URL (default: http://localhost:8082)
    /// - `LISTEN_PORT` - HTTP listen port (default: 8083)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl_secs: env::var("CACHE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ttl_secs),
            sweep_interval_secs: env::var("SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            origin_url: env::var("ORIGIN_URL").unwrap_or(defaults.origin_url),
            listen_port: env::var("LISTEN_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.listen_port),
            headers: defaults.headers,
        }
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Loads from `CONFIG_FILE` when set, otherwise from the environment,
    /// and validates the result.
    pub fn load() -> anyhow::Result<Self> {
        let config = match env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the proxy cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ttl_secs == 0 {
            bail!("ttl_secs must be greater than zero");
        }
        if self.ttl_secs > MAX_DURATION_SECS {
            bail!(
                "ttl_secs must be at most {}, got {}",
                MAX_DURATION_SECS,
                self.ttl_secs
            );
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        if self.sweep_interval_secs > MAX_DURATION_SECS {
            bail!(
                "sweep_interval_secs must be at most {}, got {}",
                MAX_DURATION_SECS,
                self.sweep_interval_secs
            );
        }
        let origin = reqwest::Url::parse(&self.origin_url)
            .with_context(|| format!("invalid origin_url {:?}", self.origin_url))?;
        if !matches!(origin.scheme(), "http" | "https") {
            bail!("origin_url must be http or https, got {}", origin.scheme());
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_secs: 900,
            sweep_interval_secs: 60,
            origin_url: "http://localhost:8082".to_string(),
            listen_port: 8083,
            headers: BTreeMap::new(),
        }
    }
}
