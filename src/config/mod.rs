//! Client configuration storage
//!
//! Local settings live in a TOML file under the platform config directory.
//! The session duration limit is not stored here: it comes from the camera
//! server at startup (see [`server`]).

pub mod server;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::{FailurePolicy, SessionSettings};

pub use server::{ServerConfig, SessionLimits};

/// Fallback session limit when the server does not provide one.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 60;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the camera server (serves `/config` and `/offer`)
    pub server_url: String,
    /// Accept self-signed TLS certificates from the camera server
    pub accept_invalid_certs: bool,
    /// STUN/TURN URLs handed to the peer connection (empty = host candidates only)
    pub ice_servers: Vec<String>,
    /// Upper bound on the ICE gathering wait during negotiation
    pub ice_gathering_timeout_secs: u64,
    /// Delay between stop and release of the peer connection
    pub teardown_grace_ms: u64,
    /// Period of the duration monitor
    pub check_interval_ms: u64,
    /// Session limit used when `/config` cannot be fetched
    pub default_max_duration_secs: u64,
    /// What to do with the session when negotiation fails
    pub negotiation_failure: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            accept_invalid_certs: false,
            ice_servers: Vec::new(),
            ice_gathering_timeout_secs: 10,
            teardown_grace_ms: 500,
            check_interval_ms: 1000,
            default_max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            negotiation_failure: FailurePolicy::default(),
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "camview", "camview")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<PathBuf> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        fs::write(&path, self.to_toml()?).context("Failed to write config file")?;
        Ok(path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Timing and policy knobs for the session manager.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            check_interval: Duration::from_millis(self.check_interval_ms.max(1)),
            teardown_grace: Duration::from_millis(self.teardown_grace_ms),
            gathering_timeout: Duration::from_secs(self.ice_gathering_timeout_secs),
            failure_policy: self.negotiation_failure,
        }
    }

    pub fn fallback_duration(&self) -> Duration {
        Duration::from_secs(self.default_max_duration_secs)
    }
}
