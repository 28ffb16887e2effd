//! Configuration management.
//!
//! Configuration is stored at `~/.config/gatehouse/config.json`. Every field
//! has a default, so a missing file or missing keys are fine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "gatehouse";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Profile-scoped credential file name
const PROFILE_STORE_FILE: &str = "profile.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend origin, e.g. `https://dash.example.com`
    pub base_url: String,

    /// HTTP timeout for every call. Also bounds how long a verification
    /// can hold the guard's in-flight slot.
    pub request_timeout_secs: u64,

    /// Quiet period before a guard's hard verification fires.
    /// Absorbs bursts of re-renders.
    pub debounce_ms: u64,

    /// Cadence of the background re-verification while authorized.
    pub background_interval_secs: u64,

    /// Unauthenticated redirects allowed per guard mount.
    pub redirect_budget: u32,

    /// Upper bound on one verification, on top of the HTTP timeout.
    pub verify_timeout_secs: u64,

    /// Proactive access-token renewal cadence. Shorter than the ~15 minute
    /// token lifetime.
    pub refresh_interval_secs: u64,

    /// Refresh credential travels as a cookie rather than a stored token.
    pub refresh_via_cookie: bool,

    /// Endpoint answering "who am I" for a bearer credential.
    pub verify_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
            debounce_ms: 150,
            background_interval_secs: 15,
            redirect_budget: 3,
            verify_timeout_secs: 30,
            refresh_interval_secs: 14 * 60,
            refresh_via_cookie: false,
            verify_path: "/api/auth/me".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the profile-scoped credential store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn profile_store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(PROFILE_STORE_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
