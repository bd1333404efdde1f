//! Service configuration.
//!
//! Resolved in priority order:
//! 1. **Environment**: `WDK_FILTER_FETCH_TIMEOUT_MS`.
//! 2. **Config file**: JSON, e.g. `{"fetch_timeout_ms": 5000}`.
//! 3. **Compiled defaults**: [`ServiceConfig::default`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const FETCH_TIMEOUT_ENV: &str = "WDK_FILTER_FETCH_TIMEOUT_MS";

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound on each collaborator call; elapsing counts as a failed fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
        }
    }
}

impl ServiceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Defaults with the environment applied.
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// Read a JSON config file, then apply the environment.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::read_file(path)?.overlay_env())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn overlay_env(self) -> Self {
        let raw = std::env::var(FETCH_TIMEOUT_ENV).ok();
        self.with_timeout_override(raw.as_deref())
    }

    /// Apply a raw `WDK_FILTER_FETCH_TIMEOUT_MS` value. Values that are not a
    /// whole number of milliseconds are logged and ignored.
    fn with_timeout_override(mut self, raw: Option<&str>) -> Self {
        if let Some(raw) = raw {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.fetch_timeout_ms = ms,
                Err(_) => {
                    log::warn!("Ignoring {FETCH_TIMEOUT_ENV}={raw:?}: not a number of milliseconds")
                }
            }
        }
        self
    }
}
