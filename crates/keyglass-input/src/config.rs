use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HooksConfig {
    /// Directory holding the evdev `event*` nodes.
    pub device_dir: PathBuf,
    /// Entries kept per axis history.
    pub history_capacity: usize,
    pub poll_timeout_ms: u64,
    pub decay_interval_ms: u64,
    /// Idle time after which an axis receives a synthetic zero.
    pub decay_after_ms: u64,
    pub resync_interval_ms: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev/input"),
            history_capacity: 5,
            poll_timeout_ms: 500,
            decay_interval_ms: 100,
            decay_after_ms: 50,
            resync_interval_ms: 1000,
        }
    }
}

impl HooksConfig {
    /// Loads config from a specified path.
    /// Returns default config if file doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Raise zero capacity and zero intervals to their minimum.
    pub fn validate(mut self) -> Self {
        if self.history_capacity == 0 {
            warn!("history_capacity 0 raised to 1");
            self.history_capacity = 1;
        }
        for (name, value) in [
            ("poll_timeout_ms", &mut self.poll_timeout_ms),
            ("decay_interval_ms", &mut self.decay_interval_ms),
            ("resync_interval_ms", &mut self.resync_interval_ms),
        ] {
            if *value == 0 {
                warn!("{name} 0 raised to 1");
                *value = 1;
            }
        }
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_millis(self.decay_interval_ms)
    }

    pub fn decay_after(&self) -> Duration {
        Duration::from_millis(self.decay_after_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }
}
