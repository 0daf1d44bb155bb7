use std::env;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RillError};

/// Engine-level knobs shared by executors, stubs and collectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max number of query graphs driven concurrently by one executor.
    pub worker_slots: usize,
    /// How long a remote stub waits for a peer acknowledgement.
    pub remote_timeout_ms: u64,
    /// Max rows per batch emitted by table sources.
    pub batch_size_rows: usize,
    /// Location of the kernel CPU statistics file.
    pub proc_stat_path: String,
    /// Delay between two polls of a metric source.
    pub metric_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_slots: 4,
            remote_timeout_ms: 5_000,
            batch_size_rows: 8192,
            proc_stat_path: "/proc/stat".to_string(),
            metric_poll_interval_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        serde_json::from_str(&s).map_err(|e| RillError::InvalidConfig(format!("{path}: {e}")))
    }

    /// Apply `RILL_*` environment overrides on top of `self`.
    ///
    /// Recognized keys: `RILL_WORKER_SLOTS`, `RILL_REMOTE_TIMEOUT_MS`,
    /// `RILL_BATCH_SIZE_ROWS`, `RILL_PROC_STAT_PATH`, `RILL_METRIC_POLL_INTERVAL_MS`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<usize>("RILL_WORKER_SLOTS")? {
            self.worker_slots = v;
        }
        if let Some(v) = env_parse::<u64>("RILL_REMOTE_TIMEOUT_MS")? {
            self.remote_timeout_ms = v;
        }
        if let Some(v) = env_parse::<usize>("RILL_BATCH_SIZE_ROWS")? {
            self.batch_size_rows = v;
        }
        if let Ok(v) = env::var("RILL_PROC_STAT_PATH") {
            self.proc_stat_path = v;
        }
        if let Some(v) = env_parse::<u64>("RILL_METRIC_POLL_INTERVAL_MS")? {
            self.metric_poll_interval_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_slots == 0 {
            return Err(RillError::InvalidConfig(
                "worker_slots must be at least 1".to_string(),
            ));
        }
        if self.batch_size_rows == 0 {
            return Err(RillError::InvalidConfig(
                "batch_size_rows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| RillError::InvalidConfig(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}
