use serde::{Deserialize, Serialize};

use crate::error::{BfmtError, BfmtResult};
use crate::BLOCK_LEN;

/// Default per-worker frame cap: 1 MiB
pub const DEFAULT_FRAME_THRESHOLD: u64 = 1024 * 1024;

/// Top-level configuration (loaded from bfmt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BfmtConfig {
    pub driver: DriverConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Worker thread count (0 = available parallelism)
    pub workers: usize,
    /// Upper bound on a worker's I/O buffer in bytes (multiple of 8)
    pub frame_threshold: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl DriverConfig {
    /// Worker count to plan with, before clamping to the input size.
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn validate(&self) -> BfmtResult<()> {
        if self.frame_threshold == 0 || self.frame_threshold % BLOCK_LEN as u64 != 0 {
            return Err(BfmtError::InvalidFrameThreshold(self.frame_threshold));
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            frame_threshold: DEFAULT_FRAME_THRESHOLD,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
