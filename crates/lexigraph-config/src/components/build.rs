//! Build stage settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Controls how fragments are written into a tenant's stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Nodes or edges per write group
    #[serde(default = "default_batch_write_size")]
    pub batch_write_size: usize,
    /// When false every node and edge is its own write group
    #[serde(default = "default_enable_batch_writes")]
    pub enable_batch_writes: bool,
    /// Attempts per group before a conflict is reported as a failure
    #[serde(default = "default_max_conflict_attempts")]
    pub max_conflict_attempts: u32,
    #[serde(default = "default_conflict_backoff_base_ms")]
    pub conflict_backoff_base_ms: u64,
    #[serde(default = "default_conflict_backoff_max_ms")]
    pub conflict_backoff_max_ms: u64,
    /// Write groups in flight at once
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
}

fn default_batch_write_size() -> usize {
    25
}

fn default_enable_batch_writes() -> bool {
    true
}

fn default_max_conflict_attempts() -> u32 {
    5
}

fn default_conflict_backoff_base_ms() -> u64 {
    50
}

fn default_conflict_backoff_max_ms() -> u64 {
    2000
}

fn default_write_concurrency() -> usize {
    4
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_write_size: default_batch_write_size(),
            enable_batch_writes: default_enable_batch_writes(),
            max_conflict_attempts: default_max_conflict_attempts(),
            conflict_backoff_base_ms: default_conflict_backoff_base_ms(),
            conflict_backoff_max_ms: default_conflict_backoff_max_ms(),
            write_concurrency: default_write_concurrency(),
        }
    }
}

impl BuildConfig {
    /// Effective write group size
    pub fn group_size(&self) -> usize {
        if self.enable_batch_writes {
            self.batch_write_size.max(1)
        } else {
            1
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .conflict_backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.conflict_backoff_max_ms);
        Duration::from_millis(delay)
    }
}
