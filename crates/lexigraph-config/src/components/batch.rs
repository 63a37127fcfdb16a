//! Batch orchestrator settings

use serde::{Deserialize, Serialize};

/// Two-level concurrency: `num_workers` batches at once, each processing
/// `num_threads_per_worker` documents at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Documents per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_num_threads_per_worker")]
    pub num_threads_per_worker: usize,
    /// Keep scheduling after a document fails
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

fn default_num_workers() -> usize {
    2
}

fn default_batch_size() -> usize {
    8
}

fn default_num_threads_per_worker() -> usize {
    4
}

fn default_continue_on_error() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            batch_size: default_batch_size(),
            num_threads_per_worker: default_num_threads_per_worker(),
            continue_on_error: default_continue_on_error(),
        }
    }
}
