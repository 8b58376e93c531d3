use std::path::Path;

use message_worker_core::{Error, Result};
use serde::{Deserialize, Serialize};

fn default_thread_count() -> u32 {
    1
}

fn default_gc_flush_interval_seconds() -> u64 {
    10
}

fn default_queue_poll_wait_seconds() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

/// Worker runtime configuration.
///
/// The adapter and its broker client are constructed separately and handed to
/// [`Worker::new`](crate::Worker::new); everything else the runtime honors is
/// here. Unknown keys in a config file are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerOptions {
    /// Child processes to fork; 0 keeps everything in-process.
    #[serde(default)]
    pub fork_count: u32,

    /// Consumer threads per process; 0 runs a single inline loop.
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,

    /// Idle sleep after an empty poll; 0 polls back-to-back.
    #[serde(default)]
    pub sleep_seconds: u64,

    /// Minimum interval between memory-collection hints.
    #[serde(default = "default_gc_flush_interval_seconds")]
    pub gc_flush_interval_seconds: u64,

    /// Long-poll wait passed to cloud-style brokers.
    #[serde(default = "default_queue_poll_wait_seconds")]
    pub queue_poll_wait_seconds: u64,

    /// Broker connection string. Required.
    #[serde(default)]
    pub mq_endpoint: String,

    /// AMQP-style queue durability.
    #[serde(default = "default_true")]
    pub durable: bool,

    /// Whether `start` blocks until all forked children exit.
    #[serde(default = "default_true")]
    pub wait: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        WorkerOptions {
            fork_count: 0,
            thread_count: default_thread_count(),
            sleep_seconds: 0,
            gc_flush_interval_seconds: default_gc_flush_interval_seconds(),
            queue_poll_wait_seconds: default_queue_poll_wait_seconds(),
            mq_endpoint: String::new(),
            durable: true,
            wait: true,
        }
    }
}

impl WorkerOptions {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("invalid worker options file: {e}")))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.mq_endpoint.trim().is_empty() {
            return Err(Error::Configuration("mq_endpoint is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WorkerOptions::default();

        assert_eq!(options.fork_count, 0);
        assert_eq!(options.thread_count, 1);
        assert_eq!(options.sleep_seconds, 0);
        assert_eq!(options.gc_flush_interval_seconds, 10);
        assert_eq!(options.queue_poll_wait_seconds, 15);
        assert!(options.durable);
        assert!(options.wait);
    }

    #[test]
    fn test_validate_requires_endpoint() {
        let options = WorkerOptions::default();
        assert!(options.validate().is_err());

        let options = WorkerOptions {
            mq_endpoint: "amqp://localhost:5672".to_string(),
            ..WorkerOptions::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_partial_keys() {
        let options: WorkerOptions = serde_yaml::from_str(
            "mq_endpoint: amqp://mq.internal:5672\nthread_count: 4\nsleep_seconds: 2\n",
        )
        .unwrap();

        assert_eq!(options.thread_count, 4);
        assert_eq!(options.sleep_seconds, 2);
        assert_eq!(options.queue_poll_wait_seconds, 15);
        assert!(options.wait);
    }

    #[test]
    fn test_yaml_rejects_unknown_keys() {
        let parsed: std::result::Result<WorkerOptions, _> =
            serde_yaml::from_str("mq_endpoint: x\nthread_cuont: 4\n");
        assert!(parsed.is_err());
    }
}
