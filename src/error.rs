//! Error types for jobherd
//!
//! This module defines the error hierarchy for the engine:
//! - Configuration and CLI errors
//! - Worker channel errors (send/receive on a slot)
//! - Worker lifecycle errors (spawn, join)
//! - Write sink errors (SQLite and friends)
//!
//! Item-level processing failures are not errors: they are part of the
//! protocol (`collectionFailure`) and are retried by the coordinator.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for jobherd
#[derive(Error, Debug)]
pub enum HerdError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel errors talking to a worker
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Worker lifecycle errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Write sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O errors (pipes, files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A coordinator is already live in this process
    #[error("A coordinator is already running in this process")]
    AlreadyRunning,

    /// The writer slot went away; outcomes can no longer be recorded
    #[error("Writer slot {slot} is unreachable: {reason}")]
    WriterLost { slot: usize, reason: String },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid cluster size
    #[error("Invalid cluster size {count}: must be between {min} and {max}")]
    InvalidClusterSize { count: usize, min: usize, max: usize },

    /// Partition divisor of zero
    #[error("Partition divisor must be at least 1")]
    ZeroPartitionDivisor,

    /// Success rate outside [0, 1]
    #[error("Invalid success rate {rate}: must be within 0.0..=1.0")]
    InvalidSuccessRate { rate: f64 },

    /// Halt budget of zero
    #[error("Halt budget must be greater than zero")]
    ZeroHaltBudget,

    /// Retry cap of zero
    #[error("Retry limit must be at least 1 when set")]
    ZeroRetryLimit,

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Worker subcommand received an unknown role
    #[error("Unknown worker role '{0}'")]
    UnknownRole(String),
}

/// Errors on a single worker channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The worker's end of the channel is gone
    #[error("Worker {slot} disconnected")]
    Disconnected { slot: usize },

    /// Writing to the worker failed
    #[error("Failed to send to worker {slot}: {reason}")]
    SendFailed { slot: usize, reason: String },

    /// The coordinator's inbound channel is gone
    #[error("Coordinator channel closed")]
    CoordinatorGone,
}

/// Worker lifecycle errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker could not be started
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker did not stop in time
    #[error("Worker {id} did not exit within {timeout_ms}ms")]
    StopTimeout { id: usize, timeout_ms: u64 },
}

/// Write sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to create the output database
    #[error("Failed to create database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },
}

/// Result type alias for HerdError
pub type Result<T> = std::result::Result<T, HerdError>;

/// Result type alias for SinkError
pub type SinkResult<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = ChannelError::Disconnected { slot: 3 };
        let herd: HerdError = err.into();
        assert!(matches!(herd, HerdError::Channel(_)));
        assert!(herd.to_string().contains("Worker 3 disconnected"));
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::InvalidClusterSize {
            count: 1,
            min: 2,
            max: 512,
        };
        assert_eq!(
            err.to_string(),
            "Invalid cluster size 1: must be between 2 and 512"
        );
    }
}
