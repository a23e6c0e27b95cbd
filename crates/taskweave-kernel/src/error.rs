//! Kernel error types.

use std::io;

use taskweave_dag::RejectReason;
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Kernel error type.
///
/// Protocol rejections of remote or stored nodes are not errors; they land in
/// the replay report. `Rejected` is only returned when a node this kernel is
/// asked to originate or push would itself be refused.
#[derive(Debug, Error)]
pub enum KernelError {
    /// SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Node JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("content addressing failed: {0}")]
    Cas(#[from] taskweave_cas::CasError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Replication transport failure.
    #[error("replication error: {0}")]
    Replication(String),

    /// A node produced or forwarded locally failed validation.
    #[error("node rejected: {0}")]
    Rejected(RejectReason),

    /// The entity a new node should extend does not exist.
    #[error("unknown task: {0}")]
    UnknownTask(String),
}

impl KernelError {
    pub fn replication(msg: impl Into<String>) -> Self {
        Self::Replication(msg.into())
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
