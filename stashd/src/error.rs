//! Daemon error types.

use stash_connectors::ProtocolError;
use stash_domain::DomainError;
use stash_engine::EngineError;
use stash_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Bot link failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error, including listeners that fail to bind
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
