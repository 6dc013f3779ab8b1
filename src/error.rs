//! Crate-wide error type for engine plumbing.
//!
//! This is distinct from [`crate::platform::PlatformError`], which models
//! the recoverable/fatal taxonomy of a single send attempt against the
//! platform client. `EngineError` covers everything else: durable-store
//! failures, a closed dispatch channel, and bad configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("durable store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("dispatch queue closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
