//! Error types for the ordering engine.

use ordcast_net::NetError;
use thiserror::Error;

/// Errors that can stop the engine.
///
/// Only bootstrap-time conditions end up here. Anything that goes wrong once
/// the engine is running is logged and absorbed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network bootstrap failed.
    #[error("network error: {0}")]
    Net(#[from] NetError),

    /// A link terminated before reporting readiness.
    #[error("link {link} closed before it became ready")]
    LinkFailed { link: String },

    /// The engine side of the application queues is gone.
    #[error("engine is no longer accepting messages")]
    AppDisconnected,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
