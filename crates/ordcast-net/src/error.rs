//! Error types for the network layer.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use ordcast_core::CoreError;

/// Errors that can occur while bootstrapping or running peer links.
#[derive(Debug, Error)]
pub enum NetError {
    /// Roster file could not be read.
    #[error("cannot read roster {path}: {source}")]
    RosterRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A roster line is malformed.
    #[error("roster line {line}: {reason}")]
    RosterParse { line: usize, reason: String },

    /// The local address is missing from the roster.
    #[error("local address {0} is not listed in the roster")]
    NotInRoster(SocketAddr),

    /// Could not listen on the local address.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// All connection attempts to a lower-ranked peer failed.
    #[error("could not connect to {addr} after {attempts} attempts")]
    ConnectExhausted { addr: SocketAddr, attempts: u32 },

    /// Transport-level error on an established stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// The link's worker has gone away.
    #[error("link closed")]
    LinkClosed,
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, NetError>;
