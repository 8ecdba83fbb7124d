//! # ordcast Net
//!
//! Everything between the ordering engine and the wire.
//!
//! ## Overview
//!
//! - [`Roster`] parses the fixed peer list and derives ranks
//! - [`bootstrap`] joins every pair of processes with exactly one TCP stream
//! - [`Transport`] frames messages onto a reliable ordered byte stream
//! - [`PeerLink`] runs one worker per connection, bridging queues to the stream
//!
//! ## Connection Topology
//!
//! ```text
//! rank 0          rank 1          rank 2
//!   |<-- connect ---|               |
//!   |<------------- connect --------|
//!                   |<-- connect ---|
//! ```
//!
//! Lower ranks accept, higher ranks connect. Each process ends up with one
//! [`PeerLink`] per peer.

pub mod bootstrap;
pub mod error;
pub mod peer_link;
pub mod roster;
pub mod transport;

pub use bootstrap::{connect_with_retry, establish, establish_with_roster, BootstrapConfig, Cluster};
pub use error::{NetError, Result};
pub use peer_link::{LinkStats, PeerLink};
pub use roster::Roster;
pub use transport::{
    memory, FrameReader, FrameWriter, FramedTransport, MessageSink, MessageSource, Transport,
    DEFAULT_MAX_FRAME_LEN,
};
