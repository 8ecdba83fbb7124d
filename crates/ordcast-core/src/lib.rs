//! # ordcast Core
//!
//! Pure primitives for ordcast: Lamport timestamps, the logical clock, and the
//! message envelope exchanged between processes.
//!
//! This crate contains no I/O, no networking, no tasks. It is plain data and
//! arithmetic that the ordering engine builds on.
//!
//! ## Key Types
//!
//! - [`ProcessId`] - Identity of a process in the cluster (`-1` is the sentinel)
//! - [`Timestamp`] - A pid-suffixed scalar logical time, unique per process
//! - [`LogicalClock`] - The Lamport clock that produces timestamps
//! - [`Message`] - The typed envelope: update, ack, exit, poke
//!
//! ## Wire Format
//!
//! Messages travel as CBOR-encoded [`WireMessage`] bodies. See the [`codec`] module.

pub mod clock;
pub mod codec;
pub mod error;
pub mod message;
pub mod types;

pub use clock::{LogicalClock, Timestamp};
pub use codec::{decode_message, encode_message};
pub use error::{CoreError, Result};
pub use message::{Message, MessageKind, Payload, WireMessage};
pub use types::ProcessId;
