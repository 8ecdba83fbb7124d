//! # ordcast
//!
//! Total-order multicast for a fixed cluster of peers.
//!
//! Every process stamps its updates with a Lamport clock, multicasts them to
//! all peers and acknowledges every update it receives. An update is handed to
//! the application only once all peers that must acknowledge it have done so,
//! and always in timestamp order. Since timestamps are unique across the
//! cluster, every process delivers the same sequence. There is no sequencer.
//!
//! ## Example
//!
//! ```no_run
//! use ordcast::{EngineConfig, OrderingEngine};
//! use ordcast_core::{Payload, ProcessId};
//! use ordcast_net::BootstrapConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bootstrap = BootstrapConfig::new("info.txt", "10.0.0.1:9746".parse()?);
//! let config = EngineConfig::new(ProcessId::new(0), 1);
//!
//! let (engine, mut app) = OrderingEngine::bootstrap(config, &bootstrap).await?;
//! let engine = engine.spawn();
//!
//! app.wait_ready().await?;
//! app.submit(Payload::new(vec![10, -10]))?;
//! app.finish();
//!
//! while let Some(message) = app.recv().await {
//!     if app.is_exit(&message) {
//!         break;
//!     }
//!     println!("delivered {}", message.timestamp());
//! }
//! let _report = engine.await??;
//! # Ok(())
//! # }
//! ```
//!
//! ## Termination
//!
//! Calling [`AppHandle::finish`] starts a cooperative exit negotiation. See
//! [`termination`] for the protocol.

pub mod app;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod ordering;
pub mod termination;

pub use app::AppHandle;
pub use config::EngineConfig;
pub use delivery::{readiness, DeliveryQueue, PendingAcks, Readiness};
pub use engine::OrderingEngine;
pub use error::{EngineError, Result};
pub use ordering::{OrderingCore, RunReport};
pub use termination::{ExitProtocol, ExitState};
