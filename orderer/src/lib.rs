//! Transaction ordering service
//!
//! Accepts signed transaction payloads over the `orderer.AtomicBroadcastAPI`
//! Broadcast stream, orders them, and streams the ordered transaction ids to
//! Deliver subscribers.
//!
//! # Architecture
//!
//! - **Single Writer**: one sequencer task owns all ordering state
//! - **Merkle Batches**: every batch is committed to its own tree; each
//!   ordered transaction carries an inclusion witness against the batch root
//! - **Stream Tasks**: one task per gRPC stream, bounded channels in between
//!
//! # Invariants
//!
//! - Sequence numbers are dense and follow submission order
//! - A transaction id is the tagged leaf digest `0x00 ‖ H(payload)`
//! - Deliver subscribers see transactions in sequence order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod deliver;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pb;
pub mod sequencer;
pub mod service;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use sequencer::{spawn_sequencer, OrderedTransaction, SequencerConfig, SequencerHandle};
pub use service::AtomicBroadcastService;
