//! Merkle integrity core for the ordering service
//!
//! Binds an ordered batch of opaque payloads into a single root digest and
//! produces inclusion witnesses for individual leaves.
//!
//! # Design
//!
//! - **Domain separation**: leaf digests are `0x00 ‖ H(payload)`, interior
//!   digests are `0x01 ‖ H(left ‖ right)`; the tag byte is stored and hashed
//! - **Padding**: leaf counts are rounded up to a power of two with empty payloads
//! - **Immutable arena**: nodes live in one `Vec`, children are indices
//! - **Pluggable hash**: every tree carries a [`HashStrategy`] (SHA-256 by default)
//!
//! # Example
//!
//! ```
//! use merkle_core::{HashStrategy, MerkleTree};
//!
//! let tree = MerkleTree::new(["inputA", "inputB", "inputC"])?;
//! let leaf = tree.leaves()[2].hash().to_vec();
//!
//! let witness = tree.prove(&leaf)?;
//! assert!(witness.verify(&HashStrategy::sha256()));
//! assert_eq!(witness.root, tree.root()?);
//! # Ok::<(), merkle_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod hasher;
pub mod proof;
pub mod tree;

// Re-exports
pub use error::{Error, Result};
pub use hasher::{Accumulator, HashStrategy, INTERIOR_PREFIX, LEAF_PREFIX};
pub use proof::Witness;
pub use tree::{MerkleTree, Node};
