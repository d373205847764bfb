//! Error types for tree construction and proof generation

use thiserror::Error;

/// Result type for Merkle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Merkle errors
///
/// Witness verification never produces one of these; it answers `false`.
#[derive(Error, Debug)]
pub enum Error {
    /// An accumulator rejected input. The underlying error is passed through unchanged.
    #[error(transparent)]
    HashWriteFailed(#[from] std::io::Error),

    /// An interior level had an odd node count
    #[error("number of nodes is not even: {nodes} nodes at level {level}")]
    StructuralViolation {
        /// Level above the leaves (0 = leaves)
        level: usize,
        /// Node count found at that level
        nodes: usize,
    },

    /// Proof requested for a digest that is not a leaf of the tree
    #[error("hash not found in tree")]
    LeafNotFound,

    /// Proof requested for a position past the last leaf
    #[error("leaf index {index} out of range ({leaf_count} leaves)")]
    LeafIndexOutOfRange {
        /// Requested position
        index: usize,
        /// Padded leaf count of the tree
        leaf_count: usize,
    },

    /// Tree construction was given no leaves
    #[error("empty leaf hashes")]
    EmptyLeaves,

    /// Hash algorithm name not recognised
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
}
