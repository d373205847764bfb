//! Merkle tree construction
//!
//! Builds a perfectly balanced binary tree over an ordered batch of payloads.
//!
//! # Design
//!
//! - Leaf count padded to a power of two with empty payloads
//! - Leaf digests `0x00 ‖ H(payload)`, interior digests `0x01 ‖ H(left ‖ right)`
//! - Nodes stored level by level in one arena: leaves occupy `[0, n)`, the
//!   next level `[n, n + n/2)`, and so on up to the root
//! - Immutable after construction; safe to share between readers

use crate::{hasher::HashStrategy, proof::Witness, Error, Result};
use std::fmt;

/// Merkle tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    hash: Vec<u8>,
    left: Option<usize>,
    right: Option<usize>,
}

impl Node {
    fn leaf(hash: Vec<u8>) -> Self {
        Self {
            hash,
            left: None,
            right: None,
        }
    }

    /// Tagged digest of this node
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// Arena index of the left child
    pub fn left(&self) -> Option<usize> {
        self.left
    }

    /// Arena index of the right child
    pub fn right(&self) -> Option<usize> {
        self.right
    }

    /// Check if node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Binary Merkle tree over an ordered batch of payloads
#[derive(Debug, Clone)]
pub struct MerkleTree {
    nodes: Vec<Node>,
    leaf_count: usize,
    root: Option<usize>,
    strategy: HashStrategy,
}

impl MerkleTree {
    /// Build a tree with the default SHA-256 strategy
    pub fn new<I, T>(leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self::with_strategy(leaves, HashStrategy::default())
    }

    /// Build a tree with a caller-supplied hash strategy
    ///
    /// Fails with [`Error::EmptyLeaves`] when no payloads are given; use
    /// [`MerkleTree::empty`] to obtain the distinguished empty tree.
    pub fn with_strategy<I, T>(leaves: I, strategy: HashStrategy) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut nodes = Vec::new();
        for payload in leaves {
            nodes.push(Node::leaf(strategy.leaf_hash(payload.as_ref())?));
        }

        if nodes.is_empty() {
            return Err(Error::EmptyLeaves);
        }

        let supplied = nodes.len();
        let leaf_count = supplied.next_power_of_two();
        for _ in supplied..leaf_count {
            nodes.push(Node::leaf(strategy.leaf_hash(&[])?));
        }
        nodes.reserve(leaf_count.saturating_sub(1));

        let root = Self::build_interior(&mut nodes, leaf_count, &strategy)?;

        tracing::trace!(
            supplied,
            leaf_count,
            hash = strategy.name(),
            "Built merkle tree"
        );

        Ok(Self {
            nodes,
            leaf_count,
            root: Some(root),
            strategy,
        })
    }

    /// Tree with no leaves and no root
    ///
    /// Its [`root`](Self::root) is the untagged digest of the empty byte string.
    pub fn empty(strategy: HashStrategy) -> Self {
        Self {
            nodes: Vec::new(),
            leaf_count: 0,
            root: None,
            strategy,
        }
    }

    /// Pair nodes level by level until one remains; returns the root index
    fn build_interior(
        nodes: &mut Vec<Node>,
        leaf_count: usize,
        strategy: &HashStrategy,
    ) -> Result<usize> {
        let mut start = 0;
        let mut width = leaf_count;
        let mut level = 0;

        while width > 1 {
            if width % 2 != 0 {
                return Err(Error::StructuralViolation {
                    level,
                    nodes: width,
                });
            }

            let next = nodes.len();
            for left in (start..start + width).step_by(2) {
                let right = left + 1;
                let hash = strategy.interior_hash(&nodes[left].hash, &nodes[right].hash)?;
                nodes.push(Node {
                    hash,
                    left: Some(left),
                    right: Some(right),
                });
            }

            start = next;
            width /= 2;
            level += 1;
        }

        Ok(start)
    }

    /// Root digest
    ///
    /// Tagged root digest for a built tree, untagged `H("")` for the empty tree.
    pub fn root(&self) -> Result<Vec<u8>> {
        match self.root {
            Some(index) => Ok(self.nodes[index].hash.clone()),
            None => self.strategy.hash(&[]),
        }
    }

    /// Root node, if any
    pub fn root_node(&self) -> Option<&Node> {
        self.root.map(|index| &self.nodes[index])
    }

    /// Leaf nodes in insertion order, padding included
    pub fn leaves(&self) -> &[Node] {
        &self.nodes[..self.leaf_count]
    }

    /// Node by arena index
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Number of leaves after padding
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Distance from any leaf to the root
    pub fn depth(&self) -> usize {
        if self.leaf_count == 0 {
            return 0;
        }
        self.leaf_count.trailing_zeros() as usize
    }

    /// Hash strategy the tree was built with
    pub fn strategy(&self) -> &HashStrategy {
        &self.strategy
    }

    /// Inclusion witness for the leaf whose tagged digest equals `leaf_hash`
    ///
    /// When several leaves share the digest (repeated payloads, padding) the
    /// last one is proven. Use [`MerkleTree::prove_index`] to pick a position.
    pub fn prove(&self, leaf_hash: &[u8]) -> Result<Witness> {
        let index = self
            .leaves()
            .iter()
            .rposition(|leaf| leaf.hash == leaf_hash)
            .ok_or(Error::LeafNotFound)?;

        self.prove_index(index)
    }

    /// Inclusion witness for the leaf at `index`
    pub fn prove_index(&self, index: usize) -> Result<Witness> {
        if index >= self.leaf_count {
            return Err(Error::LeafIndexOutOfRange {
                index,
                leaf_count: self.leaf_count,
            });
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut position = index;
        let mut start = 0;
        let mut width = self.leaf_count;

        while width > 1 {
            path.push(self.nodes[start + (position ^ 1)].hash.clone());
            start += width;
            width /= 2;
            position >>= 1;
        }

        Ok(Witness {
            root: self.root()?,
            leaf: self.nodes[index].hash.clone(),
            path,
            leaf_index: index as u64,
            leaf_count: self.leaf_count as u64,
        })
    }

    /// Recompute every interior digest from its children
    pub fn verify_integrity(&self) -> Result<bool> {
        for node in &self.nodes {
            match (node.left, node.right) {
                (Some(left), Some(right)) => {
                    let computed = self
                        .strategy
                        .interior_hash(&self.nodes[left].hash, &self.nodes[right].hash)?;
                    if computed != node.hash {
                        return Ok(false);
                    }
                }
                (None, None) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Write a pre-order rendering of the tree
    ///
    /// ```text
    /// root: 01f068c7...
    ///  ├─ node: 014b2aab...
    ///  │   ├─ leaf: 003df262...
    ///  │   └─ leaf: 00b7686a...
    ///  └─ node: 01c74baf...
    ///      ├─ leaf: 000ec29b...
    ///      └─ leaf: 00e3b0c4...
    /// ```
    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        let root = match self.root {
            Some(index) => index,
            None => {
                let digest = self.root().map_err(|_| fmt::Error)?;
                return writeln!(w, "empty: {}", hex::encode(digest));
            }
        };

        writeln!(w, "root: {}", hex::encode(&self.nodes[root].hash))?;
        if let (Some(left), Some(right)) = (self.nodes[root].left, self.nodes[root].right) {
            self.dump_node(w, left, "", false)?;
            self.dump_node(w, right, "", true)?;
        }
        Ok(())
    }

    fn dump_node<W: fmt::Write>(
        &self,
        w: &mut W,
        index: usize,
        prefix: &str,
        last: bool,
    ) -> fmt::Result {
        let node = &self.nodes[index];
        let (branch, indent) = if last { (" └─", "    ") } else { (" ├─", " │  ") };
        let kind = if node.is_leaf() { "leaf" } else { "node" };

        writeln!(w, "{}{} {}: {}", prefix, branch, kind, hex::encode(&node.hash))?;

        if let (Some(left), Some(right)) = (node.left, node.right) {
            let child_prefix = format!("{}{}", prefix, indent);
            self.dump_node(w, left, &child_prefix, false)?;
            self.dump_node(w, right, &child_prefix, true)?;
        }
        Ok(())
    }
}

/// `{}` prints the hex root, `{:#}` dumps the whole tree
impl fmt::Display for MerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return self.dump(f);
        }
        let root = self.root().map_err(|_| fmt::Error)?;
        write!(f, "{}", hex::encode(root))
    }
}
