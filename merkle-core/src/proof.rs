//! Inclusion witnesses

use crate::hasher::HashStrategy;
use serde::{Deserialize, Serialize};

/// Proof that a leaf digest is committed to by a root
///
/// `path` holds the sibling digest at each level, leaf level first. Bit `k`
/// of `leaf_index` says whether the running digest is the right (`1`) or left
/// (`0`) child at level `k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Tagged root digest
    pub root: Vec<u8>,
    /// Tagged digest of the proven leaf
    pub leaf: Vec<u8>,
    /// Sibling digests, bottom-up
    pub path: Vec<Vec<u8>>,
    /// Position of the leaf in the padded batch
    pub leaf_index: u64,
    /// Padded leaf count of the tree
    pub leaf_count: u64,
}

impl Witness {
    /// Check the witness against its own root
    ///
    /// Total: malformed witnesses and hashing failures answer `false`.
    pub fn verify(&self, strategy: &HashStrategy) -> bool {
        if !self.well_formed() {
            return false;
        }

        let mut acc = self.leaf.clone();
        let mut index = self.leaf_index;

        for sibling in &self.path {
            let combined = if index & 1 == 0 {
                strategy.interior_hash(&acc, sibling)
            } else {
                strategy.interior_hash(sibling, &acc)
            };
            acc = match combined {
                Ok(digest) => digest,
                Err(_) => return false,
            };
            index >>= 1;
        }

        acc == self.root
    }

    /// Check that `payload` is the proven leaf and that the witness verifies
    pub fn verify_payload(&self, payload: &[u8], strategy: &HashStrategy) -> bool {
        match strategy.leaf_hash(payload) {
            Ok(leaf) => leaf == self.leaf && self.verify(strategy),
            Err(_) => false,
        }
    }

    fn well_formed(&self) -> bool {
        !self.root.is_empty()
            && self.leaf_count.is_power_of_two()
            && self.leaf_index < self.leaf_count
            && self.path.len() == self.leaf_count.trailing_zeros() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MerkleTree;

    fn payloads(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("tx-{}", i)).collect()
    }

    #[test]
    fn test_every_real_leaf_verifies() {
        let strategy = HashStrategy::sha256();
        for n in 1..=9 {
            let batch = payloads(n);
            let tree = MerkleTree::new(&batch).unwrap();
            for (i, payload) in batch.iter().enumerate() {
                let witness = tree.prove_index(i).unwrap();
                assert!(witness.verify(&strategy), "n={} i={}", n, i);
                assert!(witness.verify_payload(payload.as_bytes(), &strategy));
            }
        }
    }

    #[test]
    fn test_padding_leaf_verifies() {
        let strategy = HashStrategy::sha256();
        let tree = MerkleTree::new(["inputA", "inputB", "inputC"]).unwrap();

        let witness = tree.prove_index(3).unwrap();
        assert!(witness.verify(&strategy));
        assert!(witness.verify_payload(b"", &strategy));
    }

    #[test]
    fn test_single_leaf_witness() {
        let strategy = HashStrategy::sha256();
        let tree = MerkleTree::new(["only"]).unwrap();

        let witness = tree.prove_index(0).unwrap();
        assert!(witness.path.is_empty());
        assert_eq!(witness.root, witness.leaf);
        assert!(witness.verify(&strategy));
    }

    #[test]
    fn test_tampered_witness_rejected() {
        let strategy = HashStrategy::sha256();
        let tree = MerkleTree::new(payloads(6)).unwrap();
        let witness = tree.prove_index(4).unwrap();
        assert!(witness.verify(&strategy));

        let mut bad = witness.clone();
        bad.root[5] ^= 0x01;
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.leaf[5] ^= 0x01;
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.path[1][5] ^= 0x01;
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.leaf_index = 5;
        assert!(!bad.verify(&strategy));

        assert!(!witness.verify_payload(b"tx-3", &strategy));
    }

    #[test]
    fn test_wrong_strategy_rejected() {
        let tree = MerkleTree::new(payloads(4)).unwrap();
        let witness = tree.prove_index(1).unwrap();

        assert!(!witness.verify(&HashStrategy::sha1()));
        assert!(!witness.verify(&HashStrategy::md5()));
    }

    #[test]
    fn test_malformed_witness_rejected() {
        let strategy = HashStrategy::sha256();
        let tree = MerkleTree::new(payloads(4)).unwrap();
        let witness = tree.prove_index(2).unwrap();

        let mut bad = witness.clone();
        bad.root.clear();
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.leaf_count = 3;
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.leaf_count = 0;
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.leaf_index = 4;
        assert!(!bad.verify(&strategy));

        let mut bad = witness.clone();
        bad.path.pop();
        assert!(!bad.verify(&strategy));

        let mut bad = witness;
        bad.path.push(vec![0u8; 33]);
        assert!(!bad.verify(&strategy));
    }

    #[test]
    fn test_serde_roundtrip() {
        let tree = MerkleTree::new(payloads(3)).unwrap();
        let witness = tree.prove_index(0).unwrap();

        let json = serde_json::to_string(&witness).unwrap();
        let decoded: Witness = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, witness);
    }
}
