use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Hash32;

fn hash_leaf(leaf: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(leaf);
    hasher.finalize().into()
}

fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Merkle inclusion proof. Proof payloads travel through the protocol as
/// opaque bytes; the shipped verifier capabilities deserialize them into
/// this form and check membership against a claimed root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf in the tree
    pub index: usize,

    /// Original leaf bytes
    pub leaf: Vec<u8>,

    /// Sibling hashes from leaf to root.
    /// Each tuple is (sibling_hash, is_left) where is_left indicates the
    /// current node sits on the left of the pair.
    pub siblings: Vec<(Hash32, bool)>,

    /// Expected root hash
    pub root: Hash32,
}

impl MerkleProof {
    /// Recompute the root from the leaf and siblings and compare.
    pub fn verify(&self) -> bool {
        let mut current = hash_leaf(&self.leaf);
        for (sibling, is_left) in &self.siblings {
            current = if *is_left {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
        }
        current == self.root
    }
}

/// SHA-256 Merkle tree over raw byte leaves. Odd nodes at a level are
/// paired with themselves.
pub struct MerkleTree {
    levels: Vec<Vec<Hash32>>,
    leaves: Vec<Vec<u8>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Vec<u8>]) -> Self {
        if leaves.is_empty() {
            return MerkleTree {
                levels: vec![vec![[0u8; 32]]],
                leaves: vec![],
            };
        }

        let level: Vec<Hash32> = leaves.iter().map(|leaf| hash_leaf(leaf)).collect();
        let mut levels = vec![level];
        loop {
            let prev = &levels[levels.len() - 1];
            if prev.len() <= 1 {
                break;
            }
            let mut next = Vec::with_capacity((prev.len() + 1) / 2);
            for pair in prev.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                next.push(hash_pair(&left, &right));
            }
            levels.push(next);
        }

        MerkleTree {
            levels,
            leaves: leaves.to_vec(),
        }
    }

    pub fn root(&self) -> Hash32 {
        match self.levels.last() {
            Some(level) if !level.is_empty() => level[0],
            _ => [0u8; 32],
        }
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn generate_proof(&self, index: usize) -> Result<MerkleProof> {
        if index >= self.leaves.len() {
            bail!(
                "leaf index {} out of bounds (tree has {} leaves)",
                index,
                self.leaves.len()
            );
        }

        let mut siblings = Vec::new();
        let mut idx = index;
        for level in &self.levels {
            if level.len() == 1 {
                break;
            }
            let sibling_index = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = if sibling_index < level.len() {
                level[sibling_index]
            } else {
                level[idx]
            };
            siblings.push((sibling, idx % 2 == 0));
            idx /= 2;
        }

        Ok(MerkleProof {
            index,
            leaf: self.leaves[index].clone(),
            siblings,
            root: self.root(),
        })
    }
}
