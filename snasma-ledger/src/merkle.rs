//! Fixed-depth sparse Merkle tree over Poseidon.
//!
//! Leaves are filled left to right by [`MerkleTree::append`] and rewritten in
//! place by [`MerkleTree::update`]. Untouched subtrees hash to a precomputed
//! "empty" value per level, so only nodes on paths to appended leaves are
//! stored.

use std::collections::HashMap;

use ff::Field;
use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use snasma_common::{hash_pair, serde_fr_vec};
use thiserror::Error;
use tracing::debug;

pub const MAX_TREE_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree of depth {depth} is full ({capacity} leaves)")]
    Full { depth: usize, capacity: u64 },

    #[error("leaf {index} has not been appended (tree holds {len})")]
    LeafNotFound { index: u32, len: u64 },

    #[error("tree depth {0} is outside 1..=32")]
    InvalidDepth(usize),
}

/// Membership proof for one leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Leaf position; bit `i` selects whether the node at level `i` is a
    /// right child.
    pub index: u32,
    /// Sibling hashes from the leaf level upward.
    #[serde(with = "serde_fr_vec")]
    pub siblings: Vec<Fr>,
}

impl MerklePath {
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Fold `leaf` up the path.
    pub fn compute_root(&self, leaf: Fr) -> Fr {
        let mut node = leaf;
        let mut position = u64::from(self.index);
        for sibling in &self.siblings {
            node = if position & 1 == 0 {
                hash_pair(&node, sibling)
            } else {
                hash_pair(sibling, &node)
            };
            position >>= 1;
        }
        node
    }

    pub fn verify(&self, leaf: Fr, root: Fr) -> bool {
        // Index bits above the depth would alias another leaf.
        if self.depth() < MAX_TREE_DEPTH && u64::from(self.index) >> self.depth() != 0 {
            return false;
        }
        self.compute_root(leaf) == root
    }
}

/// Rewrite two leaves of one tree using only their current paths.
///
/// `first` and `second` must open the same root. Returns the root with the
/// two leaves replaced and the paths of both leaves under it. Every sibling
/// not covering the other leaf is carried over unchanged. When both paths
/// open the same index, `second_leaf` wins.
pub fn update_pair(
    first: &MerklePath,
    first_leaf: Fr,
    second: &MerklePath,
    second_leaf: Fr,
) -> (Fr, MerklePath, MerklePath) {
    let mut a = u64::from(first.index);
    let mut b = u64::from(second.index);
    let mut node_a = if a == b { second_leaf } else { first_leaf };
    let mut node_b = second_leaf;
    let mut siblings_a = Vec::with_capacity(first.depth());
    let mut siblings_b = Vec::with_capacity(second.depth());

    for (old_a, old_b) in first.siblings.iter().zip(&second.siblings) {
        let sibling_a = if b == a ^ 1 { node_b } else { *old_a };
        let sibling_b = if a == b ^ 1 { node_a } else { *old_b };
        siblings_a.push(sibling_a);
        siblings_b.push(sibling_b);
        node_a = if a & 1 == 0 {
            hash_pair(&node_a, &sibling_a)
        } else {
            hash_pair(&sibling_a, &node_a)
        };
        node_b = if b & 1 == 0 {
            hash_pair(&node_b, &sibling_b)
        } else {
            hash_pair(&sibling_b, &node_b)
        };
        a >>= 1;
        b >>= 1;
    }

    (
        node_a,
        MerklePath {
            index: first.index,
            siblings: siblings_a,
        },
        MerklePath {
            index: second.index,
            siblings: siblings_b,
        },
    )
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    depth: usize,
    len: u64,
    revision: u64,
    /// `levels[0]` holds leaves, `levels[depth]` the root. Missing entries
    /// are empty subtrees.
    levels: Vec<HashMap<u64, Fr>>,
    /// `empty[i]` is the root of an empty subtree of height `i`.
    empty: Vec<Fr>,
}

impl MerkleTree {
    pub fn new(depth: usize) -> Result<Self, TreeError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(TreeError::InvalidDepth(depth));
        }
        let mut empty = Vec::with_capacity(depth + 1);
        empty.push(Fr::ZERO);
        for level in 0..depth {
            let below = empty[level];
            empty.push(hash_pair(&below, &below));
        }
        Ok(Self {
            depth,
            len: 0,
            revision: 0,
            levels: vec![HashMap::new(); depth + 1],
            empty,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Number of appended leaves.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Count of appends plus updates since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn root(&self) -> Fr {
        self.node(self.depth, 0)
    }

    pub fn leaf(&self, index: u32) -> Option<Fr> {
        if u64::from(index) < self.len {
            Some(self.node(0, u64::from(index)))
        } else {
            None
        }
    }

    /// Place `leaf` at the next free position and return that position.
    pub fn append(&mut self, leaf: Fr) -> Result<u32, TreeError> {
        if self.len >= self.capacity() {
            return Err(TreeError::Full {
                depth: self.depth,
                capacity: self.capacity(),
            });
        }
        let index = self.len as u32;
        self.len += 1;
        self.write(u64::from(index), leaf);
        debug!(index, depth = self.depth, "merkle leaf appended");
        Ok(index)
    }

    /// Overwrite an appended leaf.
    pub fn update(&mut self, index: u32, leaf: Fr) -> Result<(), TreeError> {
        if u64::from(index) >= self.len {
            return Err(TreeError::LeafNotFound {
                index,
                len: self.len,
            });
        }
        self.write(u64::from(index), leaf);
        debug!(index, revision = self.revision, "merkle leaf updated");
        Ok(())
    }

    pub fn proof(&self, index: u32) -> Result<MerklePath, TreeError> {
        if u64::from(index) >= self.len {
            return Err(TreeError::LeafNotFound {
                index,
                len: self.len,
            });
        }
        let mut position = u64::from(index);
        let siblings = (0..self.depth)
            .map(|level| {
                let sibling = self.node(level, position ^ 1);
                position >>= 1;
                sibling
            })
            .collect();
        Ok(MerklePath { index, siblings })
    }

    fn node(&self, level: usize, position: u64) -> Fr {
        self.levels[level]
            .get(&position)
            .copied()
            .unwrap_or(self.empty[level])
    }

    fn write(&mut self, position: u64, leaf: Fr) {
        let mut position = position;
        let mut node = leaf;
        self.levels[0].insert(position, node);
        for level in 0..self.depth {
            let sibling = self.node(level, position ^ 1);
            node = if position & 1 == 0 {
                hash_pair(&node, &sibling)
            } else {
                hash_pair(&sibling, &node)
            };
            position >>= 1;
            self.levels[level + 1].insert(position, node);
        }
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u64) -> Fr {
        Fr::from(n + 100)
    }

    #[test]
    fn empty_root_matches_ladder() {
        let tree = MerkleTree::new(3).unwrap();
        let l1 = hash_pair(&Fr::ZERO, &Fr::ZERO);
        let l2 = hash_pair(&l1, &l1);
        assert_eq!(tree.root(), hash_pair(&l2, &l2));
        assert!(tree.is_empty());
    }

    #[test]
    fn root_matches_dense_computation() {
        let mut tree = MerkleTree::new(2).unwrap();
        for n in 0..3 {
            tree.append(leaf(n)).unwrap();
        }
        let left = hash_pair(&leaf(0), &leaf(1));
        let right = hash_pair(&leaf(2), &Fr::ZERO);
        assert_eq!(tree.root(), hash_pair(&left, &right));
    }

    #[test]
    fn proofs_verify_for_every_leaf() {
        let mut tree = MerkleTree::new(4).unwrap();
        for n in 0..11 {
            tree.append(leaf(n)).unwrap();
        }
        let root = tree.root();
        for n in 0..11u32 {
            let path = tree.proof(n).unwrap();
            assert_eq!(path.depth(), 4);
            assert!(path.verify(leaf(n as u64), root));
            assert!(!path.verify(leaf(n as u64 + 1), root));
        }
    }

    #[test]
    fn update_changes_root_and_old_proofs() {
        let mut tree = MerkleTree::new(3).unwrap();
        tree.append(leaf(0)).unwrap();
        tree.append(leaf(1)).unwrap();
        let before = tree.root();
        let old_path = tree.proof(0).unwrap();

        tree.update(1, leaf(9)).unwrap();
        assert_ne!(tree.root(), before);
        assert!(!old_path.verify(leaf(0), tree.root()));
        assert!(tree.proof(0).unwrap().verify(leaf(0), tree.root()));
        assert_eq!(tree.leaf(1), Some(leaf(9)));
        assert_eq!(tree.revision(), 3);
    }

    #[test]
    fn full_tree_rejects_append() {
        let mut tree = MerkleTree::new(1).unwrap();
        tree.append(leaf(0)).unwrap();
        tree.append(leaf(1)).unwrap();
        assert_eq!(
            tree.append(leaf(2)),
            Err(TreeError::Full {
                depth: 1,
                capacity: 2
            })
        );
        assert_eq!(tree.revision(), 2);
    }

    #[test]
    fn unknown_leaves_are_rejected() {
        let mut tree = MerkleTree::new(3).unwrap();
        tree.append(leaf(0)).unwrap();
        assert_eq!(
            tree.update(1, leaf(1)),
            Err(TreeError::LeafNotFound { index: 1, len: 1 })
        );
        assert!(tree.proof(5).is_err());
        assert_eq!(tree.leaf(1), None);
    }

    #[test]
    fn depth_bounds() {
        assert_eq!(MerkleTree::new(0).unwrap_err(), TreeError::InvalidDepth(0));
        assert_eq!(MerkleTree::new(33).unwrap_err(), TreeError::InvalidDepth(33));
        assert_eq!(MerkleTree::new(32).unwrap().capacity(), 1 << 32);
    }

    #[test]
    fn path_with_out_of_range_index_is_rejected() {
        let mut tree = MerkleTree::new(2).unwrap();
        tree.append(leaf(0)).unwrap();
        let mut path = tree.proof(0).unwrap();
        path.index = 4;
        assert!(!path.verify(leaf(0), tree.root()));
    }

    #[test]
    fn update_pair_matches_tree_updates() {
        for (i, j) in [(0u32, 1u32), (1, 0), (2, 5), (6, 1), (3, 3)] {
            let mut tree = MerkleTree::new(3).unwrap();
            for n in 0..7 {
                tree.append(leaf(n)).unwrap();
            }
            let path_i = tree.proof(i).unwrap();
            let path_j = tree.proof(j).unwrap();

            let (root, after_i, after_j) = update_pair(&path_i, leaf(40), &path_j, leaf(50));
            tree.update(i, leaf(40)).unwrap();
            tree.update(j, leaf(50)).unwrap();

            assert_eq!(root, tree.root(), "pair ({i}, {j})");
            assert_eq!(after_i, tree.proof(i).unwrap());
            assert_eq!(after_j, tree.proof(j).unwrap());
        }
    }

    #[test]
    fn update_pair_keeps_other_leaves() {
        let mut tree = MerkleTree::new(2).unwrap();
        for n in 0..4 {
            tree.append(leaf(n)).unwrap();
        }
        let (root, _, _) = update_pair(
            &tree.proof(0).unwrap(),
            leaf(10),
            &tree.proof(1).unwrap(),
            leaf(11),
        );
        let mut touched = tree.clone();
        touched.update(3, leaf(99)).unwrap();
        touched.update(0, leaf(10)).unwrap();
        touched.update(1, leaf(11)).unwrap();
        assert_ne!(root, touched.root());
    }

    #[test]
    fn path_serde_round_trip() {
        let mut tree = MerkleTree::new(3).unwrap();
        tree.append(leaf(0)).unwrap();
        let path = tree.proof(0).unwrap();
        let json = serde_json::to_string(&path).unwrap();
        let restored: MerklePath = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, path);
    }
}
