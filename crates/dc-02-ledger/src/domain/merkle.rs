//! # Merkle Tree
//!
//! Binary hash tree over transaction hashes. Each parent is
//! `hash256(left || right)`; a level with an odd count pairs its last node
//! with itself. A single leaf is its own root.
//!
//! Nodes live in an arena. A duplicated right child is the same arena slot
//! as its left sibling; trimming follows the left one.

use shared_crypto::hash256;
use shared_types::UInt256;

#[derive(Debug, Clone)]
struct Node {
    hash: UInt256,
    children: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    nodes: Vec<Node>,
    root: usize,
    depth: usize,
}

fn hash_pair(left: &UInt256, right: &UInt256) -> UInt256 {
    let mut buffer = [0u8; 64];
    buffer[..32].copy_from_slice(left.as_bytes());
    buffer[32..].copy_from_slice(right.as_bytes());
    hash256(&buffer)
}

impl MerkleTree {
    /// Build the full tree. Returns `None` for an empty leaf list.
    pub fn build(hashes: &[UInt256]) -> Option<Self> {
        if hashes.is_empty() {
            return None;
        }
        let mut nodes: Vec<Node> = hashes
            .iter()
            .map(|hash| Node {
                hash: *hash,
                children: None,
            })
            .collect();
        let mut level: Vec<usize> = (0..nodes.len()).collect();
        let mut depth = 1;
        while level.len() > 1 {
            let mut parents = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                nodes.push(Node {
                    hash: hash_pair(&nodes[left].hash, &nodes[right].hash),
                    children: Some((left, right)),
                });
                parents.push(nodes.len() - 1);
            }
            level = parents;
            depth += 1;
        }
        Some(Self {
            root: level[0],
            nodes,
            depth,
        })
    }

    /// Root of `hashes` without keeping the tree. The zero hash for an empty list.
    pub fn compute_root(hashes: &[UInt256]) -> UInt256 {
        let mut level = hashes.to_vec();
        if level.is_empty() {
            return UInt256::ZERO;
        }
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
        }
        level[0]
    }

    pub fn root(&self) -> UInt256 {
        self.nodes[self.root].hash
    }

    /// Levels from leaves to root, inclusive.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Collapse every subtree whose leaves are all unflagged into its root hash.
    /// `flags[i]` marks leaf `i`; missing flags count as false.
    pub fn trim(&mut self, flags: &[bool]) {
        let width = 1usize << (self.depth - 1);
        let mut padded = vec![false; width];
        for (slot, flag) in padded.iter_mut().zip(flags) {
            *slot = *flag;
        }
        self.trim_node(self.root, 0, self.depth, &padded);
    }

    fn trim_node(&mut self, node: usize, index: usize, depth: usize, flags: &[bool]) {
        if depth == 1 {
            return;
        }
        let Some((left, right)) = self.nodes[node].children else {
            return;
        };
        if depth == 2 {
            if !flags[index * 2] && !flags[index * 2 + 1] {
                self.nodes[node].children = None;
            }
            return;
        }
        self.trim_node(left, index * 2, depth - 1, flags);
        // a duplicated right child covers only padding and follows its left twin
        if right != left {
            self.trim_node(right, index * 2 + 1, depth - 1, flags);
        }
        if self.nodes[left].children.is_none() && self.nodes[right].children.is_none() {
            self.nodes[node].children = None;
        }
    }

    /// Hashes of every childless node, depth-first, left to right.
    pub fn to_hash_array(&self) -> Vec<UInt256> {
        let mut hashes = Vec::new();
        self.collect(self.root, &mut hashes);
        hashes
    }

    fn collect(&self, node: usize, hashes: &mut Vec<UInt256>) {
        match self.nodes[node].children {
            None => hashes.push(self.nodes[node].hash),
            Some((left, right)) => {
                self.collect(left, hashes);
                self.collect(right, hashes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(i: u8) -> UInt256 {
        UInt256::from([i; 32])
    }

    #[test]
    fn test_single_leaf_is_root() {
        assert_eq!(MerkleTree::compute_root(&[leaf(1)]), leaf(1));
        assert_eq!(MerkleTree::build(&[leaf(1)]).unwrap().root(), leaf(1));
        assert_eq!(MerkleTree::compute_root(&[]), UInt256::ZERO);
        assert!(MerkleTree::build(&[]).is_none());
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let three = [leaf(1), leaf(2), leaf(3)];
        let expected = hash_pair(&hash_pair(&leaf(1), &leaf(2)), &hash_pair(&leaf(3), &leaf(3)));
        assert_eq!(MerkleTree::compute_root(&three), expected);
        assert_eq!(MerkleTree::build(&three).unwrap().root(), expected);
    }

    #[test]
    fn test_trim_all_false_collapses_to_root() {
        let leaves: Vec<_> = (0..8).map(leaf).collect();
        let mut tree = MerkleTree::build(&leaves).unwrap();
        let root = tree.root();
        tree.trim(&[false; 8]);
        assert_eq!(tree.to_hash_array(), vec![root]);
    }

    #[test]
    fn test_trim_keeps_flagged_branch() {
        let leaves: Vec<_> = (0..4).map(leaf).collect();
        let mut tree = MerkleTree::build(&leaves).unwrap();
        tree.trim(&[false, true, false, false]);
        let hashes = tree.to_hash_array();
        assert_eq!(
            hashes,
            vec![leaf(0), leaf(1), hash_pair(&leaf(2), &leaf(3))]
        );
    }

    #[test]
    fn test_trim_odd_width_keeps_flagged_last_leaf() {
        let leaves: Vec<_> = (0..5).map(leaf).collect();
        let mut tree = MerkleTree::build(&leaves).unwrap();
        let root = tree.root();
        tree.trim(&[false, false, false, false, true]);
        let hashes = tree.to_hash_array();
        assert!(hashes.contains(&leaf(4)));
        assert_ne!(hashes, vec![root]);
        assert!(hashes.contains(&MerkleTree::compute_root(&leaves[..4])));
    }

    proptest! {
        #[test]
        fn test_root_matches_built_tree(seeds in proptest::collection::vec(any::<u8>(), 1..40)) {
            let leaves: Vec<_> = seeds.iter().map(|s| leaf(*s)).collect();
            let tree = MerkleTree::build(&leaves).unwrap();
            prop_assert_eq!(tree.root(), MerkleTree::compute_root(&leaves));
        }

        #[test]
        fn test_untrimmed_power_of_two_reproduces_leaves(exp in 0u32..6) {
            let leaves: Vec<_> = (0..(1u8 << exp)).map(leaf).collect();
            let mut tree = MerkleTree::build(&leaves).unwrap();
            tree.trim(&vec![true; leaves.len()]);
            prop_assert_eq!(tree.to_hash_array(), leaves);
        }

        #[test]
        fn test_trim_keeps_any_flagged_leaf(width in 1usize..33, pick in any::<prop::sample::Index>()) {
            let leaves: Vec<_> = (0..width as u8).map(leaf).collect();
            let flagged = pick.index(width);
            let mut flags = vec![false; width];
            flags[flagged] = true;
            let mut tree = MerkleTree::build(&leaves).unwrap();
            tree.trim(&flags);
            prop_assert!(tree.to_hash_array().contains(&leaves[flagged]));
        }
    }
}
