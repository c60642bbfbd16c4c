use crate::error::{MerkleError, Result};
use strata_types::{Hash, SEGMENT_SIZE};

const LEAF_PREFIX: [u8; 1] = [0x00];
const NODE_PREFIX: [u8; 1] = [0x01];

/// Hash of a single leaf's raw data.
pub fn leaf_hash(data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&LEAF_PREFIX);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of an interior node joining two subtree roots.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&NODE_PREFIX);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone, Copy)]
struct SubTree {
    height: u32,
    sum: Hash,
}

/// Incremental Merkle tree kept as a stack of perfect subtrees.
///
/// Leaves and cached subtrees are pushed left to right. Two subtrees of equal height
/// are joined as soon as they meet, so the stack always mirrors the binary
/// decomposition of the number of leaves pushed so far. The root of an unbalanced
/// tree folds the remaining stack from the smallest subtree upwards.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    stack: Vec<SubTree>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn push_leaf(&mut self, data: &[u8]) {
        self.push(SubTree {
            height: 0,
            sum: leaf_hash(data),
        });
    }

    /// Pushes the root of a perfect subtree of `height`. The subtree may not be taller
    /// than the smallest subtree already on the stack.
    pub fn push_subtree(&mut self, height: u32, sum: Hash) -> Result<()> {
        if let Some(head) = self.stack.last() {
            if head.height < height {
                return Err(MerkleError::SubtreeOrder {
                    head: head.height,
                    pushed: height,
                });
            }
        }
        self.push(SubTree { height, sum });
        Ok(())
    }

    fn push(&mut self, subtree: SubTree) {
        self.stack.push(subtree);
        while self.stack.len() >= 2 {
            let len = self.stack.len();
            if self.stack[len - 1].height != self.stack[len - 2].height {
                break;
            }
            let newer = self.stack.pop();
            let older = self.stack.pop();
            if let (Some(older), Some(newer)) = (older, newer) {
                self.stack.push(SubTree {
                    height: older.height + 1,
                    sum: node_hash(&older.sum, &newer.sum),
                });
            }
        }
    }

    /// Root of everything pushed so far, `None` for an empty tree.
    pub fn root(&self) -> Option<Hash> {
        let mut iter = self.stack.iter().rev();
        let mut current = iter.next()?.sum;
        for older in iter {
            current = node_hash(&older.sum, &current);
        }
        Some(current)
    }
}

/// Merkle root of a sector's content, using segments as leaves.
pub fn sector_root(data: &[u8]) -> Hash {
    let mut tree = MerkleTree::new();
    for segment in data.chunks(SEGMENT_SIZE as usize) {
        tree.push_leaf(segment);
    }
    tree.root().unwrap_or(Hash::ZERO)
}

/// Root of a tree whose leaves are already-computed hashes, such as a file's sector roots.
/// The leaves are not rehashed, so a one-sector file has that sector's root as its root.
pub fn cached_tree_root(leaves: &[Hash]) -> Hash {
    let mut tree = MerkleTree::new();
    for leaf in leaves {
        tree.push(SubTree {
            height: 0,
            sum: *leaf,
        });
    }
    tree.root().unwrap_or(Hash::ZERO)
}
