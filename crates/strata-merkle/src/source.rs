use crate::error::{MerkleError, Result};
use crate::tree::{leaf_hash, MerkleTree};
use std::collections::VecDeque;
use std::io::{self, Read};
use strata_types::Hash;

/// Produces roots of consecutive subtrees, left to right, for proof construction.
pub trait SubtreeSource {
    /// Consumes the next `n` leaves and returns the root of the subtree they form.
    ///
    /// If fewer than `n` leaves remain, the root of the remaining ones is returned.
    /// Fails with [`MerkleError::NoMoreLeaves`] when nothing is left.
    fn subtree_root(&mut self, n: u64) -> Result<Hash>;

    /// Advances past `n` leaves without hashing them.
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// Produces individual leaf hashes, left to right, for proof verification.
pub trait LeafSource {
    fn next_leaf(&mut self) -> Result<Hash>;
}

/// Fills `buf` from `reader`, returning how many bytes were read before EOF.
fn read_leaf<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Streams raw leaf data out of a reader and hashes it on demand.
pub struct ReaderSubtreeSource<R> {
    reader: R,
    leaf_size: usize,
    buf: Vec<u8>,
}

impl<R: Read> ReaderSubtreeSource<R> {
    pub fn new(reader: R, leaf_size: usize) -> Self {
        Self {
            reader,
            leaf_size,
            buf: vec![0u8; leaf_size],
        }
    }
}

impl<R: Read> SubtreeSource for ReaderSubtreeSource<R> {
    fn subtree_root(&mut self, n: u64) -> Result<Hash> {
        let mut tree = MerkleTree::new();
        for _ in 0..n {
            let read = read_leaf(&mut self.reader, &mut self.buf)?;
            if read == 0 {
                break;
            }
            tree.push_leaf(&self.buf[..read]);
            if read < self.leaf_size {
                break;
            }
        }
        tree.root().ok_or(MerkleError::NoMoreLeaves)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let wanted = n.saturating_mul(self.leaf_size as u64);
        let copied = io::copy(&mut (&mut self.reader).take(wanted), &mut io::sink())?;
        if copied < wanted {
            return Err(MerkleError::ShortSkip {
                requested: n,
                available: copied / self.leaf_size as u64,
            });
        }
        Ok(())
    }
}

/// Pops precomputed leaf hashes, such as the sector roots a host already tracks.
#[derive(Debug, Clone, Default)]
pub struct CachedSubtreeSource {
    roots: VecDeque<Hash>,
}

impl CachedSubtreeSource {
    pub fn new(roots: impl IntoIterator<Item = Hash>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.roots.len()
    }
}

impl SubtreeSource for CachedSubtreeSource {
    fn subtree_root(&mut self, n: u64) -> Result<Hash> {
        if self.roots.is_empty() {
            return Err(MerkleError::NoMoreLeaves);
        }
        let take = (n as usize).min(self.roots.len());
        let mut tree = MerkleTree::new();
        for root in self.roots.drain(..take) {
            tree.push_subtree(0, root)?;
        }
        tree.root().ok_or(MerkleError::NoMoreLeaves)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.roots.len() as u64 {
            return Err(MerkleError::ShortSkip {
                requested: n,
                available: self.roots.len() as u64,
            });
        }
        self.roots.drain(..n as usize);
        Ok(())
    }
}

/// Reads leaf data from a stream and hashes one leaf at a time.
pub struct ReaderLeafSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> ReaderLeafSource<R> {
    pub fn new(reader: R, leaf_size: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; leaf_size],
        }
    }
}

impl<R: Read> LeafSource for ReaderLeafSource<R> {
    fn next_leaf(&mut self) -> Result<Hash> {
        let read = read_leaf(&mut self.reader, &mut self.buf)?;
        if read == 0 {
            return Err(MerkleError::NoMoreLeaves);
        }
        Ok(leaf_hash(&self.buf[..read]))
    }
}

/// Yields already-known leaf hashes in order.
#[derive(Debug, Clone, Default)]
pub struct CachedLeafSource {
    leaves: VecDeque<Hash>,
}

impl CachedLeafSource {
    pub fn new(leaves: impl IntoIterator<Item = Hash>) -> Self {
        Self {
            leaves: leaves.into_iter().collect(),
        }
    }
}

impl LeafSource for CachedLeafSource {
    fn next_leaf(&mut self) -> Result<Hash> {
        self.leaves.pop_front().ok_or(MerkleError::NoMoreLeaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::cached_tree_root;

    #[test]
    fn test_reader_source_short_subtree() {
        let data = [1u8, 2, 3, 4, 5];
        let mut source = ReaderSubtreeSource::new(&data[..], 2);
        // Asking for more leaves than remain returns the boundary root.
        let root = source.subtree_root(8).unwrap();
        let mut tree = MerkleTree::new();
        tree.push_leaf(&[1, 2]);
        tree.push_leaf(&[3, 4]);
        tree.push_leaf(&[5]);
        assert_eq!(Some(root), tree.root());
        assert_eq!(source.subtree_root(1), Err(MerkleError::NoMoreLeaves));
    }

    #[test]
    fn test_reader_source_skip() {
        let data = [0u8; 8];
        let mut source = ReaderSubtreeSource::new(&data[..], 2);
        source.skip(3).unwrap();
        assert!(source.subtree_root(1).is_ok());
        assert_eq!(
            source.skip(1),
            Err(MerkleError::ShortSkip {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_cached_source() {
        let roots: Vec<Hash> = (0u8..3).map(|i| leaf_hash(&[i])).collect();
        let mut source = CachedSubtreeSource::new(roots.clone());
        assert_eq!(source.subtree_root(2).unwrap(), cached_tree_root(&roots[..2]));
        assert_eq!(source.remaining(), 1);
        assert!(source.skip(2).is_err());
        source.skip(1).unwrap();
        assert_eq!(source.subtree_root(1), Err(MerkleError::NoMoreLeaves));
    }

    #[test]
    fn test_leaf_sources_agree() {
        let data: Vec<u8> = (0u8..10).collect();
        let mut reader = ReaderLeafSource::new(&data[..], 4);
        let mut cached = CachedLeafSource::new(data.chunks(4).map(leaf_hash));
        for _ in 0..3 {
            assert_eq!(reader.next_leaf().unwrap(), cached.next_leaf().unwrap());
        }
        assert_eq!(reader.next_leaf(), Err(MerkleError::NoMoreLeaves));
        assert_eq!(cached.next_leaf(), Err(MerkleError::NoMoreLeaves));
    }
}
