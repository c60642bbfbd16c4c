//! Diff proofs: Merkle proofs covering every leaf except a set of explicitly supplied ranges.
//!
//! Two flavours share one walk:
//! - the *diff* proof drains to a known leaf count, which lets a verifier extend the tree
//!   with leaves past the old end (appends);
//! - the *limit* proof drains to an unbounded sentinel, folding whatever follows the last
//!   range into a single boundary root. An empty range list yields an empty, trivially
//!   valid limit proof.

use crate::error::{MerkleError, Result};
use crate::range::{adjacent_subtree_size, check_ranges, ProofRange};
use crate::source::{LeafSource, SubtreeSource};
use crate::tree::MerkleTree;
use strata_types::Hash;

/// Drain end standing in for "all remaining leaves".
pub const UNBOUNDED: u64 = u64::MAX;

struct ProofBuilder<'a, S: ?Sized> {
    source: &'a mut S,
    leaf_index: u64,
    proof: Vec<Hash>,
}

impl<'a, S: SubtreeSource + ?Sized> ProofBuilder<'a, S> {
    fn consume_until(&mut self, end: u64) -> Result<()> {
        while self.leaf_index < end {
            let size = adjacent_subtree_size(self.leaf_index, end);
            let root = self.source.subtree_root(size)?;
            self.proof.push(root);
            self.leaf_index += size;
        }
        Ok(())
    }

    fn walk_ranges(&mut self, ranges: &[ProofRange]) -> Result<()> {
        for range in ranges {
            self.consume_until(range.left)?;
            self.source.skip(range.len())?;
            self.leaf_index = range.right;
        }
        Ok(())
    }
}

/// Builds a proof for everything outside `ranges` in a tree of exactly `num_leaves` leaves.
pub fn build_diff_proof<S: SubtreeSource + ?Sized>(
    ranges: &[ProofRange],
    source: &mut S,
    num_leaves: u64,
) -> Result<Vec<Hash>> {
    check_ranges(ranges)?;
    if let Some(last) = ranges.last() {
        if last.right > num_leaves {
            return Err(MerkleError::InvalidRanges(format!(
                "range ends at {} past the {} leaves of the tree",
                last.right, num_leaves
            )));
        }
    }

    let mut builder = ProofBuilder {
        source,
        leaf_index: 0,
        proof: Vec::new(),
    };
    builder.walk_ranges(ranges)?;
    builder.consume_until(num_leaves)?;
    Ok(builder.proof)
}

/// Builds a proof for everything outside `ranges`, consuming the source until it runs dry.
pub fn build_limit_proof<S: SubtreeSource + ?Sized>(
    ranges: &[ProofRange],
    source: &mut S,
) -> Result<Vec<Hash>> {
    check_ranges(ranges)?;
    if ranges.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = ProofBuilder {
        source,
        leaf_index: 0,
        proof: Vec::new(),
    };
    builder.walk_ranges(ranges)?;
    match builder.consume_until(UNBOUNDED) {
        Ok(()) | Err(MerkleError::NoMoreLeaves) => Ok(builder.proof),
        Err(e) => Err(e),
    }
}

/// Rebuilds a root from proof hashes and the leaves of `ranges`.
/// Returns `None` when the proof holds hashes that were never placed in the tree.
fn reconstruct<L: LeafSource + ?Sized>(
    leaves: &mut L,
    ranges: &[ProofRange],
    proof: &[Hash],
    end: u64,
) -> Result<Option<Hash>> {
    let mut tree = MerkleTree::new();
    let mut leaf_index = 0u64;
    let mut remaining = proof;

    let mut consume_until = |tree: &mut MerkleTree, leaf_index: &mut u64, end: u64| -> Result<()> {
        while *leaf_index < end {
            let Some((hash, rest)) = remaining.split_first() else {
                break;
            };
            let size = adjacent_subtree_size(*leaf_index, end);
            tree.push_subtree(size.trailing_zeros(), *hash)?;
            remaining = rest;
            *leaf_index += size;
        }
        Ok(())
    };

    for range in ranges {
        consume_until(&mut tree, &mut leaf_index, range.left)?;
        for _ in range.left..range.right {
            tree.push_subtree(0, leaves.next_leaf()?)?;
        }
        leaf_index += range.len();
    }
    consume_until(&mut tree, &mut leaf_index, end)?;

    if !remaining.is_empty() {
        return Ok(None);
    }
    Ok(Some(tree.root().unwrap_or(Hash::ZERO)))
}

/// Checks that the leaves of `ranges` together with `proof` produce `root` for a tree of
/// `num_leaves` leaves. The proof must have been built against the leaf count at which
/// the first leaf following it starts.
pub fn verify_diff_proof<L: LeafSource + ?Sized>(
    leaves: &mut L,
    ranges: &[ProofRange],
    num_leaves: u64,
    proof: &[Hash],
    root: &Hash,
) -> Result<bool> {
    check_ranges(ranges)?;
    match reconstruct(leaves, ranges, proof, num_leaves)? {
        Some(computed) => Ok(&computed == root),
        None => Ok(false),
    }
}

/// Counterpart of [`build_limit_proof`].
pub fn verify_limit_proof<L: LeafSource + ?Sized>(
    leaves: &mut L,
    ranges: &[ProofRange],
    proof: &[Hash],
    root: &Hash,
) -> Result<bool> {
    check_ranges(ranges)?;
    if ranges.is_empty() {
        return Ok(true);
    }
    match reconstruct(leaves, ranges, proof, UNBOUNDED)? {
        Some(computed) => Ok(&computed == root),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CachedLeafSource, CachedSubtreeSource};
    use crate::tree::{cached_tree_root, leaf_hash};

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(|i| leaf_hash(&[i])).collect()
    }

    fn claimed(all: &[Hash], ranges: &[ProofRange]) -> CachedLeafSource {
        CachedLeafSource::new(
            ranges
                .iter()
                .flat_map(|r| all[r.left as usize..r.right as usize].to_vec()),
        )
    }

    #[test]
    fn test_diff_proof_single_middle_range() {
        let all = leaves(5);
        let ranges = [ProofRange::new(1, 2)];
        let proof =
            build_diff_proof(&ranges, &mut CachedSubtreeSource::new(all.clone()), 5).unwrap();
        // leaf 0, subtree [2, 4), leaf 4
        assert_eq!(proof.len(), 3);
        let root = cached_tree_root(&all);
        assert!(verify_diff_proof(&mut claimed(&all, &ranges), &ranges, 5, &proof, &root).unwrap());
    }

    #[test]
    fn test_diff_proof_without_ranges_covers_tree() {
        let all = leaves(7);
        let proof = build_diff_proof(&[], &mut CachedSubtreeSource::new(all.clone()), 7).unwrap();
        assert_eq!(proof.len(), 3);
        let root = cached_tree_root(&all);
        assert!(verify_diff_proof(&mut CachedLeafSource::default(), &[], 7, &proof, &root).unwrap());
    }

    #[test]
    fn test_diff_proof_extends_with_appended_leaves() {
        let old = leaves(5);
        let proof = build_diff_proof(&[], &mut CachedSubtreeSource::new(old.clone()), 5).unwrap();

        let mut new = old.clone();
        new.push(leaf_hash(b"appended"));
        new.push(leaf_hash(b"appended again"));
        let ranges = [ProofRange::new(5, 7)];
        let mut appended = CachedLeafSource::new(new[5..].to_vec());
        assert!(verify_diff_proof(&mut appended, &ranges, 7, &proof, &cached_tree_root(&new)).unwrap());
    }

    #[test]
    fn test_empty_file_diff_proof() {
        let proof = build_diff_proof(&[], &mut CachedSubtreeSource::default(), 0).unwrap();
        assert!(proof.is_empty());
        assert!(
            verify_diff_proof(&mut CachedLeafSource::default(), &[], 0, &proof, &Hash::ZERO).unwrap()
        );
    }

    #[test]
    fn test_diff_proof_rejects_range_past_end() {
        let all = leaves(3);
        let err = build_diff_proof(
            &[ProofRange::new(2, 4)],
            &mut CachedSubtreeSource::new(all),
            3,
        )
        .unwrap_err();
        assert!(matches!(err, MerkleError::InvalidRanges(_)));
    }

    #[test]
    fn test_limit_proof_empty_ranges_is_trivial() {
        let all = leaves(4);
        let proof = build_limit_proof(&[], &mut CachedSubtreeSource::new(all)).unwrap();
        assert!(proof.is_empty());
        assert!(verify_limit_proof(&mut CachedLeafSource::default(), &[], &proof, &Hash::ZERO).unwrap());
    }

    #[test]
    fn test_limit_proof_roundtrip_and_wrong_root() {
        let all = leaves(11);
        let ranges = [ProofRange::new(2, 3), ProofRange::new(6, 9)];
        let proof = build_limit_proof(&ranges, &mut CachedSubtreeSource::new(all.clone())).unwrap();
        let root = cached_tree_root(&all);
        assert!(verify_limit_proof(&mut claimed(&all, &ranges), &ranges, &proof, &root).unwrap());

        let other = cached_tree_root(&all[..10]);
        assert!(!verify_limit_proof(&mut claimed(&all, &ranges), &ranges, &proof, &other).unwrap());
    }

    #[test]
    fn test_unsorted_ranges_fail_before_reading_source() {
        let mut source = CachedSubtreeSource::new(leaves(8));
        let ranges = [ProofRange::new(4, 5), ProofRange::new(1, 2)];
        assert!(build_limit_proof(&ranges, &mut source).is_err());
        assert_eq!(source.remaining(), 8);
    }

    #[test]
    fn test_extra_proof_hash_is_rejected() {
        let all = leaves(4);
        let ranges = [ProofRange::new(0, 1)];
        let mut proof =
            build_diff_proof(&ranges, &mut CachedSubtreeSource::new(all.clone()), 4).unwrap();
        proof.push(leaf_hash(b"junk"));
        let root = cached_tree_root(&all);
        assert!(!verify_diff_proof(&mut claimed(&all, &ranges), &ranges, 4, &proof, &root).unwrap());
    }

    #[test]
    fn test_missing_leaves_is_an_error() {
        let all = leaves(4);
        let ranges = [ProofRange::new(0, 2)];
        let proof =
            build_diff_proof(&ranges, &mut CachedSubtreeSource::new(all.clone()), 4).unwrap();
        let mut short = CachedLeafSource::new(vec![all[0]]);
        assert_eq!(
            verify_diff_proof(&mut short, &ranges, 4, &proof, &cached_tree_root(&all)),
            Err(MerkleError::NoMoreLeaves)
        );
    }
}
