use crate::error::{MerkleError, Result};
use crate::proof::{build_limit_proof, verify_limit_proof};
use crate::range::ProofRange;
use crate::source::{ReaderLeafSource, ReaderSubtreeSource};
use strata_types::{Hash, SEGMENT_SIZE};

/// Proves that segments `[start, end)` of `sector` belong under the sector's root.
pub fn build_range_proof(sector: &[u8], start: u64, end: u64) -> Result<Vec<Hash>> {
    let num_segments = (sector.len() as u64).div_ceil(SEGMENT_SIZE);
    if start >= end || end > num_segments {
        return Err(MerkleError::InvalidRanges(format!(
            "segment range [{}, {}) outside a sector of {} segments",
            start, end, num_segments
        )));
    }
    let mut source = ReaderSubtreeSource::new(sector, SEGMENT_SIZE as usize);
    build_limit_proof(&[ProofRange::new(start, end)], &mut source)
}

/// Checks that `data`, the content of segments `[start, end)`, hashes up to `root` with `proof`.
pub fn verify_range_proof(
    data: &[u8],
    proof: &[Hash],
    start: u64,
    end: u64,
    root: &Hash,
) -> Result<bool> {
    if start >= end {
        return Err(MerkleError::InvalidRanges(format!(
            "empty segment range [{}, {})",
            start, end
        )));
    }
    if (data.len() as u64).div_ceil(SEGMENT_SIZE) != end - start {
        return Ok(false);
    }
    let mut leaves = ReaderLeafSource::new(data, SEGMENT_SIZE as usize);
    verify_limit_proof(&mut leaves, &[ProofRange::new(start, end)], proof, root)
}
