use crate::error::{MerkleError, Result};
use serde::{Deserialize, Serialize};

/// Half-open interval `[left, right)` of leaf indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProofRange {
    pub left: u64,
    pub right: u64,
}

impl ProofRange {
    pub fn new(left: u64, right: u64) -> Self {
        Self { left, right }
    }

    pub fn len(&self) -> u64 {
        self.right.saturating_sub(self.left)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left
    }
}

/// Ranges must be non-empty, sorted and must not overlap.
pub fn check_ranges(ranges: &[ProofRange]) -> Result<()> {
    let mut prev_right = 0u64;
    for (i, range) in ranges.iter().enumerate() {
        if range.left >= range.right {
            return Err(MerkleError::InvalidRanges(format!(
                "range {} is empty: [{}, {})",
                i, range.left, range.right
            )));
        }
        if i > 0 && range.left < prev_right {
            return Err(MerkleError::InvalidRanges(format!(
                "range {} starts at {} before the previous range ends at {}",
                i, range.left, prev_right
            )));
        }
        prev_right = range.right;
    }
    Ok(())
}

/// Size of the largest perfect subtree that starts at `left`, is aligned to its own
/// size, and does not extend past `right`. Returns 0 when `left >= right`.
pub fn adjacent_subtree_size(left: u64, right: u64) -> u64 {
    if left >= right {
        return 0;
    }
    let span_height = 63 - (right - left).leading_zeros();
    let align_height = left.trailing_zeros();
    1u64 << align_height.min(span_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_subtree_size() {
        assert_eq!(adjacent_subtree_size(0, 1), 1);
        assert_eq!(adjacent_subtree_size(0, 5), 4);
        assert_eq!(adjacent_subtree_size(4, 5), 1);
        assert_eq!(adjacent_subtree_size(2, 7), 2);
        assert_eq!(adjacent_subtree_size(8, 100), 8);
        assert_eq!(adjacent_subtree_size(0, u64::MAX), 1 << 63);
        assert_eq!(adjacent_subtree_size(5, 5), 0);
    }

    #[test]
    fn test_check_ranges() {
        assert!(check_ranges(&[]).is_ok());
        assert!(check_ranges(&[ProofRange::new(0, 1), ProofRange::new(1, 3)]).is_ok());
        assert!(check_ranges(&[ProofRange::new(2, 2)]).is_err());
        assert!(check_ranges(&[ProofRange::new(0, 3), ProofRange::new(2, 4)]).is_err());
        assert!(check_ranges(&[ProofRange::new(4, 5), ProofRange::new(0, 1)]).is_err());
    }
}
