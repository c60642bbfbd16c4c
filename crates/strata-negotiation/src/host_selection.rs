//! Weighted random choice of hosts from a ranked candidate list ("lucky wheel").

use crate::error::{NegotiationError, Result};
use rand::Rng;
use strata_types::PublicKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCandidate {
    pub public_key: PublicKey,
    /// Relative chance of being picked; zero never wins
    pub weight: u64,
}

/// Picks `count` distinct candidates, each draw proportional to weight among those left.
pub fn select_hosts<R: Rng + ?Sized>(
    candidates: &[HostCandidate],
    count: usize,
    rng: &mut R,
) -> Result<Vec<HostCandidate>> {
    if candidates.len() < count {
        return Err(NegotiationError::InvalidRequest(format!(
            "{} hosts requested from {} candidates",
            count,
            candidates.len()
        )));
    }

    let mut wheel = candidates.to_vec();
    let mut selected = Vec::with_capacity(count);
    for _ in 0..count {
        let total: u128 = wheel.iter().map(|c| u128::from(c.weight)).sum();
        if total == 0 {
            return Err(NegotiationError::InvalidRequest(format!(
                "only {} of {} requested hosts have weight",
                selected.len(),
                count
            )));
        }

        let target = rng.gen_range(0..total);
        let mut cumulative = 0u128;
        let position = wheel.iter().position(|candidate| {
            cumulative += u128::from(candidate.weight);
            cumulative > target
        });
        let Some(position) = position else {
            return Err(NegotiationError::InternalInvariant(format!(
                "wheel exhausted at {} of total weight {}",
                target, total
            )));
        };
        selected.push(wheel.remove(position));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn candidate(byte: u8, weight: u64) -> HostCandidate {
        HostCandidate {
            public_key: PublicKey::from_bytes([byte; 32]),
            weight,
        }
    }

    #[test]
    fn test_selects_distinct_hosts() {
        let candidates: Vec<_> = (1..=6).map(|i| candidate(i, u64::from(i) * 10)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let picked = select_hosts(&candidates, 4, &mut rng).unwrap();
        let keys: HashSet<_> = picked.iter().map(|c| c.public_key).collect();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let candidates = vec![candidate(1, 0), candidate(2, 5), candidate(3, 0)];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let picked = select_hosts(&candidates, 1, &mut rng).unwrap();
            assert_eq!(picked[0].public_key, PublicKey::from_bytes([2; 32]));
        }
        let err = select_hosts(&candidates, 2, &mut rng).unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidRequest(_)));
    }

    #[test]
    fn test_heavier_hosts_win_more_often() {
        let candidates = vec![candidate(1, 1), candidate(2, 99)];
        let mut rng = StdRng::seed_from_u64(42);
        let heavy_wins = (0..1_000)
            .filter(|_| {
                select_hosts(&candidates, 1, &mut rng).unwrap()[0].public_key
                    == PublicKey::from_bytes([2; 32])
            })
            .count();
        assert!(heavy_wins > 900);
    }

    #[test]
    fn test_too_few_candidates() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(select_hosts(&[candidate(1, 1)], 2, &mut rng).is_err());
        assert!(select_hosts(&[], 0, &mut rng).unwrap().is_empty());
    }
}
