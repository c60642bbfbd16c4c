//! Payout splits and cost estimates shared by both sides of a negotiation.

use crate::error::{ContractError, Result};
use crate::settings::HostSettings;
use strata_types::{Amount, HASH_SIZE, RPC_MIN_LEN, SECTOR_SIZE, SEGMENTS_PER_SECTOR};

/// Client-side inputs to the payout split of a new contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutTerms {
    pub funding: Amount,
    pub tx_fee: Amount,
    pub base_price: Amount,
    pub base_collateral: Amount,
    pub period: u64,
    pub expected_storage: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutSplit {
    pub client_payout: Amount,
    pub host_payout: Amount,
    pub host_collateral: Amount,
}

fn overflow(what: &str) -> ContractError {
    ContractError::Overflow(what.to_string())
}

/// Splits `funding` into the client's payout and the host's payout plus collateral,
/// before any ledger fees.
///
/// Host collateral scales with how much storage the client's payout could buy, capped at
/// five times the collateral for the expected storage and then at the host's maximum.
pub fn renter_payouts_pre_tax(host: &HostSettings, terms: &PayoutTerms) -> Result<PayoutSplit> {
    let storage_price = if host.storage_price.is_zero() {
        Amount::from_base_units(1)
    } else {
        host.storage_price
    };

    let required = host
        .contract_price
        .checked_add(terms.tx_fee)
        .and_then(|a| a.checked_add(terms.base_price))
        .ok_or_else(|| overflow("contract price plus fees"))?;
    if terms.funding <= required {
        return Err(ContractError::InsufficientFunding {
            funding: terms.funding,
            required,
        });
    }
    let client_payout = terms
        .funding
        .checked_sub(required)
        .ok_or_else(|| overflow("client payout"))?;

    let max_storage_size_time = client_payout
        .checked_div(storage_price)
        .ok_or_else(|| overflow("storage size time"))?;
    let mut host_collateral = max_storage_size_time
        .checked_mul_amount(host.deposit)
        .and_then(|c| c.checked_add(terms.base_collateral))
        .ok_or_else(|| overflow("host collateral"))?;

    let max_client_collateral = host
        .deposit
        .checked_mul(terms.period)
        .and_then(|c| c.checked_mul(terms.expected_storage))
        .and_then(|c| c.checked_mul(5))
        .ok_or_else(|| overflow("collateral cap"))?;
    host_collateral = host_collateral.min(max_client_collateral).min(host.max_deposit);

    let host_payout = host_collateral
        .checked_add(host.contract_price)
        .and_then(|p| p.checked_add(terms.base_price))
        .ok_or_else(|| overflow("host payout"))?;

    Ok(PayoutSplit {
        client_payout,
        host_payout,
        host_collateral,
    })
}

/// Breakdown of what an upload of appended sectors costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadCost {
    pub bandwidth: Amount,
    pub storage: Amount,
    pub base: Amount,
    /// Host collateral put at risk for the new data
    pub collateral: Amount,
}

impl UploadCost {
    /// Amount moved from client to host
    pub fn total(&self) -> Result<Amount> {
        self.bandwidth
            .checked_add(self.storage)
            .and_then(|a| a.checked_add(self.base))
            .ok_or_else(|| overflow("upload cost"))
    }
}

/// Prices `appended` new sectors held for `blocks_remaining` blocks.
///
/// With `proof_actions` set, the bandwidth of the returned diff proof is charged at the
/// download price, sized for that many actions. The client pays this; the host expects
/// at least the proof-free amount.
pub fn estimate_upload_cost(
    host: &HostSettings,
    appended: u64,
    blocks_remaining: u64,
    proof_actions: Option<u64>,
) -> Result<UploadCost> {
    let block_bytes = SECTOR_SIZE
        .checked_mul(blocks_remaining)
        .ok_or_else(|| overflow("block bytes"))?;

    let mut bandwidth = host
        .upload_bandwidth_price
        .checked_mul(SECTOR_SIZE)
        .and_then(|p| p.checked_mul(appended))
        .ok_or_else(|| overflow("upload bandwidth"))?;
    if let Some(actions) = proof_actions {
        let proof_size = HASH_SIZE * (128 + actions);
        let proof_bandwidth = host
            .download_bandwidth_price
            .checked_mul(proof_size)
            .ok_or_else(|| overflow("proof bandwidth"))?;
        bandwidth = bandwidth
            .checked_add(proof_bandwidth)
            .ok_or_else(|| overflow("bandwidth"))?;
    }

    let storage = host
        .storage_price
        .checked_mul(block_bytes)
        .and_then(|p| p.checked_mul(appended))
        .ok_or_else(|| overflow("storage"))?;
    let collateral = host
        .deposit
        .checked_mul(block_bytes)
        .and_then(|p| p.checked_mul(appended))
        .ok_or_else(|| overflow("collateral"))?;

    Ok(UploadCost {
        bandwidth,
        storage,
        base: host.base_rpc_price,
        collateral,
    })
}

/// Worst-case proof hashes for one section: twice the depth of a sector's segment tree
pub fn worst_case_proof_hashes() -> u64 {
    2 * (64 - SEGMENTS_PER_SECTOR.leading_zeros()) as u64
}

/// Bytes a download is charged for, never less than [`RPC_MIN_LEN`]
pub fn estimate_download_bandwidth(total_length: u64, sections: u64, merkle_proof: bool) -> u64 {
    let proof_hashes = if merkle_proof {
        sections * worst_case_proof_hashes()
    } else {
        0
    };
    (total_length + proof_hashes * HASH_SIZE).max(RPC_MIN_LEN)
}

/// Base price plus bandwidth plus one access charge per distinct sector
pub fn estimate_download_cost(
    host: &HostSettings,
    total_length: u64,
    sections: u64,
    distinct_sectors: u64,
    merkle_proof: bool,
) -> Result<Amount> {
    let bandwidth = estimate_download_bandwidth(total_length, sections, merkle_proof);
    let bandwidth_price = host
        .download_bandwidth_price
        .checked_mul(bandwidth)
        .ok_or_else(|| overflow("download bandwidth"))?;
    let access_price = host
        .sector_access_price
        .checked_mul(distinct_sectors)
        .ok_or_else(|| overflow("sector access"))?;
    host.base_rpc_price
        .checked_add(bandwidth_price)
        .and_then(|p| p.checked_add(access_price))
        .ok_or_else(|| overflow("download cost"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::PublicKey;

    fn host() -> HostSettings {
        HostSettings {
            public_key: PublicKey::from_bytes([1u8; 32]),
            accepting_contracts: true,
            max_duration: 10_000,
            window_size: 100,
            contract_price: Amount::from_base_units(1_000),
            storage_price: Amount::from_base_units(2),
            upload_bandwidth_price: Amount::from_base_units(3),
            download_bandwidth_price: Amount::from_base_units(5),
            sector_access_price: Amount::from_base_units(7),
            base_rpc_price: Amount::from_base_units(11),
            deposit: Amount::from_base_units(1),
            max_deposit: Amount::from_base_units(1_000_000),
        }
    }

    fn terms(funding: u128) -> PayoutTerms {
        PayoutTerms {
            funding: Amount::from_base_units(funding),
            tx_fee: Amount::from_base_units(100),
            base_price: Amount::from_base_units(50),
            base_collateral: Amount::from_base_units(10),
            period: 100,
            expected_storage: 1_000,
        }
    }

    #[test]
    fn test_payout_split() {
        let split = renter_payouts_pre_tax(&host(), &terms(10_150)).unwrap();
        // 10_150 - 1_000 - 100 - 50
        assert_eq!(split.client_payout, Amount::from_base_units(9_000));
        // 9_000 / 2 * 1 + 10
        assert_eq!(split.host_collateral, Amount::from_base_units(4_510));
        assert_eq!(split.host_payout, Amount::from_base_units(4_510 + 1_000 + 50));
    }

    #[test]
    fn test_payout_collateral_caps() {
        let mut settings = host();
        let split = renter_payouts_pre_tax(&settings, &terms(10_000_000)).unwrap();
        // capped at deposit * period * expected storage * 5
        assert_eq!(split.host_collateral, Amount::from_base_units(500_000));

        settings.max_deposit = Amount::from_base_units(1_234);
        let split = renter_payouts_pre_tax(&settings, &terms(10_000_000)).unwrap();
        assert_eq!(split.host_collateral, Amount::from_base_units(1_234));
    }

    #[test]
    fn test_payout_insufficient_funding() {
        let err = renter_payouts_pre_tax(&host(), &terms(1_150)).unwrap_err();
        assert_eq!(
            err,
            ContractError::InsufficientFunding {
                funding: Amount::from_base_units(1_150),
                required: Amount::from_base_units(1_150),
            }
        );
    }

    #[test]
    fn test_zero_storage_price_treated_as_one() {
        let mut settings = host();
        settings.storage_price = Amount::ZERO;
        let split = renter_payouts_pre_tax(&settings, &terms(2_150)).unwrap();
        assert_eq!(split.host_collateral, Amount::from_base_units(1_010));
    }

    #[test]
    fn test_upload_cost_client_exceeds_host() {
        let settings = host();
        let client = estimate_upload_cost(&settings, 1, 10, Some(1)).unwrap();
        let host_view = estimate_upload_cost(&settings, 1, 10, None).unwrap();
        assert!(client.total().unwrap() > host_view.total().unwrap());
        assert_eq!(client.collateral, host_view.collateral);
        assert_eq!(
            host_view.storage,
            Amount::from_base_units(2 * SECTOR_SIZE as u128 * 10)
        );
    }

    #[test]
    fn test_download_estimates() {
        assert_eq!(worst_case_proof_hashes(), 34);
        assert_eq!(estimate_download_bandwidth(10, 1, false), RPC_MIN_LEN);
        assert_eq!(
            estimate_download_bandwidth(8192, 2, true),
            8192 + 2 * 34 * HASH_SIZE
        );
        let cost = estimate_download_cost(&host(), 8192, 2, 1, false).unwrap();
        assert_eq!(cost, Amount::from_base_units(11 + 5 * 8192 + 7));
    }
}
