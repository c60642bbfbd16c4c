//! Checks a host applies before signing a proposed contract or revision.

use crate::contract::{Payout, StorageContract, UnlockConditions};
use crate::error::{ContractError, Result};
use crate::revision::StorageContractRevision;
use crate::settings::HostSettings;
use strata_merkle::cached_tree_root;
use strata_types::{
    Amount, Hash, CLIENT_PAYOUT_INDEX, CLIENT_SIGNATURE_INDEX, EXPECTED_PAYOUT_COUNT,
    HOST_PAYOUT_INDEX, HOST_SIGNATURE_INDEX, REVISION_SUBMISSION_BUFFER, SECTOR_SIZE,
};
use tracing::debug;

fn check_payout_counts(valid: usize, missed: usize) -> Result<()> {
    if valid != EXPECTED_PAYOUT_COUNT || missed != EXPECTED_PAYOUT_COUNT {
        return Err(ContractError::BadPayoutCount {
            expected: EXPECTED_PAYOUT_COUNT,
            valid,
            missed,
        });
    }
    Ok(())
}

/// Fields no revision may change, plus the revision number step and deadline.
fn check_revision_frame(
    current: &StorageContractRevision,
    proposed: &StorageContractRevision,
    block_height: u64,
) -> Result<()> {
    check_payout_counts(
        proposed.new_valid_proof_outputs.len(),
        proposed.new_missed_proof_outputs.len(),
    )?;

    if current.new_window_start.saturating_sub(REVISION_SUBMISSION_BUFFER) <= block_height {
        return Err(ContractError::LateRevision {
            block_height,
            window_start: current.new_window_start,
        });
    }

    let host_address = |payouts: &[Payout]| payouts.get(HOST_PAYOUT_INDEX).map(|p| p.address);
    if host_address(&proposed.new_valid_proof_outputs) != host_address(&current.new_valid_proof_outputs)
        || host_address(&proposed.new_missed_proof_outputs)
            != host_address(&current.new_missed_proof_outputs)
    {
        return Err(ContractError::HostPayoutAddressChanged);
    }

    if proposed.parent_id != current.parent_id {
        return Err(ContractError::BadParentId);
    }
    if proposed.unlock_conditions.unlock_hash()? != current.unlock_conditions.unlock_hash()? {
        return Err(ContractError::BadUnlockConditions);
    }
    let expected = current.new_revision_number.saturating_add(1);
    if proposed.new_revision_number != expected {
        return Err(ContractError::BadRevisionNumber {
            expected,
            actual: proposed.new_revision_number,
        });
    }
    if proposed.new_window_start != current.new_window_start {
        return Err(ContractError::BadWindowStart);
    }
    if proposed.new_window_end != current.new_window_end {
        return Err(ContractError::BadWindowEnd);
    }
    if proposed.new_unlock_hash != current.new_unlock_hash {
        return Err(ContractError::BadUnlockHash);
    }
    Ok(())
}

/// Amount moved from the client's valid output to the host's; both sides must move equally.
fn check_transfer(
    current: &StorageContractRevision,
    proposed: &StorageContractRevision,
    expected: Amount,
) -> Result<Amount> {
    let from_client = current
        .client_valid_value()
        .checked_sub(proposed.client_valid_value())
        .ok_or(ContractError::HighClientValidOutput)?;
    if from_client < expected {
        return Err(ContractError::InsufficientPayment {
            expected,
            actual: from_client,
        });
    }
    let to_host = proposed
        .host_valid_value()
        .checked_sub(current.host_valid_value())
        .ok_or(ContractError::LowHostValidOutput)?;
    if to_host != from_client {
        return Err(ContractError::LowHostValidOutput);
    }
    if proposed.client_valid_value() > proposed.client_missed_value() {
        return Err(ContractError::HighClientMissedOutput);
    }
    Ok(from_client)
}

/// Validates a revision proposed for an upload that leaves the file with `new_roots`.
///
/// The client must pay at least `expected_revenue`, and the host may put at most
/// `expected_collateral` of its missed output at risk.
pub fn validate_upload_revision(
    current: &StorageContractRevision,
    proposed: &StorageContractRevision,
    new_roots: &[Hash],
    block_height: u64,
    expected_revenue: Amount,
    expected_collateral: Amount,
) -> Result<()> {
    check_revision_frame(current, proposed, block_height)?;

    let expected_size = new_roots.len() as u64 * SECTOR_SIZE;
    if proposed.new_file_size != expected_size {
        return Err(ContractError::BadFileSize {
            expected: expected_size,
            actual: proposed.new_file_size,
        });
    }
    if proposed.new_file_merkle_root != cached_tree_root(new_roots) {
        return Err(ContractError::BadFileMerkleRoot);
    }

    let paid = check_transfer(current, proposed, expected_revenue)?;

    let collateral = current
        .host_missed_value()
        .checked_sub(proposed.host_missed_value())
        .ok_or(ContractError::HighHostMissedOutput)?;
    if collateral > expected_collateral {
        return Err(ContractError::ExcessiveCollateral {
            allowed: expected_collateral,
            actual: collateral,
        });
    }

    debug!(
        revision = proposed.new_revision_number,
        paid = %paid,
        collateral = %collateral,
        sectors = new_roots.len(),
        "upload revision valid"
    );
    Ok(())
}

/// Validates a revision that pays for a download without touching file content.
pub fn validate_payment_revision(
    current: &StorageContractRevision,
    proposed: &StorageContractRevision,
    block_height: u64,
    expected_transfer: Amount,
) -> Result<()> {
    check_revision_frame(current, proposed, block_height)?;
    let paid = check_transfer(current, proposed, expected_transfer)?;

    if proposed.host_missed_value() != current.host_missed_value() {
        return Err(ContractError::HostMissedOutputChanged);
    }
    if proposed.new_file_size != current.new_file_size {
        return Err(ContractError::BadFileSize {
            expected: current.new_file_size,
            actual: proposed.new_file_size,
        });
    }
    if proposed.new_file_merkle_root != current.new_file_merkle_root {
        return Err(ContractError::BadFileMerkleRoot);
    }

    debug!(
        revision = proposed.new_revision_number,
        paid = %paid,
        "payment revision valid"
    );
    Ok(())
}

/// Host-side checks on a freshly proposed contract before countersigning it.
pub fn validate_new_contract(
    contract: &StorageContract,
    unlock_conditions: &UnlockConditions,
    host: &HostSettings,
    block_height: u64,
) -> Result<()> {
    if contract.file_size != 0 || !contract.file_merkle_root.is_zero() || contract.revision_number != 0
    {
        return Err(ContractError::NonEmptyContract);
    }

    if contract.window_start <= block_height.saturating_add(REVISION_SUBMISSION_BUFFER) {
        return Err(ContractError::WindowTooSoon {
            block_height,
            window_start: contract.window_start,
        });
    }
    let window = contract.window_end.saturating_sub(contract.window_start);
    if window < host.window_size {
        return Err(ContractError::WindowTooShort {
            required: host.window_size,
            actual: window,
        });
    }
    let duration = contract.window_end.saturating_sub(block_height);
    if duration > host.max_duration {
        return Err(ContractError::DurationTooLong {
            max: host.max_duration,
            actual: duration,
        });
    }

    check_payout_counts(
        contract.valid_proof_outputs.len(),
        contract.missed_proof_outputs.len(),
    )?;
    let host_address = host.address();
    let host_valid = &contract.valid_proof_outputs[HOST_PAYOUT_INDEX];
    let host_missed = &contract.missed_proof_outputs[HOST_PAYOUT_INDEX];
    if host_valid.address != host_address
        || host_missed.address != host_address
        || contract.host_collateral.address != host_address
    {
        return Err(ContractError::HostAddressMismatch);
    }
    if contract.valid_proof_outputs[CLIENT_PAYOUT_INDEX] != contract.missed_proof_outputs[CLIENT_PAYOUT_INDEX]
        || host_valid != host_missed
    {
        return Err(ContractError::HighClientMissedOutput);
    }

    let floor = contract
        .host_collateral
        .value
        .checked_add(host.contract_price)
        .ok_or_else(|| ContractError::Overflow("host payout floor".to_string()))?;
    if host_valid.value < floor {
        return Err(ContractError::LowHostPayout {
            payout: host_valid.value,
            contract_price: host.contract_price,
        });
    }
    if contract.host_collateral.value > host.max_deposit {
        return Err(ContractError::ExcessiveCollateral {
            allowed: host.max_deposit,
            actual: contract.host_collateral.value,
        });
    }

    if unlock_conditions.public_keys.len() != 2
        || unlock_conditions.signatures_required != 2
        || unlock_conditions.key(HOST_SIGNATURE_INDEX)? != &host.public_key
        || unlock_conditions.unlock_hash()? != contract.unlock_hash
    {
        return Err(ContractError::BadUnlockConditions);
    }

    contract.verify_signature(CLIENT_SIGNATURE_INDEX, unlock_conditions.key(CLIENT_SIGNATURE_INDEX)?)
}
