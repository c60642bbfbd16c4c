use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_contract::{ContractId, StorageContract, StorageContractRevision};
use strata_merkle::cached_tree_root;
use strata_types::{Amount, Hash};

/// The host's durable record of one contract: the sectors it holds, every revision it
/// accepted and the money riding on them.
///
/// Negotiations never update a responsibility in place. They clone it, work on the copy and
/// hand the whole copy to the store on commit, keeping the original as the rollback snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageResponsibility {
    pub contract_id: ContractId,
    pub original_contract: StorageContract,
    pub sector_roots: Vec<Hash>,
    pub revisions: Vec<StorageContractRevision>,

    pub contract_cost: Amount,
    pub locked_storage_deposit: Amount,
    pub potential_storage_revenue: Amount,
    pub potential_upload_revenue: Amount,
    pub potential_download_revenue: Amount,
    pub risked_storage_deposit: Amount,

    pub negotiation_height: u64,
    pub created_at: DateTime<Utc>,
}

impl StorageResponsibility {
    /// Record for a freshly finalized contract and its first revision
    pub fn new(
        contract_id: ContractId,
        contract: StorageContract,
        initial_revision: StorageContractRevision,
        contract_cost: Amount,
        negotiation_height: u64,
    ) -> Self {
        let locked_storage_deposit = contract.host_collateral.value;
        Self {
            contract_id,
            original_contract: contract,
            sector_roots: Vec::new(),
            revisions: vec![initial_revision],
            contract_cost,
            locked_storage_deposit,
            potential_storage_revenue: Amount::ZERO,
            potential_upload_revenue: Amount::ZERO,
            potential_download_revenue: Amount::ZERO,
            risked_storage_deposit: Amount::ZERO,
            negotiation_height,
            created_at: Utc::now(),
        }
    }

    pub fn latest_revision(&self) -> Option<&StorageContractRevision> {
        self.revisions.last()
    }

    /// Last block at which the host can still prove storage
    pub fn proof_deadline(&self) -> u64 {
        self.latest_revision()
            .map(|r| r.new_window_end)
            .unwrap_or(self.original_contract.window_end)
    }

    pub fn file_size(&self) -> u64 {
        self.latest_revision()
            .map(|r| r.new_file_size)
            .unwrap_or(self.original_contract.file_size)
    }

    /// Root recomputed from the held sectors; matches the latest revision when consistent
    pub fn merkle_root(&self) -> Hash {
        cached_tree_root(&self.sector_roots)
    }
}

/// Totals over every responsibility a host carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFinancialMetrics {
    pub contract_count: u64,
    pub contract_compensation: Amount,
    pub potential_storage_revenue: Amount,
    pub potential_upload_revenue: Amount,
    pub potential_download_revenue: Amount,
    pub locked_storage_deposit: Amount,
    pub risked_storage_deposit: Amount,
}

impl HostFinancialMetrics {
    pub fn accumulate(&mut self, responsibility: &StorageResponsibility) {
        self.contract_count += 1;
        self.contract_compensation = self
            .contract_compensation
            .saturating_add(responsibility.contract_cost);
        self.potential_storage_revenue = self
            .potential_storage_revenue
            .saturating_add(responsibility.potential_storage_revenue);
        self.potential_upload_revenue = self
            .potential_upload_revenue
            .saturating_add(responsibility.potential_upload_revenue);
        self.potential_download_revenue = self
            .potential_download_revenue
            .saturating_add(responsibility.potential_download_revenue);
        self.locked_storage_deposit = self
            .locked_storage_deposit
            .saturating_add(responsibility.locked_storage_deposit);
        self.risked_storage_deposit = self
            .risked_storage_deposit
            .saturating_add(responsibility.risked_storage_deposit);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use strata_contract::{Payout, UnlockConditions};
    use strata_crypto::Keypair;

    pub fn sample_responsibility(client: &Keypair, host: &Keypair) -> StorageResponsibility {
        let unlock = UnlockConditions::two_of_two(*client.public_key(), *host.public_key());
        let client_payout = Payout::new(client.address(), Amount::from_base_units(1_000_000));
        let host_payout = Payout::new(host.address(), Amount::from_base_units(500_000));
        let contract = StorageContract {
            file_size: 0,
            file_merkle_root: Hash::ZERO,
            window_start: 1_000,
            window_end: 1_200,
            client_collateral: client_payout.clone(),
            host_collateral: Payout::new(host.address(), Amount::from_base_units(400_000)),
            valid_proof_outputs: vec![client_payout.clone(), host_payout.clone()],
            missed_proof_outputs: vec![client_payout, host_payout],
            unlock_hash: unlock.unlock_hash().unwrap(),
            revision_number: 0,
            signatures: Vec::new(),
        };
        let revision = StorageContractRevision::initial(&contract, unlock).unwrap();
        StorageResponsibility::new(
            contract.id().unwrap(),
            contract,
            revision,
            Amount::from_base_units(100),
            10,
        )
    }
}
