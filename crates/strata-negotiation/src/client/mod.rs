//! Client side of every negotiation. The client keeps its own signed copy of each
//! contract's latest revision as its proof of claim.

mod create;
mod download;
mod upload;

pub use download::ReadOutcome;

use crate::capability::{Ledger, WalletProvider};
use crate::config::ClientConfig;
use crate::error::{NegotiationError, Result};
use crate::session::{Session, SessionExt};
use std::collections::HashMap;
use std::sync::Arc;
use strata_contract::{ContractError, ContractId, HostSettings, StorageContract, StorageContractRevision};
use strata_types::{Address, Hash, PublicKey, Signature};
use tokio::sync::RwLock;
use tracing::debug;

/// A contract the client holds, with the latest revision both parties signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContract {
    pub contract_id: ContractId,
    pub contract: StorageContract,
    pub latest_revision: StorageContractRevision,
    pub host_public_key: PublicKey,
}

impl ClientContract {
    /// Replaces the latest revision with its successor. Anything but the next revision
    /// number is refused.
    pub fn accept_revision(&mut self, revision: StorageContractRevision) -> Result<()> {
        let expected = self.latest_revision.new_revision_number.saturating_add(1);
        if revision.new_revision_number != expected {
            return Err(ContractError::BadRevisionNumber {
                expected,
                actual: revision.new_revision_number,
            }
            .into());
        }
        if revision.parent_id != self.contract_id {
            return Err(ContractError::BadParentId.into());
        }
        self.latest_revision = revision;
        Ok(())
    }

    pub fn sector_count(&self) -> u64 {
        self.latest_revision.new_file_size / strata_types::SECTOR_SIZE
    }
}

pub struct StorageClient {
    public_key: PublicKey,
    address: Address,
    config: ClientConfig,
    ledger: Arc<dyn Ledger>,
    wallets: Arc<dyn WalletProvider>,
    contracts: RwLock<HashMap<ContractId, ClientContract>>,
}

impl StorageClient {
    pub fn new(
        public_key: PublicKey,
        config: ClientConfig,
        ledger: Arc<dyn Ledger>,
        wallets: Arc<dyn WalletProvider>,
    ) -> Self {
        Self {
            public_key,
            address: Address::from_public_key(&public_key),
            config,
            ledger,
            wallets,
            contracts: RwLock::new(HashMap::new()),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub async fn contract(&self, id: &ContractId) -> Option<ClientContract> {
        self.contracts.read().await.get(id).cloned()
    }

    pub async fn contract_ids(&self) -> Vec<ContractId> {
        self.contracts.read().await.keys().copied().collect()
    }

    async fn require_contract(&self, id: &ContractId) -> Result<ClientContract> {
        self.contract(id)
            .await
            .ok_or_else(|| NegotiationError::NotFound(id.to_hex()))
    }

    async fn accept_revision(&self, id: &ContractId, revision: StorageContractRevision) -> Result<()> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(id)
            .ok_or_else(|| NegotiationError::NotFound(id.to_hex()))?;
        contract.accept_revision(revision)?;
        debug!(
            contract_id = %id,
            revision = contract.latest_revision.new_revision_number,
            "client revision updated"
        );
        Ok(())
    }

    async fn sign(&self, hash: &Hash) -> Result<Signature> {
        let wallet = self.wallets.find_wallet(&self.address).await?;
        wallet.sign_hash(&self.address, hash).await
    }
}

/// The host's announced terms, which every client negotiation prices against
fn host_settings(session: &dyn Session) -> Result<HostSettings> {
    session.peer().host_settings.clone().ok_or_else(|| {
        NegotiationError::InvalidRequest("peer has not announced host settings".to_string())
    })
}

/// Best-effort notice to the host before giving up on a negotiation
async fn abandon(session: &mut dyn Session, error: NegotiationError) -> NegotiationError {
    if error.should_notify_peer() {
        if let Err(send_err) = session.send_error(&error).await {
            debug!(error = %send_err, "could not report negotiation error to host");
        }
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_contract::{Payout, UnlockConditions};
    use strata_crypto::Keypair;
    use strata_types::Amount;

    fn client_contract() -> ClientContract {
        let client = Keypair::generate();
        let host = Keypair::generate();
        let unlock = UnlockConditions::two_of_two(*client.public_key(), *host.public_key());
        let payout = |k: &Keypair| Payout::new(k.address(), Amount::from_base_units(1_000));
        let contract = StorageContract {
            file_size: 0,
            file_merkle_root: Hash::ZERO,
            window_start: 500,
            window_end: 600,
            client_collateral: payout(&client),
            host_collateral: payout(&host),
            valid_proof_outputs: vec![payout(&client), payout(&host)],
            missed_proof_outputs: vec![payout(&client), payout(&host)],
            unlock_hash: unlock.unlock_hash().unwrap(),
            revision_number: 0,
            signatures: Vec::new(),
        };
        let revision = StorageContractRevision::initial(&contract, unlock).unwrap();
        ClientContract {
            contract_id: contract.id().unwrap(),
            contract,
            latest_revision: revision,
            host_public_key: *host.public_key(),
        }
    }

    #[test]
    fn test_accept_revision_requires_next_number() {
        let mut contract = client_contract();
        let next = contract
            .latest_revision
            .new_download_revision(Amount::from_base_units(10))
            .unwrap();
        contract.accept_revision(next.clone()).unwrap();
        assert_eq!(contract.latest_revision.new_revision_number, 2);

        // the same revision number a second time
        let err = contract.accept_revision(next).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Validation(ContractError::BadRevisionNumber { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_accept_revision_rejects_foreign_parent() {
        let mut contract = client_contract();
        let mut next = contract
            .latest_revision
            .new_download_revision(Amount::from_base_units(10))
            .unwrap();
        next.parent_id = Hash::from_bytes([9u8; 32]);
        assert!(contract.accept_revision(next).is_err());
        assert_eq!(contract.sector_count(), 0);
    }
}
