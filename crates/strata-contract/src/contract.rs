use crate::error::{ContractError, Result};
use serde::{Deserialize, Serialize};
use strata_crypto::{hash_encoded, verify_hash_signature};
use strata_types::{
    Address, Amount, Hash, PublicKey, Signature, CLIENT_PAYOUT_INDEX, CONTRACT_REQUIRED_SIGNATURES,
    HOST_PAYOUT_INDEX,
};

pub type ContractId = Hash;

const CONTRACT_DOMAIN: &str = "strata/contract";
const UNLOCK_DOMAIN: &str = "strata/unlock-conditions";

/// A payout destination and amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub address: Address,
    pub value: Amount,
}

impl Payout {
    pub fn new(address: Address, value: Amount) -> Self {
        Self { address, value }
    }
}

/// Multisignature conditions both parties must satisfy to revise a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConditions {
    pub public_keys: Vec<PublicKey>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// Client key first, host key second, both signatures required
    pub fn two_of_two(client: PublicKey, host: PublicKey) -> Self {
        Self {
            public_keys: vec![client, host],
            signatures_required: CONTRACT_REQUIRED_SIGNATURES as u64,
        }
    }

    pub fn unlock_hash(&self) -> Result<Hash> {
        Ok(hash_encoded(UNLOCK_DOMAIN, self)?)
    }

    pub fn key(&self, index: usize) -> Result<&PublicKey> {
        self.public_keys.get(index).ok_or(ContractError::BadUnlockConditions)
    }
}

/// Economic and integrity commitment between a client and a host.
///
/// The contract id doubles as the hash both parties sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageContract {
    pub file_size: u64,
    pub file_merkle_root: Hash,
    pub window_start: u64,
    pub window_end: u64,
    pub client_collateral: Payout,
    pub host_collateral: Payout,
    pub valid_proof_outputs: Vec<Payout>,
    pub missed_proof_outputs: Vec<Payout>,
    pub unlock_hash: Hash,
    pub revision_number: u64,
    pub signatures: Vec<Signature>,
}

impl StorageContract {
    /// Hash of the contract with its signatures removed
    pub fn id(&self) -> Result<ContractId> {
        let mut unsigned = self.clone();
        unsigned.signatures.clear();
        Ok(hash_encoded(CONTRACT_DOMAIN, &unsigned)?)
    }

    pub fn client_valid_payout(&self) -> Option<&Payout> {
        self.valid_proof_outputs.get(CLIENT_PAYOUT_INDEX)
    }

    pub fn host_valid_payout(&self) -> Option<&Payout> {
        self.valid_proof_outputs.get(HOST_PAYOUT_INDEX)
    }

    /// Stores `signature` in slot `index`, growing the list with empty slots as needed
    pub fn set_signature(&mut self, index: usize, signature: Signature) {
        if self.signatures.len() <= index {
            self.signatures.resize(index + 1, Signature::empty());
        }
        self.signatures[index] = signature;
    }

    pub fn verify_signature(&self, index: usize, key: &PublicKey) -> Result<()> {
        let signature = self
            .signatures
            .get(index)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ContractError::InvalidSignature(format!("contract signature {} missing", index)))?;
        verify_hash_signature(key, &self.id()?, signature)
            .map_err(|_| ContractError::InvalidSignature(format!("contract signature {} invalid", index)))
    }

    /// True once both parties have signed
    pub fn is_finalized(&self) -> bool {
        self.signatures.len() == CONTRACT_REQUIRED_SIGNATURES
            && self.signatures.iter().all(|s| !s.is_empty())
    }

    /// Bytes submitted to the ledger as the contract-creation transaction
    pub fn to_transaction_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ContractError::Encoding(e.to_string()))
    }
}
