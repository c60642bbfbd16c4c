use crate::contract::{ContractId, Payout, StorageContract, UnlockConditions};
use crate::error::{ContractError, Result};
use serde::{Deserialize, Serialize};
use strata_crypto::{hash_encoded, verify_hash_signature};
use strata_types::{
    Amount, Hash, PublicKey, Signature, CLIENT_PAYOUT_INDEX, CLIENT_SIGNATURE_INDEX,
    CONTRACT_REQUIRED_SIGNATURES, EXPECTED_PAYOUT_COUNT, HOST_PAYOUT_INDEX, HOST_SIGNATURE_INDEX,
};

const REVISION_DOMAIN: &str = "strata/revision";

/// Signed replacement of a contract's mutable terms.
///
/// Revisions are built, never edited: each `new_*` constructor returns a fresh, unsigned
/// revision whose number is one above its predecessor's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageContractRevision {
    pub parent_id: ContractId,
    pub unlock_conditions: UnlockConditions,
    pub new_revision_number: u64,
    pub new_file_size: u64,
    pub new_file_merkle_root: Hash,
    pub new_window_start: u64,
    pub new_window_end: u64,
    pub new_valid_proof_outputs: Vec<Payout>,
    pub new_missed_proof_outputs: Vec<Payout>,
    pub new_unlock_hash: Hash,
    pub signatures: Vec<Signature>,
}

fn debit(payouts: &mut [Payout], index: usize, amount: Amount) -> Result<()> {
    let len = payouts.len();
    let payout = payouts.get_mut(index).ok_or(ContractError::BadPayoutCount {
        expected: EXPECTED_PAYOUT_COUNT,
        valid: len,
        missed: len,
    })?;
    payout.value = payout
        .value
        .checked_sub(amount)
        .ok_or(ContractError::InsufficientFunds {
            required: amount,
            available: payout.value,
        })?;
    Ok(())
}

fn credit(payouts: &mut [Payout], index: usize, amount: Amount) -> Result<()> {
    let len = payouts.len();
    let payout = payouts.get_mut(index).ok_or(ContractError::BadPayoutCount {
        expected: EXPECTED_PAYOUT_COUNT,
        valid: len,
        missed: len,
    })?;
    payout.value = payout
        .value
        .checked_add(amount)
        .ok_or_else(|| ContractError::Overflow("payout credit".to_string()))?;
    Ok(())
}

impl StorageContractRevision {
    /// Revision #1, referencing a contract both parties have signed
    pub fn initial(contract: &StorageContract, unlock_conditions: UnlockConditions) -> Result<Self> {
        Ok(Self {
            parent_id: contract.id()?,
            unlock_conditions,
            new_revision_number: 1,
            new_file_size: contract.file_size,
            new_file_merkle_root: contract.file_merkle_root,
            new_window_start: contract.window_start,
            new_window_end: contract.window_end,
            new_valid_proof_outputs: contract.valid_proof_outputs.clone(),
            new_missed_proof_outputs: contract.missed_proof_outputs.clone(),
            new_unlock_hash: contract.unlock_hash,
            signatures: Vec::new(),
        })
    }

    /// Next revision moving `cost` from the client to the host.
    ///
    /// The host's valid output gains `cost`; the client's missed output loses it so the
    /// payment is forfeit whether or not the host later proves storage.
    pub fn new_revision(&self, cost: Amount) -> Result<Self> {
        let mut next = self.clone();
        next.signatures.clear();
        next.new_revision_number = self
            .new_revision_number
            .checked_add(1)
            .ok_or_else(|| ContractError::Overflow("revision number".to_string()))?;
        debit(&mut next.new_valid_proof_outputs, CLIENT_PAYOUT_INDEX, cost)?;
        credit(&mut next.new_valid_proof_outputs, HOST_PAYOUT_INDEX, cost)?;
        debit(&mut next.new_missed_proof_outputs, CLIENT_PAYOUT_INDEX, cost)?;
        Ok(next)
    }

    /// Payment revision for a download
    pub fn new_download_revision(&self, cost: Amount) -> Result<Self> {
        self.new_revision(cost)
    }

    /// Revision after an upload: pays `cost`, puts `collateral` of the host's missed
    /// output at risk, and records the new file size and root.
    pub fn new_upload_revision(
        &self,
        cost: Amount,
        collateral: Amount,
        new_file_size: u64,
        new_file_merkle_root: Hash,
    ) -> Result<Self> {
        let mut next = self.new_revision(cost)?;
        debit(&mut next.new_missed_proof_outputs, HOST_PAYOUT_INDEX, collateral).map_err(
            |e| match e {
                ContractError::InsufficientFunds {
                    required,
                    available,
                } => ContractError::InsufficientCollateral {
                    required,
                    available,
                },
                other => other,
            },
        )?;
        next.new_file_size = new_file_size;
        next.new_file_merkle_root = new_file_merkle_root;
        Ok(next)
    }

    /// Replaces payout values with `valid` and `missed`, keeping addresses
    pub fn with_payout_values(&self, valid: &[Amount], missed: &[Amount]) -> Result<Self> {
        if valid.len() != self.new_valid_proof_outputs.len()
            || missed.len() != self.new_missed_proof_outputs.len()
        {
            return Err(ContractError::BadPayoutCount {
                expected: EXPECTED_PAYOUT_COUNT,
                valid: valid.len(),
                missed: missed.len(),
            });
        }
        let mut next = self.clone();
        for (payout, value) in next.new_valid_proof_outputs.iter_mut().zip(valid) {
            payout.value = *value;
        }
        for (payout, value) in next.new_missed_proof_outputs.iter_mut().zip(missed) {
            payout.value = *value;
        }
        Ok(next)
    }

    pub fn valid_values(&self) -> Vec<Amount> {
        self.new_valid_proof_outputs.iter().map(|p| p.value).collect()
    }

    pub fn missed_values(&self) -> Vec<Amount> {
        self.new_missed_proof_outputs.iter().map(|p| p.value).collect()
    }

    pub fn client_valid_value(&self) -> Amount {
        self.value_at(&self.new_valid_proof_outputs, CLIENT_PAYOUT_INDEX)
    }

    pub fn host_valid_value(&self) -> Amount {
        self.value_at(&self.new_valid_proof_outputs, HOST_PAYOUT_INDEX)
    }

    pub fn client_missed_value(&self) -> Amount {
        self.value_at(&self.new_missed_proof_outputs, CLIENT_PAYOUT_INDEX)
    }

    pub fn host_missed_value(&self) -> Amount {
        self.value_at(&self.new_missed_proof_outputs, HOST_PAYOUT_INDEX)
    }

    fn value_at(&self, payouts: &[Payout], index: usize) -> Amount {
        payouts.get(index).map(|p| p.value).unwrap_or(Amount::ZERO)
    }

    /// Hash both parties sign
    pub fn signing_hash(&self) -> Result<Hash> {
        let mut unsigned = self.clone();
        unsigned.signatures.clear();
        Ok(hash_encoded(REVISION_DOMAIN, &unsigned)?)
    }

    pub fn set_signature(&mut self, index: usize, signature: Signature) {
        if self.signatures.len() <= index {
            self.signatures.resize(index + 1, Signature::empty());
        }
        self.signatures[index] = signature;
    }

    pub fn client_public_key(&self) -> Result<&PublicKey> {
        self.unlock_conditions.key(CLIENT_SIGNATURE_INDEX)
    }

    pub fn host_public_key(&self) -> Result<&PublicKey> {
        self.unlock_conditions.key(HOST_SIGNATURE_INDEX)
    }

    /// Checks the signature in slot `index` against the matching unlock key
    pub fn verify_signature(&self, index: usize) -> Result<()> {
        let key = self.unlock_conditions.key(index)?;
        let signature = self
            .signatures
            .get(index)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ContractError::InvalidSignature(format!("revision signature {} missing", index)))?;
        verify_hash_signature(key, &self.signing_hash()?, signature).map_err(|_| {
            ContractError::InvalidSignature(format!(
                "revision {} signature {} invalid",
                self.new_revision_number, index
            ))
        })
    }

    /// True when both parties' signatures are present and valid
    pub fn is_fully_signed(&self) -> bool {
        self.signatures.len() == CONTRACT_REQUIRED_SIGNATURES
            && (0..CONTRACT_REQUIRED_SIGNATURES).all(|i| self.verify_signature(i).is_ok())
    }

    pub fn to_transaction_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ContractError::Encoding(e.to_string()))
    }
}
