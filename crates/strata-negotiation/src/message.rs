//! Wire messages exchanged during negotiation and their bincode codec.

use crate::error::{NegotiationError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strata_contract::{ContractId, StorageContract, UnlockConditions};
use strata_types::{Amount, Hash, Signature, SECTOR_SIZE, SEGMENT_SIZE};

/// Numeric type code carried by every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageCode {
    ContractCreateRequest = 0x22,
    ContractCreateHostSign = 0x23,
    ContractCreateClientRevisionSign = 0x24,
    ContractCreateHostRevisionSign = 0x25,

    UploadRequest = 0x26,
    UploadMerkleProof = 0x27,
    UploadClientRevisionSign = 0x28,
    UploadHostRevisionSign = 0x29,

    DownloadRequest = 0x33,
    DownloadResponse = 0x34,

    NegotiationError = 0x40,
    NegotiationStop = 0x41,

    ClientCommitSuccess = 0x50,
    ClientCommitFailed = 0x51,
    ClientNegotiateError = 0x52,
    HostAck = 0x53,
}

impl TryFrom<u8> for MessageCode {
    type Error = NegotiationError;

    fn try_from(value: u8) -> Result<Self> {
        use MessageCode::*;
        let code = match value {
            0x22 => ContractCreateRequest,
            0x23 => ContractCreateHostSign,
            0x24 => ContractCreateClientRevisionSign,
            0x25 => ContractCreateHostRevisionSign,
            0x26 => UploadRequest,
            0x27 => UploadMerkleProof,
            0x28 => UploadClientRevisionSign,
            0x29 => UploadHostRevisionSign,
            0x33 => DownloadRequest,
            0x34 => DownloadResponse,
            0x40 => NegotiationError,
            0x41 => NegotiationStop,
            0x50 => ClientCommitSuccess,
            0x51 => ClientCommitFailed,
            0x52 => ClientNegotiateError,
            0x53 => HostAck,
            other => {
                return Err(self::NegotiationError::Decode(format!(
                    "unknown message code 0x{:02x}",
                    other
                )))
            }
        };
        Ok(code)
    }
}

/// A typed message as it travels over a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub code: MessageCode,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn encode<T: Serialize + ?Sized>(code: MessageCode, payload: &T) -> Result<Self> {
        Ok(Self {
            code,
            payload: bincode::serialize(payload)?,
        })
    }

    /// A message whose code is its whole meaning
    pub fn signal(code: MessageCode) -> Self {
        Self {
            code,
            payload: Vec::new(),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bincode::deserialize(&self.payload).map_err(|e| {
            NegotiationError::Decode(format!("{:?} payload: {}", self.code, e))
        })
    }

    /// Frame as `code || payload`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.payload.len());
        bytes.push(self.code as u8);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (code, payload) = bytes
            .split_first()
            .ok_or_else(|| NegotiationError::Decode("empty frame".to_string()))?;
        Ok(Self {
            code: MessageCode::try_from(*code)?,
            payload: payload.to_vec(),
        })
    }
}

/// Client's opening offer: the contract it signed and the keys that will govern it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCreateRequest {
    pub contract: StorageContract,
    pub unlock_conditions: UnlockConditions,
}

/// Modification applied to a contract's file. Only appends are negotiated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadAction {
    Append { data: Vec<u8> },
}

impl std::fmt::Debug for UploadAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadAction::Append { data } => write!(f, "Append({} bytes)", data.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub contract_id: ContractId,
    pub actions: Vec<UploadAction>,
    pub new_revision_number: u64,
    pub new_valid_proof_values: Vec<Amount>,
    pub new_missed_proof_values: Vec<Amount>,
}

/// Host's evidence for an upload: a diff proof over the old sector roots, the old leaves
/// being proven, and the root the host computed after applying the actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMerkleProof {
    pub old_subtree_hashes: Vec<Hash>,
    pub old_leaf_hashes: Vec<Hash>,
    pub new_merkle_root: Hash,
}

/// Byte range inside one sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSection {
    pub merkle_root: Hash,
    pub offset: u32,
    pub length: u32,
}

impl DownloadSection {
    /// A section must lie inside one sector, and proofs work on whole segments
    pub fn validate(&self, merkle_proof: bool) -> Result<()> {
        let end = u64::from(self.offset) + u64::from(self.length);
        if self.length == 0 || end > SECTOR_SIZE {
            return Err(NegotiationError::InvalidRequest(format!(
                "section [{}, {}) does not fit in one sector",
                self.offset, end
            )));
        }
        if merkle_proof
            && (u64::from(self.offset) % SEGMENT_SIZE != 0 || u64::from(self.length) % SEGMENT_SIZE != 0)
        {
            return Err(NegotiationError::InvalidRequest(format!(
                "section offset {} and length {} must be multiples of {} to be proven",
                self.offset, self.length, SEGMENT_SIZE
            )));
        }
        Ok(())
    }

    /// Segment indices covered, for range proofs
    pub fn segment_range(&self) -> (u64, u64) {
        let start = u64::from(self.offset) / SEGMENT_SIZE;
        let end = (u64::from(self.offset) + u64::from(self.length)).div_ceil(SEGMENT_SIZE);
        (start, end)
    }
}

/// Total bytes, section count and distinct sectors: the inputs to download pricing
pub fn download_shape(sections: &[DownloadSection]) -> (u64, u64, u64) {
    let total: u64 = sections.iter().map(|s| u64::from(s.length)).sum();
    let distinct: HashSet<&Hash> = sections.iter().map(|s| &s.merkle_root).collect();
    (total, sections.len() as u64, distinct.len() as u64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub contract_id: ContractId,
    pub sections: Vec<DownloadSection>,
    pub merkle_proof: bool,
    pub new_revision_number: u64,
    pub new_valid_proof_values: Vec<Amount>,
    pub new_missed_proof_values: Vec<Amount>,
    pub signature: Signature,
}

/// One host response during a download
#[derive(Clone, Serialize, Deserialize)]
pub enum DownloadResponse {
    Data {
        data: Vec<u8>,
        merkle_proof: Vec<Hash>,
    },
    Signature(Signature),
    Both {
        data: Vec<u8>,
        merkle_proof: Vec<Hash>,
        signature: Signature,
    },
}

impl DownloadResponse {
    pub fn data(&self) -> Option<(&[u8], &[Hash])> {
        match self {
            DownloadResponse::Data { data, merkle_proof }
            | DownloadResponse::Both {
                data, merkle_proof, ..
            } => Some((data, merkle_proof)),
            DownloadResponse::Signature(_) => None,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            DownloadResponse::Signature(signature) | DownloadResponse::Both { signature, .. } => {
                Some(signature)
            }
            DownloadResponse::Data { .. } => None,
        }
    }
}

impl std::fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadResponse::Data { data, merkle_proof } => {
                write!(f, "Data({} bytes, {} proof hashes)", data.len(), merkle_proof.len())
            }
            DownloadResponse::Signature(sig) => write!(f, "Signature({:?})", sig),
            DownloadResponse::Both {
                data, merkle_proof, ..
            } => write!(
                f,
                "Both({} bytes, {} proof hashes, signed)",
                data.len(),
                merkle_proof.len()
            ),
        }
    }
}
