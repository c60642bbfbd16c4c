use strata_types::Amount;
use thiserror::Error;

/// Contract construction and revision validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Expected {expected} valid and missed outputs, got {valid} valid and {missed} missed")]
    BadPayoutCount {
        expected: usize,
        valid: usize,
        missed: usize,
    },

    #[error("Revision submitted too late: block height {block_height}, window starts at {window_start}")]
    LateRevision { block_height: u64, window_start: u64 },

    #[error("Host payout address changed")]
    HostPayoutAddressChanged,

    #[error("Revision parent id does not match the contract")]
    BadParentId,

    #[error("Revision unlock conditions do not match the contract")]
    BadUnlockConditions,

    #[error("Bad revision number: expected {expected}, got {actual}")]
    BadRevisionNumber { expected: u64, actual: u64 },

    #[error("Bad file size: expected {expected}, got {actual}")]
    BadFileSize { expected: u64, actual: u64 },

    #[error("File Merkle root does not match the sector roots")]
    BadFileMerkleRoot,

    #[error("Revision changed the window start")]
    BadWindowStart,

    #[error("Revision changed the window end")]
    BadWindowEnd,

    #[error("Revision changed the unlock hash")]
    BadUnlockHash,

    #[error("Client increased its valid proof output")]
    HighClientValidOutput,

    #[error("Insufficient payment: expected at least {expected}, got {actual}")]
    InsufficientPayment { expected: Amount, actual: Amount },

    #[error("Host valid output did not grow by the amount the client paid")]
    LowHostValidOutput,

    #[error("Client valid output exceeds its missed output")]
    HighClientMissedOutput,

    #[error("Host missed output increased")]
    HighHostMissedOutput,

    #[error("Host missed output changed during a payment revision")]
    HostMissedOutputChanged,

    #[error("Excessive collateral: at most {allowed}, got {actual}")]
    ExcessiveCollateral { allowed: Amount, actual: Amount },

    #[error("Insufficient funding: {funding} does not exceed required {required}")]
    InsufficientFunding { funding: Amount, required: Amount },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral { required: Amount, available: Amount },

    #[error("Proof window starts at {window_start}, too soon for block height {block_height}")]
    WindowTooSoon { block_height: u64, window_start: u64 },

    #[error("Proof window of {actual} blocks is shorter than the required {required}")]
    WindowTooShort { required: u64, actual: u64 },

    #[error("Contract duration of {actual} blocks exceeds the maximum {max}")]
    DurationTooLong { max: u64, actual: u64 },

    #[error("New contracts must start empty at revision 0")]
    NonEmptyContract,

    #[error("Host payouts do not go to the host's address")]
    HostAddressMismatch,

    #[error("Host payout {payout} does not cover the contract price {contract_price}")]
    LowHostPayout { payout: Amount, contract_price: Amount },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<strata_crypto::CryptoError> for ContractError {
    fn from(err: strata_crypto::CryptoError) -> Self {
        match err {
            strata_crypto::CryptoError::Encoding(e) => ContractError::Encoding(e),
            other => ContractError::InvalidSignature(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContractError>;
