//! Contract & revision model for storage agreements.
//!
//! Pure value types and computations with no I/O: a [`StorageContract`] is created once and
//! signed by both parties; every later change is a new [`StorageContractRevision`] with a
//! revision number exactly one above its predecessor.

pub mod contract;
pub mod error;
pub mod pricing;
pub mod revision;
pub mod settings;
pub mod validation;

#[cfg(test)]
mod test_helpers;

pub use contract::{ContractId, Payout, StorageContract, UnlockConditions};
pub use error::{ContractError, Result};
pub use pricing::{
    estimate_download_bandwidth, estimate_download_cost, estimate_upload_cost,
    renter_payouts_pre_tax, worst_case_proof_hashes, PayoutSplit, PayoutTerms, UploadCost,
};
pub use revision::StorageContractRevision;
pub use settings::HostSettings;
pub use validation::{validate_new_contract, validate_payment_revision, validate_upload_revision};
