use serde::{Deserialize, Serialize};
use strata_types::{Address, Amount, PublicKey};

/// Terms a host announces to prospective clients. All prices are in base units:
/// storage and deposit per byte per block, bandwidth per byte, access per sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    pub public_key: PublicKey,
    pub accepting_contracts: bool,
    pub max_duration: u64,
    pub window_size: u64,
    pub contract_price: Amount,
    pub storage_price: Amount,
    pub upload_bandwidth_price: Amount,
    pub download_bandwidth_price: Amount,
    pub sector_access_price: Amount,
    pub base_rpc_price: Amount,
    pub deposit: Amount,
    pub max_deposit: Amount,
}

impl HostSettings {
    /// Address the host's payouts must go to
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }
}
