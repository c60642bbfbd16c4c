//! Narrow interfaces to the collaborators a negotiation depends on. Each concern gets its
//! own trait so tests can replace one without faking the others.

use crate::error::Result;
use crate::responsibility::StorageResponsibility;
use async_trait::async_trait;
use std::sync::Arc;
use strata_contract::ContractId;
use strata_types::{Address, Hash, Signature};

/// The chain the contracts settle on
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn submit_transaction(&self, signed_bytes: Vec<u8>) -> Result<()>;

    async fn block_height(&self) -> Result<u64>;
}

#[async_trait]
pub trait Wallet: Send + Sync {
    async fn sign_hash(&self, account: &Address, hash: &Hash) -> Result<Signature>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn find_wallet(&self, address: &Address) -> Result<Arc<dyn Wallet>>;
}

/// Durable storage for responsibilities and the sector data they reference
#[async_trait]
pub trait ResponsibilityStore: Send + Sync {
    /// Fails with `NotFound` for an unknown contract
    async fn get(&self, id: &ContractId) -> Result<StorageResponsibility>;

    async fn insert(&self, responsibility: StorageResponsibility) -> Result<()>;

    /// Replaces the stored responsibility, releases `removed` sectors and stores `gained`
    /// sectors with their data in one step
    async fn modify(
        &self,
        responsibility: StorageResponsibility,
        removed: &[Hash],
        gained: &[Hash],
        gained_data: Vec<Vec<u8>>,
    ) -> Result<()>;

    async fn delete(&self, id: &ContractId) -> Result<()>;

    async fn read_sector(&self, root: &Hash) -> Result<Vec<u8>>;

    async fn ids(&self) -> Result<Vec<ContractId>>;

    /// Restores `snapshot` and releases the sectors a failed negotiation stored
    async fn rollback(&self, snapshot: StorageResponsibility, gained: &[Hash]) -> Result<()> {
        self.modify(snapshot, gained, &[], Vec::new()).await
    }
}
