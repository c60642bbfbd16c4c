//! In-memory collaborators for tests and single-process setups.

use crate::capability::{Ledger, ResponsibilityStore, Wallet, WalletProvider};
use crate::error::{NegotiationError, Result};
use crate::responsibility::StorageResponsibility;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use strata_contract::ContractId;
use strata_crypto::Keypair;
use strata_types::{Address, Hash, Signature};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Ledger that records submitted transactions and reports a settable height
pub struct MemoryLedger {
    height: AtomicU64,
    transactions: RwLock<Vec<Vec<u8>>>,
    reject_submissions: AtomicBool,
}

impl MemoryLedger {
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            transactions: RwLock::new(Vec::new()),
            reject_submissions: AtomicBool::new(false),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }

    pub async fn transactions(&self) -> Vec<Vec<u8>> {
        self.transactions.read().await.clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit_transaction(&self, signed_bytes: Vec<u8>) -> Result<()> {
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(NegotiationError::Ledger("transaction rejected".to_string()));
        }
        debug!(bytes = signed_bytes.len(), "transaction submitted");
        self.transactions.write().await.push(signed_bytes);
        Ok(())
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }
}

/// Wallet holding a single keypair
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    async fn sign_hash(&self, account: &Address, hash: &Hash) -> Result<Signature> {
        if *account != self.keypair.address() {
            return Err(NegotiationError::Wallet(format!(
                "wallet does not hold account {}",
                account
            )));
        }
        Ok(self.keypair.sign_hash(hash))
    }
}

#[derive(Default)]
pub struct MemoryWalletProvider {
    wallets: RwLock<HashMap<Address, Arc<dyn Wallet>>>,
}

impl MemoryWalletProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_keypair(&self, keypair: Keypair) -> Address {
        let wallet = KeypairWallet::new(keypair);
        let address = wallet.address();
        self.wallets.write().await.insert(address, Arc::new(wallet));
        address
    }
}

#[async_trait]
impl WalletProvider for MemoryWalletProvider {
    async fn find_wallet(&self, address: &Address) -> Result<Arc<dyn Wallet>> {
        self.wallets
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| NegotiationError::Wallet(format!("no wallet for {}", address)))
    }
}

struct StoredSector {
    data: Vec<u8>,
    references: u64,
}

/// Responsibility table plus reference-counted sector data
#[derive(Default)]
pub struct MemoryResponsibilityStore {
    responsibilities: RwLock<HashMap<ContractId, StorageResponsibility>>,
    sectors: RwLock<HashMap<Hash, StoredSector>>,
    fail_modifications: AtomicBool,
}

impl MemoryResponsibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `modify` fail, rollbacks included
    pub fn set_fail_modifications(&self, fail: bool) {
        self.fail_modifications.store(fail, Ordering::SeqCst);
    }

    pub async fn sector_count(&self) -> usize {
        self.sectors.read().await.len()
    }

    pub async fn has_sector(&self, root: &Hash) -> bool {
        self.sectors.read().await.contains_key(root)
    }
}

#[async_trait]
impl ResponsibilityStore for MemoryResponsibilityStore {
    async fn get(&self, id: &ContractId) -> Result<StorageResponsibility> {
        self.responsibilities
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| NegotiationError::NotFound(id.to_hex()))
    }

    async fn insert(&self, responsibility: StorageResponsibility) -> Result<()> {
        let mut table = self.responsibilities.write().await;
        if table.contains_key(&responsibility.contract_id) {
            return Err(NegotiationError::Store(format!(
                "responsibility {} already exists",
                responsibility.contract_id
            )));
        }
        info!(contract_id = %responsibility.contract_id, "responsibility inserted");
        table.insert(responsibility.contract_id, responsibility);
        Ok(())
    }

    async fn modify(
        &self,
        responsibility: StorageResponsibility,
        removed: &[Hash],
        gained: &[Hash],
        gained_data: Vec<Vec<u8>>,
    ) -> Result<()> {
        if self.fail_modifications.load(Ordering::SeqCst) {
            return Err(NegotiationError::Store("modification failed".to_string()));
        }
        if gained.len() != gained_data.len() {
            return Err(NegotiationError::Store(format!(
                "{} gained sectors with {} data blocks",
                gained.len(),
                gained_data.len()
            )));
        }

        let mut table = self.responsibilities.write().await;
        if !table.contains_key(&responsibility.contract_id) {
            return Err(NegotiationError::NotFound(responsibility.contract_id.to_hex()));
        }

        let mut sectors = self.sectors.write().await;
        for root in removed {
            if let Some(sector) = sectors.get_mut(root) {
                sector.references = sector.references.saturating_sub(1);
                if sector.references == 0 {
                    sectors.remove(root);
                }
            }
        }
        for (root, data) in gained.iter().zip(gained_data) {
            sectors
                .entry(*root)
                .or_insert(StoredSector {
                    data,
                    references: 0,
                })
                .references += 1;
        }

        debug!(
            contract_id = %responsibility.contract_id,
            removed = removed.len(),
            gained = gained.len(),
            "responsibility modified"
        );
        table.insert(responsibility.contract_id, responsibility);
        Ok(())
    }

    async fn delete(&self, id: &ContractId) -> Result<()> {
        let removed = self
            .responsibilities
            .write()
            .await
            .remove(id)
            .ok_or_else(|| NegotiationError::NotFound(id.to_hex()))?;

        let mut sectors = self.sectors.write().await;
        for root in &removed.sector_roots {
            if let Some(sector) = sectors.get_mut(root) {
                sector.references = sector.references.saturating_sub(1);
                if sector.references == 0 {
                    sectors.remove(root);
                }
            }
        }
        info!(contract_id = %id, "responsibility deleted");
        Ok(())
    }

    async fn read_sector(&self, root: &Hash) -> Result<Vec<u8>> {
        self.sectors
            .read()
            .await
            .get(root)
            .map(|s| s.data.clone())
            .ok_or_else(|| NegotiationError::NotFound(format!("sector {}", root)))
    }

    async fn ids(&self) -> Result<Vec<ContractId>> {
        Ok(self.responsibilities.read().await.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responsibility::test_support::sample_responsibility;
    use strata_crypto::verify_hash_signature;

    #[tokio::test]
    async fn test_ledger_records_and_rejects() {
        let ledger = MemoryLedger::new(5);
        ledger.submit_transaction(vec![1, 2]).await.unwrap();
        ledger.set_height(9);
        assert_eq!(ledger.block_height().await.unwrap(), 9);

        ledger.set_reject_submissions(true);
        assert!(ledger.submit_transaction(vec![3]).await.is_err());
        assert_eq!(ledger.transactions().await, vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_wallet_signs_only_own_account() {
        let keypair = Keypair::generate();
        let public_key = *keypair.public_key();
        let provider = MemoryWalletProvider::new();
        let address = provider.add_keypair(keypair).await;

        let wallet = provider.find_wallet(&address).await.unwrap();
        let hash = Hash::from_bytes([4u8; 32]);
        let signature = wallet.sign_hash(&address, &hash).await.unwrap();
        assert!(verify_hash_signature(&public_key, &hash, &signature).is_ok());

        let stranger = Keypair::generate().address();
        assert!(wallet.sign_hash(&stranger, &hash).await.is_err());
        assert!(provider.find_wallet(&stranger).await.is_err());
    }

    #[tokio::test]
    async fn test_modify_and_rollback_restore_snapshot() {
        let store = MemoryResponsibilityStore::new();
        let snapshot = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        let id = snapshot.contract_id;
        store.insert(snapshot.clone()).await.unwrap();
        assert!(store.insert(snapshot.clone()).await.is_err());

        let root = Hash::from_bytes([8u8; 32]);
        let mut updated = snapshot.clone();
        updated.sector_roots.push(root);
        store
            .modify(updated.clone(), &[], &[root], vec![vec![1, 2, 3]])
            .await
            .unwrap();
        assert_eq!(store.get(&id).await.unwrap(), updated);
        assert_eq!(store.read_sector(&root).await.unwrap(), vec![1, 2, 3]);

        store.rollback(snapshot.clone(), &[root]).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), snapshot);
        assert!(!store.has_sector(&root).await);
    }

    #[tokio::test]
    async fn test_shared_sector_survives_single_release() {
        let store = MemoryResponsibilityStore::new();
        let r = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        store.insert(r.clone()).await.unwrap();

        let root = Hash::from_bytes([1u8; 32]);
        store
            .modify(r.clone(), &[], &[root, root], vec![vec![0], vec![0]])
            .await
            .unwrap();
        store.modify(r.clone(), &[root], &[], vec![]).await.unwrap();
        assert!(store.has_sector(&root).await);
        store.modify(r, &[root], &[], vec![]).await.unwrap();
        assert_eq!(store.sector_count().await, 0);
    }

    #[tokio::test]
    async fn test_modify_unknown_and_mismatched() {
        let store = MemoryResponsibilityStore::new();
        let r = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        let err = store.modify(r.clone(), &[], &[], vec![]).await.unwrap_err();
        assert!(matches!(err, NegotiationError::NotFound(_)));

        store.insert(r.clone()).await.unwrap();
        let err = store
            .modify(r.clone(), &[], &[Hash::ZERO], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::Store(_)));

        store.set_fail_modifications(true);
        assert!(store.modify(r, &[], &[], vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_releases_sectors() {
        let store = MemoryResponsibilityStore::new();
        let mut r = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        store.insert(r.clone()).await.unwrap();
        let root = Hash::from_bytes([2u8; 32]);
        r.sector_roots.push(root);
        store.modify(r.clone(), &[], &[root], vec![vec![9]]).await.unwrap();

        store.delete(&r.contract_id).await.unwrap();
        assert!(store.ids().await.unwrap().is_empty());
        assert_eq!(store.sector_count().await, 0);
        assert!(store.delete(&r.contract_id).await.is_err());
    }
}
