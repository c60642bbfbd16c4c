use crate::error::{NegotiationError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_contract::ContractId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Held for the whole of one negotiation on a contract
pub type ResponsibilityGuard = OwnedMutexGuard<()>;

/// Per-contract advisory locks. The registry mutex is only held while looking up or
/// creating an entry, never while waiting on a contract.
#[derive(Default)]
pub struct ResponsibilityLocks {
    registry: Mutex<HashMap<ContractId, Arc<Mutex<()>>>>,
}

impl ResponsibilityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits at most `timeout` for the contract's lock
    pub async fn try_lock(&self, id: &ContractId, timeout: Duration) -> Result<ResponsibilityGuard> {
        let lock = {
            let mut registry = self.registry.lock().await;
            registry.entry(*id).or_default().clone()
        };

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(contract_id = %id, "responsibility locked");
                Ok(guard)
            }
            Err(_) => {
                warn!(contract_id = %id, timeout_ms = timeout.as_millis() as u64, "responsibility busy");
                Err(NegotiationError::ContractBusy(*id))
            }
        }
    }

    /// Drops the registry entry when nobody holds or waits on it
    pub async fn remove_if_idle(&self, id: &ContractId) -> bool {
        let mut registry = self.registry.lock().await;
        let idle = registry
            .get(id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            registry.remove(id);
        }
        idle
    }

    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }
}
