//! Host side of every negotiation, plus the read-only status surface.

mod create;
mod download;
mod upload;

use crate::capability::{Ledger, ResponsibilityStore, WalletProvider};
use crate::config::HostConfig;
use crate::error::{ErrorKind, NegotiationError, Result};
use crate::lock::ResponsibilityLocks;
use crate::message::{Message, MessageCode};
use crate::responsibility::{HostFinancialMetrics, StorageResponsibility};
use crate::session::{expect_code, Session, SessionExt};
use std::sync::Arc;
use strata_contract::{ContractId, HostSettings};
use strata_types::{Address, Hash, PublicKey, Signature};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

pub struct StorageHost {
    public_key: PublicKey,
    address: Address,
    config: RwLock<HostConfig>,
    ledger: Arc<dyn Ledger>,
    wallets: Arc<dyn WalletProvider>,
    store: Arc<dyn ResponsibilityStore>,
    locks: ResponsibilityLocks,
}

impl StorageHost {
    pub fn new(
        public_key: PublicKey,
        config: HostConfig,
        ledger: Arc<dyn Ledger>,
        wallets: Arc<dyn WalletProvider>,
        store: Arc<dyn ResponsibilityStore>,
    ) -> Self {
        Self {
            public_key,
            address: Address::from_public_key(&public_key),
            config: RwLock::new(config),
            ledger,
            wallets,
            store,
            locks: ResponsibilityLocks::new(),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Terms announced to clients
    pub async fn host_settings(&self) -> HostSettings {
        self.config.read().await.settings(self.public_key)
    }

    pub async fn set_accepting_contracts(&self, accepting: bool) {
        self.config.write().await.accepting_contracts = accepting;
        debug!(accepting, "host accepting contracts changed");
    }

    pub async fn responsibility(&self, id: &ContractId) -> Result<StorageResponsibility> {
        self.store.get(id).await
    }

    /// Contracts with a lock entry, held or not
    pub async fn active_locks(&self) -> usize {
        self.locks.len().await
    }

    pub async fn responsibility_ids(&self) -> Result<Vec<ContractId>> {
        self.store.ids().await
    }

    pub async fn financial_metrics(&self) -> Result<HostFinancialMetrics> {
        let mut metrics = HostFinancialMetrics::default();
        for id in self.store.ids().await? {
            match self.store.get(&id).await {
                Ok(responsibility) => metrics.accumulate(&responsibility),
                // deleted between listing and reading
                Err(NegotiationError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(metrics)
    }

    /// Serves negotiations on `session` until the peer closes it. Failures that leave the
    /// session unusable end the loop; the rest are reported to the peer and serving goes on.
    pub async fn serve(&self, session: &mut dyn Session) -> Result<()> {
        loop {
            let message = match session.read_message().await {
                Ok(message) => message,
                Err(NegotiationError::SessionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            if let Err(e) = self.handle_message(session, message).await {
                let session_broken = matches!(
                    e,
                    NegotiationError::SessionClosed | NegotiationError::Timeout
                );
                if session_broken || matches!(e.kind(), ErrorKind::Decode | ErrorKind::Rollback) {
                    return Err(e);
                }
            }
        }
    }

    /// Runs the single negotiation opened by the next message on `session`
    pub async fn handle_session(&self, session: &mut dyn Session) -> Result<()> {
        let message = session.read_message().await?;
        self.handle_message(session, message).await
    }

    async fn handle_message(&self, session: &mut dyn Session, message: Message) -> Result<()> {
        let result = match message.code {
            MessageCode::ContractCreateRequest => match message.decode() {
                Ok(request) => create::handle(self, session, request).await,
                Err(e) => Err(e),
            },
            MessageCode::UploadRequest => match message.decode() {
                Ok(request) => upload::handle(self, session, request).await,
                Err(e) => Err(e),
            },
            MessageCode::DownloadRequest => match message.decode() {
                Ok(request) => download::handle(self, session, request).await,
                Err(e) => Err(e),
            },
            MessageCode::NegotiationStop | MessageCode::NegotiationError => {
                // a stop or error that crossed the end of the previous negotiation
                debug!(code = ?message.code, "discarding stale control message");
                Ok(())
            }
            other => Err(NegotiationError::Decode(format!(
                "{:?} cannot open a negotiation",
                other
            ))),
        };

        if let Err(e) = &result {
            warn!(peer = %session.peer().public_key, error = %e, "negotiation aborted");
            if e.should_notify_peer() {
                if let Err(send_err) = session.send_error(e).await {
                    debug!(error = %send_err, "could not report negotiation error to peer");
                }
            }
        }
        result
    }

    async fn sign(&self, hash: &Hash) -> Result<Signature> {
        let wallet = self.wallets.find_wallet(&self.address).await?;
        wallet.sign_hash(&self.address, hash).await
    }

    async fn lock_timeout(&self) -> std::time::Duration {
        self.config.read().await.lock_timeout()
    }

    /// Drops the contract's lock entry once its negotiation has released it
    async fn release_lock(&self, contract_id: Option<ContractId>) {
        if let Some(id) = contract_id {
            self.locks.remove_if_idle(&id).await;
        }
    }

    /// Restores `snapshot` after a failed commit. A failure here leaves the store out of step
    /// with what the client believes, so it is reported as a rollback error.
    async fn rollback(
        &self,
        snapshot: StorageResponsibility,
        gained: &[Hash],
        cause: NegotiationError,
    ) -> NegotiationError {
        let contract_id = snapshot.contract_id;
        match self.store.rollback(snapshot, gained).await {
            Ok(()) => {
                warn!(contract_id = %contract_id, error = %cause, "negotiation rolled back");
                cause
            }
            Err(rollback_err) => {
                error!(
                    contract_id = %contract_id,
                    error = %cause,
                    rollback_error = %rollback_err,
                    consistency_gap = true,
                    "rollback failed"
                );
                NegotiationError::Rollback(format!("{} (after: {})", rollback_err, cause))
            }
        }
    }
}

/// Waits for the client's verdict on committing the revision both sides signed
async fn read_client_commit(session: &mut dyn Session) -> Result<()> {
    let message = session.read_message().await?;
    match message.code {
        MessageCode::ClientCommitSuccess => Ok(()),
        MessageCode::ClientCommitFailed => Err(NegotiationError::ClientCommitFailed),
        MessageCode::ClientNegotiateError => Err(NegotiationError::PeerNegotiation(
            "client could not finish the negotiation".to_string(),
        )),
        _ => expect_code(&message, MessageCode::ClientCommitSuccess),
    }
}
