use super::{abandon, host_settings, ClientContract, StorageClient};
use crate::error::{NegotiationError, Result};
use crate::message::{ContractCreateRequest, MessageCode};
use crate::session::{Session, SessionExt};
use crate::state::{CreateState, StateTracker};
use strata_contract::{
    renter_payouts_pre_tax, ContractId, Payout, PayoutTerms, StorageContract,
    StorageContractRevision, UnlockConditions,
};
use strata_types::{Address, Amount, Hash, Signature, CLIENT_SIGNATURE_INDEX, HOST_SIGNATURE_INDEX};
use tracing::{info, warn};

impl StorageClient {
    /// Negotiates and submits a new, empty contract with the host on `session`, funded
    /// with `funding` and lasting `period` blocks (the configured default when `None`).
    pub async fn create_contract(
        &self,
        session: &mut dyn Session,
        funding: Amount,
        period: Option<u64>,
    ) -> Result<ContractId> {
        let mut tracker = StateTracker::new(CreateState::BuildOffer);
        match self.run_create(session, funding, period, &mut tracker).await {
            Ok(id) => Ok(id),
            Err(e) => {
                // before the offer the host knows nothing; after submission it was told
                // through the commit handshake
                let skip_notice = matches!(
                    tracker.state(),
                    CreateState::BuildOffer | CreateState::SubmitTransaction
                );
                tracker.fail(CreateState::Failed);
                warn!(error = %e, "contract creation aborted");
                if skip_notice {
                    Err(e)
                } else {
                    Err(abandon(session, e).await)
                }
            }
        }
    }

    async fn run_create(
        &self,
        session: &mut dyn Session,
        funding: Amount,
        period: Option<u64>,
        tracker: &mut StateTracker<CreateState>,
    ) -> Result<ContractId> {
        let settings = host_settings(session)?;
        let host_key = session.peer().public_key;
        if host_key != settings.public_key {
            return Err(NegotiationError::InvalidRequest(
                "announced settings belong to another host".to_string(),
            ));
        }
        let period = period.unwrap_or(self.config.default_period);
        let height = self.ledger.block_height().await?;
        let window_start = height.checked_add(period).ok_or_else(|| {
            NegotiationError::InvalidRequest(format!(
                "period {} overflows the block height {}",
                period, height
            ))
        })?;
        let window_end = window_start.checked_add(settings.window_size).ok_or_else(|| {
            NegotiationError::InvalidRequest(format!(
                "host window size {} overflows window start {}",
                settings.window_size, window_start
            ))
        })?;

        let terms = PayoutTerms {
            funding,
            tx_fee: self.config.tx_fee,
            base_price: Amount::ZERO,
            base_collateral: self.config.base_collateral,
            period,
            expected_storage: self.config.expected_storage,
        };
        let split = renter_payouts_pre_tax(&settings, &terms)?;

        let unlock_conditions = UnlockConditions::two_of_two(self.public_key, host_key);
        let host_address = Address::from_public_key(&host_key);
        let payouts = vec![
            Payout::new(self.address, split.client_payout),
            Payout::new(host_address, split.host_payout),
        ];
        let mut contract = StorageContract {
            file_size: 0,
            file_merkle_root: Hash::ZERO,
            window_start,
            window_end,
            client_collateral: Payout::new(self.address, split.client_payout),
            host_collateral: Payout::new(host_address, split.host_collateral),
            valid_proof_outputs: payouts.clone(),
            missed_proof_outputs: payouts,
            unlock_hash: unlock_conditions.unlock_hash()?,
            revision_number: 0,
            signatures: Vec::new(),
        };
        let contract_id = contract.id()?;
        tracker.set_contract(contract_id);
        contract.set_signature(CLIENT_SIGNATURE_INDEX, self.sign(&contract_id).await?);

        session
            .send_typed(
                MessageCode::ContractCreateRequest,
                &ContractCreateRequest {
                    contract: contract.clone(),
                    unlock_conditions: unlock_conditions.clone(),
                },
            )
            .await?;

        tracker.transition_to(CreateState::AwaitHostContractSignature)?;
        let host_signature: Signature = session
            .read_expected(MessageCode::ContractCreateHostSign)
            .await?;
        contract.set_signature(HOST_SIGNATURE_INDEX, host_signature);
        contract.verify_signature(HOST_SIGNATURE_INDEX, &host_key)?;

        tracker.transition_to(CreateState::BuildInitialRevision)?;
        let mut revision = StorageContractRevision::initial(&contract, unlock_conditions)?;
        let revision_signature = self.sign(&revision.signing_hash()?).await?;
        revision.set_signature(CLIENT_SIGNATURE_INDEX, revision_signature.clone());
        session
            .send_typed(
                MessageCode::ContractCreateClientRevisionSign,
                &revision_signature,
            )
            .await?;

        tracker.transition_to(CreateState::AwaitHostRevisionSignature)?;
        let host_revision_signature: Signature = session
            .read_expected(MessageCode::ContractCreateHostRevisionSign)
            .await?;
        revision.set_signature(HOST_SIGNATURE_INDEX, host_revision_signature);
        revision.verify_signature(HOST_SIGNATURE_INDEX)?;

        tracker.transition_to(CreateState::SubmitTransaction)?;
        let submitted = match contract.to_transaction_bytes() {
            Ok(bytes) => self.ledger.submit_transaction(bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = submitted {
            session.send_signal(MessageCode::ClientCommitFailed).await?;
            return Err(e);
        }
        session.send_signal(MessageCode::ClientCommitSuccess).await?;

        tracker.transition_to(CreateState::AwaitHostAck)?;
        session.read_signal(MessageCode::HostAck).await?;

        self.contracts.write().await.insert(
            contract_id,
            ClientContract {
                contract_id,
                contract,
                latest_revision: revision,
                host_public_key: host_key,
            },
        );
        tracker.transition_to(CreateState::Done)?;
        info!(
            contract_id = %contract_id,
            host = %host_key,
            window_start,
            funding = %funding,
            "contract formed"
        );
        Ok(contract_id)
    }
}
