use super::{read_client_commit, StorageHost};
use crate::error::{NegotiationError, Result};
use crate::message::{ContractCreateRequest, MessageCode};
use crate::responsibility::StorageResponsibility;
use crate::session::{Session, SessionExt};
use crate::state::{HostCreateState, StateTracker};
use strata_contract::{validate_new_contract, StorageContractRevision};
use strata_types::{Signature, CLIENT_SIGNATURE_INDEX, HOST_SIGNATURE_INDEX};
use tracing::{error, info};

pub(super) async fn handle(
    host: &StorageHost,
    session: &mut dyn Session,
    request: ContractCreateRequest,
) -> Result<()> {
    let mut tracker = StateTracker::new(HostCreateState::ValidateContract);
    let result = run(host, session, request, &mut tracker).await;
    if result.is_err() {
        tracker.fail(HostCreateState::Failed);
    }
    host.release_lock(tracker.contract_id()).await;
    result
}

async fn run(
    host: &StorageHost,
    session: &mut dyn Session,
    request: ContractCreateRequest,
    tracker: &mut StateTracker<HostCreateState>,
) -> Result<()> {
    let ContractCreateRequest {
        mut contract,
        unlock_conditions,
    } = request;

    let settings = host.host_settings().await;
    if !settings.accepting_contracts {
        return Err(NegotiationError::NotAcceptingContracts);
    }
    let height = host.ledger.block_height().await?;
    validate_new_contract(&contract, &unlock_conditions, &settings, height)?;

    let contract_id = contract.id()?;
    tracker.set_contract(contract_id);

    let contract_signature = host.sign(&contract_id).await?;
    contract.set_signature(HOST_SIGNATURE_INDEX, contract_signature.clone());
    session
        .send_typed(MessageCode::ContractCreateHostSign, &contract_signature)
        .await?;

    tracker.transition_to(HostCreateState::AwaitClientRevisionSignature)?;
    let client_signature: Signature = session
        .read_expected(MessageCode::ContractCreateClientRevisionSign)
        .await?;
    let mut revision = StorageContractRevision::initial(&contract, unlock_conditions)?;
    revision.set_signature(CLIENT_SIGNATURE_INDEX, client_signature);
    revision.verify_signature(CLIENT_SIGNATURE_INDEX)?;

    let revision_signature = host.sign(&revision.signing_hash()?).await?;
    revision.set_signature(HOST_SIGNATURE_INDEX, revision_signature.clone());
    session
        .send_typed(MessageCode::ContractCreateHostRevisionSign, &revision_signature)
        .await?;

    tracker.transition_to(HostCreateState::AwaitClientCommit)?;
    read_client_commit(session).await?;

    tracker.transition_to(HostCreateState::Persist)?;
    let window_start = contract.window_start;
    let _guard = host
        .locks
        .try_lock(&contract_id, host.lock_timeout().await)
        .await?;
    let responsibility = StorageResponsibility::new(
        contract_id,
        contract,
        revision,
        settings.contract_price,
        height,
    );
    host.store.insert(responsibility).await?;

    if let Err(send_err) = session.send_signal(MessageCode::HostAck).await {
        return Err(match host.store.delete(&contract_id).await {
            Ok(()) => send_err,
            Err(delete_err) => {
                error!(
                    contract_id = %contract_id,
                    error = %delete_err,
                    consistency_gap = true,
                    "could not remove responsibility after failed acknowledgement"
                );
                NegotiationError::Rollback(delete_err.to_string())
            }
        });
    }

    tracker.transition_to(HostCreateState::Done)?;
    info!(contract_id = %contract_id, window_start, "contract created");
    Ok(())
}
