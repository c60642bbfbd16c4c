use super::StorageHost;
use crate::error::{NegotiationError, Result};
use crate::message::{download_shape, DownloadRequest, DownloadResponse, MessageCode};
use crate::responsibility::StorageResponsibility;
use crate::session::{expect_code, Session, SessionExt};
use crate::state::{ServeState, StateTracker};
use strata_contract::{estimate_download_cost, validate_payment_revision, StorageContractRevision};
use strata_merkle::build_range_proof;
use strata_types::{Amount, CLIENT_SIGNATURE_INDEX, HOST_SIGNATURE_INDEX};
use tracing::{debug, info};

pub(super) async fn handle(
    host: &StorageHost,
    session: &mut dyn Session,
    request: DownloadRequest,
) -> Result<()> {
    let mut tracker = StateTracker::for_contract(request.contract_id, ServeState::ValidateRequest);
    let result = run(host, session, request, &mut tracker).await;
    if result.is_err() {
        tracker.fail(ServeState::Failed);
    }
    host.release_lock(tracker.contract_id()).await;
    result
}

fn validate_request(request: &DownloadRequest, snapshot: &StorageResponsibility) -> Result<()> {
    if request.sections.is_empty() {
        return Err(NegotiationError::InvalidRequest(
            "download requests no sections".to_string(),
        ));
    }
    for section in &request.sections {
        section.validate(request.merkle_proof)?;
        if !snapshot.sector_roots.contains(&section.merkle_root) {
            return Err(NegotiationError::InvalidRequest(format!(
                "sector {} is not part of contract {}",
                section.merkle_root, snapshot.contract_id
            )));
        }
    }
    Ok(())
}

async fn run(
    host: &StorageHost,
    session: &mut dyn Session,
    request: DownloadRequest,
    tracker: &mut StateTracker<ServeState>,
) -> Result<()> {
    let contract_id = request.contract_id;
    let _guard = host
        .locks
        .try_lock(&contract_id, host.lock_timeout().await)
        .await?;
    let snapshot = host.store.get(&contract_id).await?;
    let current = snapshot.latest_revision().cloned().ok_or_else(|| {
        NegotiationError::InternalInvariant(format!("responsibility {} has no revision", contract_id))
    })?;
    validate_request(&request, &snapshot)?;

    tracker.transition_to(ServeState::VerifyPayment)?;
    let settings = host.host_settings().await;
    let (total_length, section_count, distinct) = download_shape(&request.sections);
    let price = estimate_download_cost(
        &settings,
        total_length,
        section_count,
        distinct,
        request.merkle_proof,
    )?;
    let height = host.ledger.block_height().await?;

    let mut proposed: StorageContractRevision = current.with_payout_values(
        &request.new_valid_proof_values,
        &request.new_missed_proof_values,
    )?;
    proposed.signatures.clear();
    proposed.new_revision_number = request.new_revision_number;
    validate_payment_revision(&current, &proposed, height, price)?;
    proposed.set_signature(CLIENT_SIGNATURE_INDEX, request.signature.clone());
    proposed.verify_signature(CLIENT_SIGNATURE_INDEX)?;
    let host_signature = host.sign(&proposed.signing_hash()?).await?;
    proposed.set_signature(HOST_SIGNATURE_INDEX, host_signature.clone());

    tracker.transition_to(ServeState::StreamSections)?;
    let mut stopped = false;
    let last = request.sections.len() - 1;
    for (index, section) in request.sections.iter().enumerate() {
        if let Some(message) = session.try_read_message()? {
            expect_code(&message, MessageCode::NegotiationStop)?;
            debug!(contract_id = %contract_id, sent = index, "client stopped download");
            stopped = true;
            break;
        }

        let sector = host.store.read_sector(&section.merkle_root).await?;
        let start = section.offset as usize;
        let end = start + section.length as usize;
        let data = sector
            .get(start..end)
            .ok_or_else(|| {
                NegotiationError::Store(format!(
                    "sector {} holds {} bytes, section ends at {}",
                    section.merkle_root,
                    sector.len(),
                    end
                ))
            })?
            .to_vec();
        let merkle_proof = if request.merkle_proof {
            let (first_segment, end_segment) = section.segment_range();
            build_range_proof(&sector, first_segment, end_segment)?
        } else {
            Vec::new()
        };

        let response = if index == last {
            DownloadResponse::Both {
                data,
                merkle_proof,
                signature: host_signature.clone(),
            }
        } else {
            DownloadResponse::Data { data, merkle_proof }
        };
        session
            .send_typed(MessageCode::DownloadResponse, &response)
            .await?;
    }
    if stopped {
        session
            .send_typed(
                MessageCode::DownloadResponse,
                &DownloadResponse::Signature(host_signature),
            )
            .await?;
    }

    tracker.transition_to(ServeState::Commit)?;
    let paid = current
        .client_valid_value()
        .checked_sub(proposed.client_valid_value())
        .unwrap_or(Amount::ZERO);
    let revision = proposed.new_revision_number;
    let mut updated = snapshot;
    updated.potential_download_revenue = updated.potential_download_revenue.saturating_add(paid);
    updated.revisions.push(proposed);
    host.store.modify(updated, &[], &[], Vec::new()).await?;

    tracker.transition_to(ServeState::Done)?;
    info!(
        contract_id = %contract_id,
        revision,
        bytes = total_length,
        paid = %paid,
        stopped,
        "download served"
    );
    Ok(())
}
