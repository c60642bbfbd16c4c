use super::{abandon, host_settings, StorageClient};
use crate::error::{NegotiationError, Result};
use crate::message::{download_shape, DownloadRequest, DownloadResponse, DownloadSection, MessageCode};
use crate::session::{Session, SessionExt};
use crate::state::{DownloadState, StateTracker};
use strata_contract::{estimate_download_cost, ContractError, ContractId};
use strata_merkle::verify_range_proof;
use strata_types::{Signature, CLIENT_SIGNATURE_INDEX, HOST_SIGNATURE_INDEX};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How a read ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes_written: u64,
    /// The caller cancelled before every section arrived
    pub cancelled: bool,
}

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.map(|c| *c.borrow()).unwrap_or(false)
}

impl StorageClient {
    /// Pays for and reads `sections` of the contract's file into `destination`, verifying
    /// each section against its sector root when `merkle_proof` is set.
    ///
    /// Raising `cancel` stops further section reads; the host is told to stop and the paid
    /// revision is still settled so the session stays usable.
    pub async fn read<W>(
        &self,
        session: &mut dyn Session,
        contract_id: &ContractId,
        sections: &[DownloadSection],
        merkle_proof: bool,
        destination: &mut W,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<ReadOutcome>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut tracker = StateTracker::for_contract(*contract_id, DownloadState::ValidateRequest);
        let result = self
            .run_read(
                session,
                contract_id,
                sections,
                merkle_proof,
                destination,
                cancel,
                &mut tracker,
            )
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let skip_notice = matches!(
                    tracker.state(),
                    DownloadState::ValidateRequest
                        | DownloadState::EstimateCost
                        | DownloadState::BuildPayingRevision
                );
                tracker.fail(DownloadState::Failed);
                warn!(contract_id = %contract_id, error = %e, "download aborted");
                if skip_notice {
                    Err(e)
                } else {
                    Err(abandon(session, e).await)
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_read<W>(
        &self,
        session: &mut dyn Session,
        contract_id: &ContractId,
        sections: &[DownloadSection],
        merkle_proof: bool,
        destination: &mut W,
        cancel: Option<&watch::Receiver<bool>>,
        tracker: &mut StateTracker<DownloadState>,
    ) -> Result<ReadOutcome>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        if sections.is_empty() {
            return Err(NegotiationError::InvalidRequest("nothing to read".to_string()));
        }
        for section in sections {
            section.validate(merkle_proof)?;
        }
        let contract = self.require_contract(contract_id).await?;

        tracker.transition_to(DownloadState::EstimateCost)?;
        let settings = host_settings(session)?;
        let (total_length, section_count, distinct) = download_shape(sections);
        let price = estimate_download_cost(
            &settings,
            total_length,
            section_count,
            distinct,
            merkle_proof,
        )?;
        let cost = price
            .checked_add_percent(self.config.download_safety_margin_percent)
            .ok_or_else(|| {
                NegotiationError::Validation(ContractError::Overflow(
                    "download safety margin".to_string(),
                ))
            })?;

        tracker.transition_to(DownloadState::BuildPayingRevision)?;
        let mut revision = contract.latest_revision.new_download_revision(cost)?;
        let signature = self.sign(&revision.signing_hash()?).await?;
        revision.set_signature(CLIENT_SIGNATURE_INDEX, signature.clone());

        tracker.transition_to(DownloadState::SendRequest)?;
        let request = DownloadRequest {
            contract_id: *contract_id,
            sections: sections.to_vec(),
            merkle_proof,
            new_revision_number: revision.new_revision_number,
            new_valid_proof_values: revision.valid_values(),
            new_missed_proof_values: revision.missed_values(),
            signature,
        };
        session
            .send_typed(MessageCode::DownloadRequest, &request)
            .await?;

        let mut bytes_written = 0u64;
        let mut host_signature: Option<Signature> = None;
        let mut cancelled = false;
        for (index, section) in sections.iter().enumerate() {
            tracker.transition_to(DownloadState::StreamSections)?;
            if is_cancelled(cancel) {
                debug!(contract_id = %contract_id, received = index, "download cancelled");
                cancelled = true;
                break;
            }

            let response: DownloadResponse = session
                .read_expected(MessageCode::DownloadResponse)
                .await?;
            tracker.transition_to(DownloadState::VerifyEachSection)?;
            let (data, proof) = response.data().ok_or_else(|| {
                NegotiationError::Decode(format!("response {} carries no data", index))
            })?;
            if data.len() as u64 != u64::from(section.length) {
                return Err(NegotiationError::ProofVerification(format!(
                    "section {} returned {} bytes, requested {}",
                    index,
                    data.len(),
                    section.length
                )));
            }
            if merkle_proof {
                let (start, end) = section.segment_range();
                if !verify_range_proof(data, proof, start, end, &section.merkle_root)? {
                    return Err(NegotiationError::ProofVerification(format!(
                        "section {} does not belong to sector {}",
                        index, section.merkle_root
                    )));
                }
            }
            destination
                .write_all(data)
                .await
                .map_err(|e| NegotiationError::Store(format!("destination write failed: {}", e)))?;
            bytes_written += data.len() as u64;

            if let Some(signature) = response.signature() {
                host_signature = Some(signature.clone());
                if index + 1 != sections.len() {
                    return Err(NegotiationError::Decode(
                        "host settled before sending every section".to_string(),
                    ));
                }
            }
        }
        destination
            .flush()
            .await
            .map_err(|e| NegotiationError::Store(format!("destination write failed: {}", e)))?;

        let host_signature = match host_signature {
            Some(signature) => signature,
            None => {
                tracker.transition_to(DownloadState::AwaitHostSignature)?;
                if cancelled {
                    session.send_signal(MessageCode::NegotiationStop).await?;
                }
                await_settlement(session).await?
            }
        };
        revision.set_signature(HOST_SIGNATURE_INDEX, host_signature);
        revision.verify_signature(HOST_SIGNATURE_INDEX)?;
        self.accept_revision(contract_id, revision.clone()).await?;

        tracker.transition_to(DownloadState::Done)?;
        info!(
            contract_id = %contract_id,
            revision = revision.new_revision_number,
            bytes = bytes_written,
            paid = %cost,
            cancelled,
            "download complete"
        );
        Ok(ReadOutcome {
            bytes_written,
            cancelled,
        })
    }
}

/// Reads responses until one carries the host's signature. Data the host sent before it
/// saw the stop request is dropped.
async fn await_settlement(session: &mut dyn Session) -> Result<Signature> {
    loop {
        let response: DownloadResponse = session
            .read_expected(MessageCode::DownloadResponse)
            .await?;
        if let Some(signature) = response.signature() {
            return Ok(signature.clone());
        }
    }
}
