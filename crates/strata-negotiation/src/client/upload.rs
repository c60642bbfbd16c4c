use super::{abandon, host_settings, StorageClient};
use crate::error::{NegotiationError, Result};
use crate::message::{MessageCode, UploadAction, UploadMerkleProof, UploadRequest};
use crate::session::{Session, SessionExt};
use crate::state::{StateTracker, WriteState};
use strata_contract::{estimate_upload_cost, ContractId, StorageContractRevision};
use strata_merkle::{sector_root, verify_diff_proof, CachedLeafSource, ProofRange};
use strata_types::{Hash, Signature, CLIENT_SIGNATURE_INDEX, HOST_SIGNATURE_INDEX, SECTOR_SIZE};
use tracing::{info, warn};

/// Checks the host's upload proof twice: against the root the client already signed, and
/// against the root the host claims once `appended` sector roots follow the old ones.
pub(crate) fn verify_append_proof(
    current: &StorageContractRevision,
    appended: &[Hash],
    proof: &UploadMerkleProof,
) -> Result<()> {
    let old_count = current.new_file_size / SECTOR_SIZE;
    let new_count = old_count + appended.len() as u64;

    if !proof.old_leaf_hashes.is_empty() {
        return Err(NegotiationError::ProofVerification(format!(
            "append proof carries {} old leaves",
            proof.old_leaf_hashes.len()
        )));
    }
    let old_valid = verify_diff_proof(
        &mut CachedLeafSource::new(Vec::new()),
        &[],
        old_count,
        &proof.old_subtree_hashes,
        &current.new_file_merkle_root,
    )?;
    if !old_valid {
        return Err(NegotiationError::ProofVerification(
            "proof does not match the current file root".to_string(),
        ));
    }

    let new_valid = verify_diff_proof(
        &mut CachedLeafSource::new(appended.iter().copied()),
        &[ProofRange::new(old_count, new_count)],
        new_count,
        &proof.old_subtree_hashes,
        &proof.new_merkle_root,
    )?;
    if !new_valid {
        return Err(NegotiationError::ProofVerification(
            "proof does not produce the claimed new root".to_string(),
        ));
    }
    Ok(())
}

impl StorageClient {
    /// Appends `sectors` to the contract's file. Each sector must be exactly one sector long.
    /// The local revision only advances once the host acknowledges the commit.
    pub async fn append(
        &self,
        session: &mut dyn Session,
        contract_id: &ContractId,
        sectors: Vec<Vec<u8>>,
    ) -> Result<StorageContractRevision> {
        let mut tracker = StateTracker::for_contract(*contract_id, WriteState::BuildRequest);
        match self
            .run_append(session, contract_id, sectors, &mut tracker)
            .await
        {
            Ok(revision) => Ok(revision),
            Err(e) => {
                let skip_notice = tracker.state() == WriteState::BuildRequest;
                tracker.fail(WriteState::Failed);
                warn!(contract_id = %contract_id, error = %e, "upload aborted");
                if skip_notice {
                    Err(e)
                } else {
                    Err(abandon(session, e).await)
                }
            }
        }
    }

    async fn run_append(
        &self,
        session: &mut dyn Session,
        contract_id: &ContractId,
        sectors: Vec<Vec<u8>>,
        tracker: &mut StateTracker<WriteState>,
    ) -> Result<StorageContractRevision> {
        if sectors.is_empty() {
            return Err(NegotiationError::InvalidRequest("nothing to upload".to_string()));
        }
        if let Some(bad) = sectors.iter().find(|s| s.len() as u64 != SECTOR_SIZE) {
            return Err(NegotiationError::InvalidRequest(format!(
                "sector of {} bytes, expected {}",
                bad.len(),
                SECTOR_SIZE
            )));
        }

        let contract = self.require_contract(contract_id).await?;
        let current = &contract.latest_revision;
        let settings = host_settings(session)?;
        let height = self.ledger.block_height().await?;
        let blocks_remaining = current.new_window_end.saturating_sub(height);
        let appended = sectors.len() as u64;

        let cost = estimate_upload_cost(&settings, appended, blocks_remaining, Some(appended))?;
        let appended_roots: Vec<Hash> = sectors.iter().map(|s| sector_root(s)).collect();
        // the root is filled in once the host's proof is verified
        let mut revision = current.new_upload_revision(
            cost.total()?,
            cost.collateral,
            (contract.sector_count() + appended) * SECTOR_SIZE,
            Hash::ZERO,
        )?;

        let request = UploadRequest {
            contract_id: *contract_id,
            actions: sectors
                .into_iter()
                .map(|data| UploadAction::Append { data })
                .collect(),
            new_revision_number: revision.new_revision_number,
            new_valid_proof_values: revision.valid_values(),
            new_missed_proof_values: revision.missed_values(),
        };
        session
            .send_typed(MessageCode::UploadRequest, &request)
            .await?;

        tracker.transition_to(WriteState::AwaitProof)?;
        let proof: UploadMerkleProof = session
            .read_expected(MessageCode::UploadMerkleProof)
            .await?;

        tracker.transition_to(WriteState::VerifyProof)?;
        verify_append_proof(current, &appended_roots, &proof)?;
        revision.new_file_merkle_root = proof.new_merkle_root;

        tracker.transition_to(WriteState::SignRevision)?;
        let signature = self.sign(&revision.signing_hash()?).await?;
        revision.set_signature(CLIENT_SIGNATURE_INDEX, signature.clone());
        session
            .send_typed(MessageCode::UploadClientRevisionSign, &signature)
            .await?;

        tracker.transition_to(WriteState::AwaitHostSignature)?;
        let host_signature: Signature = session
            .read_expected(MessageCode::UploadHostRevisionSign)
            .await?;
        revision.set_signature(HOST_SIGNATURE_INDEX, host_signature);
        revision.verify_signature(HOST_SIGNATURE_INDEX)?;

        tracker.transition_to(WriteState::Commit)?;
        session.send_signal(MessageCode::ClientCommitSuccess).await?;

        tracker.transition_to(WriteState::AwaitHostAck)?;
        session.read_signal(MessageCode::HostAck).await?;
        self.accept_revision(contract_id, revision.clone()).await?;

        tracker.transition_to(WriteState::Done)?;
        info!(
            contract_id = %contract_id,
            revision = revision.new_revision_number,
            sectors = appended,
            file_size = revision.new_file_size,
            "upload complete"
        );
        Ok(revision)
    }
}
