use super::{read_client_commit, StorageHost};
use crate::error::{NegotiationError, Result};
use crate::message::{MessageCode, UploadAction, UploadMerkleProof, UploadRequest};
use crate::responsibility::StorageResponsibility;
use crate::session::{Session, SessionExt};
use crate::state::{StateTracker, UploadState};
use strata_contract::{
    estimate_upload_cost, validate_upload_revision, StorageContractRevision, UploadCost,
};
use strata_merkle::{build_diff_proof, cached_tree_root, sector_root, CachedSubtreeSource};
use strata_types::{Hash, Signature, CLIENT_SIGNATURE_INDEX, HOST_SIGNATURE_INDEX, SECTOR_SIZE};
use tracing::info;

/// Working state of one upload. Owned by the negotiation and dropped when it ends; only
/// `commit` makes any of it durable.
struct UploadNegotiation {
    snapshot: StorageResponsibility,
    current: StorageContractRevision,
    new_roots: Vec<Hash>,
    gained_roots: Vec<Hash>,
    gained_data: Vec<Vec<u8>>,
    cost: UploadCost,
    proposed: Option<StorageContractRevision>,
}

impl UploadNegotiation {
    fn new(snapshot: StorageResponsibility) -> Result<Self> {
        let current = snapshot.latest_revision().cloned().ok_or_else(|| {
            NegotiationError::InternalInvariant(format!(
                "responsibility {} has no revision",
                snapshot.contract_id
            ))
        })?;
        let new_roots = snapshot.sector_roots.clone();
        Ok(Self {
            snapshot,
            current,
            new_roots,
            gained_roots: Vec::new(),
            gained_data: Vec::new(),
            cost: UploadCost::default(),
            proposed: None,
        })
    }

    fn apply(&mut self, actions: Vec<UploadAction>) -> Result<()> {
        if actions.is_empty() {
            return Err(NegotiationError::InvalidRequest(
                "upload carries no actions".to_string(),
            ));
        }
        for action in actions {
            match action {
                UploadAction::Append { data } => {
                    if data.len() as u64 != SECTOR_SIZE {
                        return Err(NegotiationError::InvalidRequest(format!(
                            "appended sector has {} bytes, expected {}",
                            data.len(),
                            SECTOR_SIZE
                        )));
                    }
                    let root = sector_root(&data);
                    self.new_roots.push(root);
                    self.gained_roots.push(root);
                    self.gained_data.push(data);
                }
            }
        }
        Ok(())
    }

    /// Revision the client is offering, rebuilt from its payout values and the new sectors
    fn propose(&mut self, request: &UploadRequest) -> Result<&StorageContractRevision> {
        let mut proposed = self.current.with_payout_values(
            &request.new_valid_proof_values,
            &request.new_missed_proof_values,
        )?;
        proposed.signatures.clear();
        proposed.new_revision_number = request.new_revision_number;
        proposed.new_file_size = self.new_roots.len() as u64 * SECTOR_SIZE;
        proposed.new_file_merkle_root = cached_tree_root(&self.new_roots);
        Ok(self.proposed.insert(proposed))
    }

    /// Checks the proposal against the priced cost of the gained sectors
    fn validate(&self, height: u64) -> Result<()> {
        let proposed = self.proposed.as_ref().ok_or_else(|| {
            NegotiationError::InternalInvariant(format!(
                "upload on {} validated before a revision was proposed",
                self.snapshot.contract_id
            ))
        })?;
        validate_upload_revision(
            &self.current,
            proposed,
            &self.new_roots,
            height,
            self.cost.total()?,
            self.cost.collateral,
        )?;
        Ok(())
    }

    fn proposed_mut(&mut self) -> Result<&mut StorageContractRevision> {
        self.proposed
            .as_mut()
            .ok_or_else(|| NegotiationError::InternalInvariant("no proposed revision".to_string()))
    }

    /// Appends only extend the tree, so every old sector is covered by the proof hashes
    fn build_proof(&self) -> Result<UploadMerkleProof> {
        let old_count = self.snapshot.sector_roots.len() as u64;
        let mut source = CachedSubtreeSource::new(self.snapshot.sector_roots.iter().copied());
        let old_subtree_hashes = build_diff_proof(&[], &mut source, old_count)?;
        Ok(UploadMerkleProof {
            old_subtree_hashes,
            old_leaf_hashes: Vec::new(),
            new_merkle_root: cached_tree_root(&self.new_roots),
        })
    }

    /// The responsibility as it stands once this upload commits
    fn committed(&self) -> Result<StorageResponsibility> {
        let proposed = self
            .proposed
            .clone()
            .ok_or_else(|| NegotiationError::InternalInvariant("no proposed revision".to_string()))?;
        let paid = self
            .current
            .client_valid_value()
            .saturating_sub(proposed.client_valid_value());
        let collateral = self
            .current
            .host_missed_value()
            .saturating_sub(proposed.host_missed_value());

        let mut updated = self.snapshot.clone();
        updated.sector_roots = self.new_roots.clone();
        updated.potential_storage_revenue = updated
            .potential_storage_revenue
            .saturating_add(self.cost.storage);
        updated.potential_upload_revenue = updated
            .potential_upload_revenue
            .saturating_add(paid.saturating_sub(self.cost.storage));
        updated.risked_storage_deposit = updated.risked_storage_deposit.saturating_add(collateral);
        updated.revisions.push(proposed);
        Ok(updated)
    }
}

pub(super) async fn handle(
    host: &StorageHost,
    session: &mut dyn Session,
    request: UploadRequest,
) -> Result<()> {
    let mut tracker = StateTracker::for_contract(request.contract_id, UploadState::DecodeRequest);
    let result = run(host, session, request, &mut tracker).await;
    if result.is_err() {
        tracker.fail(UploadState::Failed);
    }
    host.release_lock(tracker.contract_id()).await;
    result
}

async fn run(
    host: &StorageHost,
    session: &mut dyn Session,
    mut request: UploadRequest,
    tracker: &mut StateTracker<UploadState>,
) -> Result<()> {
    let contract_id = request.contract_id;
    let _guard = host
        .locks
        .try_lock(&contract_id, host.lock_timeout().await)
        .await?;
    let snapshot = host.store.get(&contract_id).await?;
    let mut negotiation = UploadNegotiation::new(snapshot)?;

    tracker.transition_to(UploadState::ApplyActions)?;
    negotiation.apply(std::mem::take(&mut request.actions))?;

    tracker.transition_to(UploadState::ComputeRevision)?;
    let settings = host.host_settings().await;
    let height = host.ledger.block_height().await?;
    let blocks_remaining = negotiation.current.new_window_end.saturating_sub(height);
    negotiation.cost = estimate_upload_cost(
        &settings,
        negotiation.gained_roots.len() as u64,
        blocks_remaining,
        None,
    )?;
    negotiation.propose(&request)?;

    tracker.transition_to(UploadState::ValidateRevision)?;
    negotiation.validate(height)?;

    tracker.transition_to(UploadState::SendProof)?;
    let proof = negotiation.build_proof()?;
    session
        .send_typed(MessageCode::UploadMerkleProof, &proof)
        .await?;

    tracker.transition_to(UploadState::AwaitClientRevisionSign)?;
    let client_signature: Signature = session
        .read_expected(MessageCode::UploadClientRevisionSign)
        .await?;
    let proposed = negotiation.proposed_mut()?;
    proposed.set_signature(CLIENT_SIGNATURE_INDEX, client_signature);
    proposed.verify_signature(CLIENT_SIGNATURE_INDEX)?;
    let signing_hash = proposed.signing_hash()?;

    tracker.transition_to(UploadState::HostSign)?;
    let host_signature = host.sign(&signing_hash).await?;
    negotiation
        .proposed_mut()?
        .set_signature(HOST_SIGNATURE_INDEX, host_signature.clone());
    session
        .send_typed(MessageCode::UploadHostRevisionSign, &host_signature)
        .await?;

    tracker.transition_to(UploadState::AwaitClientCommitAck)?;
    read_client_commit(session).await?;

    tracker.transition_to(UploadState::CommitOrRollback)?;
    let updated = negotiation.committed()?;
    let revision = updated
        .latest_revision()
        .map(|r| r.new_revision_number)
        .unwrap_or_default();
    let gained = negotiation.gained_roots.clone();
    host.store
        .modify(
            updated,
            &[],
            &gained,
            std::mem::take(&mut negotiation.gained_data),
        )
        .await?;

    if let Err(send_err) = session.send_signal(MessageCode::HostAck).await {
        return Err(host.rollback(negotiation.snapshot, &gained, send_err).await);
    }

    tracker.transition_to(UploadState::Done)?;
    info!(
        contract_id = %contract_id,
        revision,
        sectors = negotiation.new_roots.len(),
        storage_revenue = %negotiation.cost.storage,
        "upload committed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responsibility::test_support::sample_responsibility;
    use strata_crypto::Keypair;
    use strata_merkle::{verify_diff_proof, CachedLeafSource, ProofRange};
    use strata_types::Amount;

    fn sector(fill: u8) -> Vec<u8> {
        vec![fill; SECTOR_SIZE as usize]
    }

    #[test]
    fn test_append_extends_roots_and_proof_covers_old_tree() {
        let mut snapshot = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        snapshot.sector_roots = vec![Hash::from_bytes([1u8; 32]), Hash::from_bytes([2u8; 32])];
        let old_root = cached_tree_root(&snapshot.sector_roots);

        let mut negotiation = UploadNegotiation::new(snapshot).unwrap();
        negotiation
            .apply(vec![UploadAction::Append { data: sector(7) }])
            .unwrap();
        assert_eq!(negotiation.new_roots.len(), 3);
        assert_eq!(negotiation.gained_roots, vec![sector_root(&sector(7))]);

        let proof = negotiation.build_proof().unwrap();
        assert!(proof.old_leaf_hashes.is_empty());
        assert!(verify_diff_proof(
            &mut CachedLeafSource::new(Vec::new()),
            &[],
            2,
            &proof.old_subtree_hashes,
            &old_root
        )
        .unwrap());
        assert!(verify_diff_proof(
            &mut CachedLeafSource::new(negotiation.gained_roots.clone()),
            &[ProofRange::new(2, 3)],
            3,
            &proof.old_subtree_hashes,
            &proof.new_merkle_root
        )
        .unwrap());
    }

    #[test]
    fn test_wrong_sized_or_empty_append_rejected() {
        let snapshot = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        let mut negotiation = UploadNegotiation::new(snapshot).unwrap();
        let err = negotiation
            .apply(vec![UploadAction::Append { data: vec![0; 10] }])
            .unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidRequest(_)));
        assert!(negotiation.apply(Vec::new()).is_err());
    }

    #[test]
    fn test_validate_without_proposal_is_an_invariant_error() {
        let snapshot = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        let mut negotiation = UploadNegotiation::new(snapshot).unwrap();
        negotiation
            .apply(vec![UploadAction::Append { data: sector(2) }])
            .unwrap();
        let err = negotiation.validate(10).unwrap_err();
        assert!(matches!(err, NegotiationError::InternalInvariant(_)));
    }

    #[test]
    fn test_committed_accrues_revenue_and_revision() {
        let snapshot = sample_responsibility(&Keypair::generate(), &Keypair::generate());
        let mut negotiation = UploadNegotiation::new(snapshot.clone()).unwrap();
        negotiation
            .apply(vec![UploadAction::Append { data: sector(1) }])
            .unwrap();
        negotiation.cost = UploadCost {
            bandwidth: Amount::from_base_units(30),
            storage: Amount::from_base_units(60),
            base: Amount::from_base_units(10),
            collateral: Amount::from_base_units(40),
        };
        let next = negotiation
            .current
            .new_upload_revision(
                Amount::from_base_units(100),
                Amount::from_base_units(40),
                SECTOR_SIZE,
                cached_tree_root(&negotiation.new_roots),
            )
            .unwrap();
        let request = UploadRequest {
            contract_id: snapshot.contract_id,
            actions: Vec::new(),
            new_revision_number: next.new_revision_number,
            new_valid_proof_values: next.valid_values(),
            new_missed_proof_values: next.missed_values(),
        };
        negotiation.propose(&request).unwrap();

        let updated = negotiation.committed().unwrap();
        assert_eq!(updated.sector_roots.len(), 1);
        assert_eq!(updated.revisions.len(), 2);
        assert_eq!(updated.potential_storage_revenue, Amount::from_base_units(60));
        assert_eq!(updated.potential_upload_revenue, Amount::from_base_units(40));
        assert_eq!(updated.risked_storage_deposit, Amount::from_base_units(40));
        assert_eq!(updated.merkle_root(), sector_root(&sector(1)));
        // the snapshot itself is untouched
        assert!(negotiation.snapshot.sector_roots.is_empty());
    }
}
