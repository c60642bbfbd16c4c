//! Negotiation states and the tracker that enforces their transitions.

use crate::error::{NegotiationError, Result};
use std::fmt::Debug;
use strata_contract::ContractId;

pub trait NegotiationState: Copy + Debug + PartialEq + Send + Sync {
    fn is_terminal(&self) -> bool;

    fn can_transition_to(&self, next: &Self) -> bool;
}

/// Client side of contract creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateState {
    BuildOffer,
    AwaitHostContractSignature,
    BuildInitialRevision,
    AwaitHostRevisionSignature,
    SubmitTransaction,
    AwaitHostAck,
    Done,
    Failed,
}

impl NegotiationState for CreateState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use CreateState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (BuildOffer, AwaitHostContractSignature) => true,
            (AwaitHostContractSignature, BuildInitialRevision) => true,
            (BuildInitialRevision, AwaitHostRevisionSignature) => true,
            (AwaitHostRevisionSignature, SubmitTransaction) => true,
            (SubmitTransaction, AwaitHostAck) => true,
            (AwaitHostAck, Done) => true,
            _ => false,
        }
    }
}

/// Host side of contract creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCreateState {
    ValidateContract,
    AwaitClientRevisionSignature,
    AwaitClientCommit,
    Persist,
    Done,
    Failed,
}

impl NegotiationState for HostCreateState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use HostCreateState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (ValidateContract, AwaitClientRevisionSignature) => true,
            (AwaitClientRevisionSignature, AwaitClientCommit) => true,
            (AwaitClientCommit, Persist) => true,
            (Persist, Done) => true,
            _ => false,
        }
    }
}

/// Host side of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    DecodeRequest,
    ApplyActions,
    ComputeRevision,
    ValidateRevision,
    SendProof,
    AwaitClientRevisionSign,
    HostSign,
    AwaitClientCommitAck,
    CommitOrRollback,
    Done,
    Failed,
}

impl NegotiationState for UploadState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use UploadState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (DecodeRequest, ApplyActions) => true,
            (ApplyActions, ComputeRevision) => true,
            (ComputeRevision, ValidateRevision) => true,
            (ValidateRevision, SendProof) => true,
            (SendProof, AwaitClientRevisionSign) => true,
            (AwaitClientRevisionSign, HostSign) => true,
            (HostSign, AwaitClientCommitAck) => true,
            (AwaitClientCommitAck, CommitOrRollback) => true,
            (CommitOrRollback, Done) => true,
            _ => false,
        }
    }
}

/// Client side of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    BuildRequest,
    AwaitProof,
    VerifyProof,
    SignRevision,
    AwaitHostSignature,
    Commit,
    AwaitHostAck,
    Done,
    Failed,
}

impl NegotiationState for WriteState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use WriteState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (BuildRequest, AwaitProof) => true,
            (AwaitProof, VerifyProof) => true,
            (VerifyProof, SignRevision) => true,
            (SignRevision, AwaitHostSignature) => true,
            (AwaitHostSignature, Commit) => true,
            (Commit, AwaitHostAck) => true,
            (AwaitHostAck, Done) => true,
            _ => false,
        }
    }
}

/// Client side of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    ValidateRequest,
    EstimateCost,
    BuildPayingRevision,
    SendRequest,
    StreamSections,
    VerifyEachSection,
    AwaitHostSignature,
    Done,
    Failed,
}

impl NegotiationState for DownloadState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use DownloadState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (ValidateRequest, EstimateCost) => true,
            (EstimateCost, BuildPayingRevision) => true,
            (BuildPayingRevision, SendRequest) => true,
            (SendRequest, StreamSections) => true,
            (StreamSections, VerifyEachSection) => true,
            // cancelled before the next section was read
            (StreamSections, AwaitHostSignature) => true,
            (VerifyEachSection, StreamSections) => true,
            (VerifyEachSection, AwaitHostSignature) => true,
            // signature attached to the last data response
            (VerifyEachSection, Done) => true,
            (AwaitHostSignature, Done) => true,
            _ => false,
        }
    }
}

/// Host side of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    ValidateRequest,
    VerifyPayment,
    StreamSections,
    Commit,
    Done,
    Failed,
}

impl NegotiationState for ServeState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ServeState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (ValidateRequest, VerifyPayment) => true,
            (VerifyPayment, StreamSections) => true,
            (StreamSections, Commit) => true,
            (Commit, Done) => true,
            _ => false,
        }
    }
}

/// Current state of one negotiation, tagged with its contract for logging
#[derive(Debug, Clone)]
pub struct StateTracker<S: NegotiationState> {
    contract_id: Option<ContractId>,
    state: S,
}

impl<S: NegotiationState> StateTracker<S> {
    pub fn new(initial: S) -> Self {
        Self {
            contract_id: None,
            state: initial,
        }
    }

    pub fn for_contract(contract_id: ContractId, initial: S) -> Self {
        Self {
            contract_id: Some(contract_id),
            state: initial,
        }
    }

    pub fn set_contract(&mut self, contract_id: ContractId) {
        self.contract_id = Some(contract_id);
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn contract_id(&self) -> Option<ContractId> {
        self.contract_id
    }

    pub fn transition_to(&mut self, next: S) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(NegotiationError::InternalInvariant(format!(
                "invalid transition {:?} -> {:?}",
                self.state, next
            )));
        }

        tracing::debug!(
            contract_id = ?self.contract_id,
            from = ?self.state,
            state = ?next,
            "negotiation state transition"
        );

        self.state = next;
        Ok(())
    }

    /// Moves to `failed` unless already terminal
    pub fn fail(&mut self, failed: S) {
        if !self.state.is_terminal() {
            tracing::debug!(
                contract_id = ?self.contract_id,
                from = ?self.state,
                state = ?failed,
                "negotiation state transition"
            );
            self.state = failed;
        }
    }
}
