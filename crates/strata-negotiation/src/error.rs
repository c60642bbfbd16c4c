use strata_contract::{ContractError, ContractId};
use strata_merkle::MerkleError;
use thiserror::Error;

/// Coarse classification callers use to decide whether to retry, report or alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unexpected message; the session is no longer trustworthy
    Decode,
    /// Terms, funds or request shape rejected
    Validation,
    /// A Merkle proof or signature did not check out
    ProofVerification,
    /// The contract is busy with another negotiation
    LockContention,
    /// State could not be restored after a failed negotiation
    Rollback,
    /// The session closed or timed out
    Transport,
    /// Ledger, wallet or store failure
    Collaborator,
    /// A condition the code assumes can never happen
    Internal,
}

#[derive(Error, Debug, Clone)]
pub enum NegotiationError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ContractError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    #[error("Contract {0} is busy with another negotiation")]
    ContractBusy(ContractId),

    #[error("Rollback failed: {0}")]
    Rollback(String),

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Storage responsibility not found: {0}")]
    NotFound(String),

    #[error("Host is not accepting new contracts")]
    NotAcceptingContracts,

    #[error("Peer aborted the negotiation: {0}")]
    PeerNegotiation(String),

    #[error("Client failed to commit the negotiated revision")]
    ClientCommitFailed,

    #[error("Session closed")]
    SessionClosed,

    #[error("Timed out waiting for peer")]
    Timeout,
}

impl NegotiationError {
    pub fn kind(&self) -> ErrorKind {
        use NegotiationError::*;
        match self {
            Decode(_) => ErrorKind::Decode,
            Validation(ContractError::InvalidSignature(_)) => ErrorKind::ProofVerification,
            Validation(_) | InvalidRequest(_) | NotAcceptingContracts | NotFound(_) => {
                ErrorKind::Validation
            }
            ProofVerification(_) => ErrorKind::ProofVerification,
            ContractBusy(_) => ErrorKind::LockContention,
            Rollback(_) => ErrorKind::Rollback,
            Ledger(_) | Wallet(_) | Store(_) => ErrorKind::Collaborator,
            PeerNegotiation(_) | ClientCommitFailed | SessionClosed | Timeout => {
                ErrorKind::Transport
            }
            InternalInvariant(_) => ErrorKind::Internal,
        }
    }

    /// Only lock contention is worth retrying after a back-off
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::LockContention
    }

    /// Whether the peer should be told about this error. Errors that came from the
    /// peer or from a dead session are not echoed back.
    pub fn should_notify_peer(&self) -> bool {
        !matches!(
            self,
            NegotiationError::PeerNegotiation(_)
                | NegotiationError::ClientCommitFailed
                | NegotiationError::SessionClosed
                | NegotiationError::Timeout
        )
    }
}

impl From<MerkleError> for NegotiationError {
    fn from(err: MerkleError) -> Self {
        match err {
            MerkleError::InvalidRanges(msg) => NegotiationError::InvalidRequest(msg),
            // reading local sector data, not a fault in anything the peer sent
            MerkleError::Io(msg) => NegotiationError::Store(msg),
            other => NegotiationError::ProofVerification(other.to_string()),
        }
    }
}

impl From<bincode::Error> for NegotiationError {
    fn from(err: bincode::Error) -> Self {
        NegotiationError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NegotiationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::Hash;

    #[test]
    fn test_only_lock_contention_is_retryable() {
        assert!(NegotiationError::ContractBusy(Hash::ZERO).is_retryable());
        assert!(!NegotiationError::ProofVerification("x".into()).is_retryable());
        assert!(!NegotiationError::Validation(ContractError::BadWindowEnd).is_retryable());
        assert!(!NegotiationError::Rollback("x".into()).is_retryable());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(NegotiationError::Decode("bad".into()).kind(), ErrorKind::Decode);
        assert_eq!(
            NegotiationError::Validation(ContractError::InvalidSignature("sig".into())).kind(),
            ErrorKind::ProofVerification
        );
        assert_eq!(
            NegotiationError::from(MerkleError::NoMoreLeaves).kind(),
            ErrorKind::ProofVerification
        );
        assert_eq!(
            NegotiationError::from(MerkleError::InvalidRanges("r".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            NegotiationError::from(MerkleError::Io("disk".into())).kind(),
            ErrorKind::Collaborator
        );
        assert_eq!(NegotiationError::SessionClosed.kind(), ErrorKind::Transport);
        assert_eq!(
            NegotiationError::InternalInvariant("x".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_peer_errors_not_echoed() {
        assert!(!NegotiationError::PeerNegotiation("no".into()).should_notify_peer());
        assert!(!NegotiationError::SessionClosed.should_notify_peer());
        assert!(NegotiationError::InvalidRequest("bad".into()).should_notify_peer());
    }
}
