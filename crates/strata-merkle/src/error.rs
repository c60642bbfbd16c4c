use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// The leaf source was exhausted before any requested leaf could be read
    #[error("No more leaves available")]
    NoMoreLeaves,

    #[error("Cannot skip {requested} leaves, only {available} remain")]
    ShortSkip { requested: u64, available: u64 },

    #[error("Invalid proof ranges: {0}")]
    InvalidRanges(String),

    /// A cached subtree taller than the current head was pushed
    #[error("Subtree of height {pushed} cannot follow a head of height {head}")]
    SubtreeOrder { head: u32, pushed: u32 },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MerkleError {
    fn from(err: std::io::Error) -> Self {
        MerkleError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MerkleError>;
