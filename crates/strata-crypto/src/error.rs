use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key size")]
    InvalidKeySize,

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
