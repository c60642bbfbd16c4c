pub mod error;
pub mod hashing;

pub use error::{CryptoError, Result};
pub use hashing::{hash_encoded, hash_with_domain};

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use strata_types::{Address, Hash, PublicKey, Signature};

/// A keypair for signing contract and revision hashes
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Create a keypair from the 32 byte secret key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeySize)?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&key_bytes)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Payout address owned by this keypair
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::new(signature.to_bytes().to_vec())
    }

    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        self.sign(hash.as_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Verify a signature with a public key
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;

    let sig_array: [u8; 64] = signature
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;
    let signature = DalekSignature::from_bytes(&sig_array);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

pub fn verify_hash_signature(public_key: &PublicKey, hash: &Hash, signature: &Signature) -> Result<()> {
    verify_signature(public_key, hash.as_bytes(), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let hash = hash_with_domain("test", b"revision");
        let signature = keypair.sign_hash(&hash);

        assert!(verify_hash_signature(keypair.public_key(), &hash, &signature).is_ok());

        let other = hash_with_domain("test", b"another revision");
        assert_eq!(
            verify_hash_signature(keypair.public_key(), &other, &signature),
            Err(CryptoError::SignatureVerificationFailed)
        );
    }

    #[test]
    fn test_empty_signature_rejected() {
        let keypair = Keypair::generate();
        assert!(verify_signature(keypair.public_key(), b"msg", &Signature::empty()).is_err());
    }

    #[test]
    fn test_keypair_from_bytes_roundtrip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_bytes(&keypair.to_bytes()).unwrap();
        assert_eq!(keypair.public_key(), restored.public_key());
        assert_eq!(keypair.address(), restored.address());
        assert_eq!(
            Keypair::from_bytes(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKeySize
        );
    }
}
