use crate::error::{CryptoError, Result};
use serde::Serialize;
use strata_types::Hash;

/// Hashes `data` under a domain tag so digests of different object kinds never collide.
pub fn hash_with_domain(domain: &str, data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Bincode-encodes `value` and hashes the bytes under `domain`.
pub fn hash_encoded<T: Serialize + ?Sized>(domain: &str, value: &T) -> Result<Hash> {
    let bytes = bincode::serialize(value).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(hash_with_domain(domain, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_separate_digests() {
        let a = hash_with_domain("strata/contract", b"payload");
        let b = hash_with_domain("strata/revision", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, hash_with_domain("strata/contract", b"payload"));
    }

    #[test]
    fn test_hash_encoded_matches_manual_encoding() {
        let value = (7u64, vec![1u8, 2, 3]);
        let manual = hash_with_domain("t", &bincode::serialize(&value).unwrap());
        assert_eq!(hash_encoded("t", &value).unwrap(), manual);
    }
}
