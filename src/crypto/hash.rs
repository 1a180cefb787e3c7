//! Hashing utilities supporting multiple digest algorithms.

use crate::error::Result;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256 (used for JWK thumbprints and DNS-01/TLS-ALPN-01 digests)
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn hash(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                Ok(hasher.finalize().to_vec())
            }
            HashAlgorithm::Sha384 => {
                let mut hasher = Sha384::new();
                hasher.update(data);
                Ok(hasher.finalize().to_vec())
            }
            HashAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(data);
                Ok(hasher.finalize().to_vec())
            }
        }
    }

    pub fn hash_hex(&self, data: &[u8]) -> Result<String> {
        let hash = self.hash(data)?;
        Ok(hex::encode(hash))
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "SHA256"),
            HashAlgorithm::Sha384 => write!(f, "SHA384"),
            HashAlgorithm::Sha512 => write!(f, "SHA512"),
        }
    }
}

/// SHA-256 convenience wrapper, used for JWK thumbprints and the
/// key-authorization digests of the DNS-01/TLS-ALPN-01 challenge types.
pub struct Sha256Hash;

impl Sha256Hash {
    pub fn hash(data: &[u8]) -> Result<Vec<u8>> {
        HashAlgorithm::Sha256.hash(data)
    }

    pub fn hash_hex(data: &[u8]) -> Result<String> {
        let hash = Self::hash(data)?;
        Ok(hex::encode(hash))
    }

    /// Base64url (no padding) of the SHA-256 digest, the encoding used for
    /// DNS-01 TXT record values and the TLS-ALPN-01 acmeIdentifier extension.
    pub fn hash_base64(data: &[u8]) -> Result<String> {
        use base64::Engine;
        let hash = Self::hash(data)?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_string_matches_known_vector() {
        let hash = Sha256Hash::hash(b"").unwrap();
        assert_eq!(
            hex::encode(&hash),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn hash_hex_is_64_chars() {
        let hex = Sha256Hash::hash_hex(b"hello").unwrap();
        assert_eq!(hex.len(), 64);
    }

    #[test]
    fn hash_base64_is_url_safe_unpadded() {
        let b64 = Sha256Hash::hash_base64(b"key-authorization-material").unwrap();
        assert!(!b64.contains('='));
        assert!(!b64.contains('+'));
        assert!(!b64.contains('/'));
    }
}
