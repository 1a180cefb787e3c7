//! Encoding helpers: base64url and PEM.

use crate::error::{DriverError, Result};
use base64::Engine;

/// Base64url encoder/decoder (RFC 4648 §5, no padding), the encoding used
/// throughout JWS and for DNS-01/TLS-ALPN-01 digests.
pub struct Base64Encoding;

impl Base64Encoding {
    pub fn encode(data: &[u8]) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
    }

    /// Decodes base64url with no padding. The input must already be
    /// unpadded; padding is never inserted before decoding, since doing so
    /// against an engine configured for no-padding input corrupts
    /// otherwise-valid strings ending in one or two base64 characters.
    pub fn decode(data: &str) -> Result<Vec<u8>> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(data)
            .map_err(|e| DriverError::crypto(format!("base64 decode error: {}", e)))
    }

    pub fn encode_standard(data: &[u8]) -> String {
        use base64::engine::general_purpose::STANDARD;
        STANDARD.encode(data)
    }

    pub fn decode_standard(data: &str) -> Result<Vec<u8>> {
        use base64::engine::general_purpose::STANDARD;
        STANDARD
            .decode(data)
            .map_err(|e| DriverError::crypto(format!("base64 decode error: {}", e)))
    }
}

/// PEM encoder/decoder for private keys, CSRs, and certificate chains.
pub struct PemEncoding;

impl PemEncoding {
    pub fn encode(data: &[u8], label: &str) -> String {
        let pem = pem::Pem::new(label.to_string(), data.to_vec());
        pem::encode(&pem)
    }

    pub fn decode(pem_data: &str) -> Result<(String, Vec<u8>)> {
        let pem =
            pem::parse(pem_data).map_err(|e| DriverError::pem(format!("PEM parse error: {}", e)))?;
        Ok((pem.tag().to_string(), pem.contents().to_vec()))
    }

    pub fn is_valid(data: &str) -> bool {
        pem::parse(data).is_ok()
    }

    pub fn extract_data(pem_data: &str, expected_label: Option<&str>) -> Result<Vec<u8>> {
        let (label, data) = Self::decode(pem_data)?;
        if let Some(expected) = expected_label {
            if label != expected {
                return Err(DriverError::pem(format!(
                    "expected PEM label '{}', got '{}'",
                    expected, label
                )));
            }
        }
        Ok(data)
    }

    /// Splits a PEM bundle into each contained `CERTIFICATE` block's DER
    /// bytes, in order (leaf first). Used to decompose a downloaded
    /// certificate chain into its component certificates.
    pub fn split_certificates(pem_data: &str) -> Result<Vec<Vec<u8>>> {
        let items = pem::parse_many(pem_data.as_bytes())
            .map_err(|e| DriverError::pem(format!("PEM parse error: {}", e)))?;
        let certs: Vec<Vec<u8>> = items
            .into_iter()
            .filter(|p| p.tag() == "CERTIFICATE")
            .map(|p| p.contents().to_vec())
            .collect();
        if certs.is_empty() {
            return Err(DriverError::pem("no certificates found in PEM bundle"));
        }
        Ok(certs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_encode_decode_roundtrip() {
        let data = b"hello world";
        let encoded = Base64Encoding::encode(data);
        let decoded = Base64Encoding::decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn base64_decode_handles_all_length_classes() {
        // Exercise inputs whose base64 length mod 4 is 0, 2, and 3 -
        // the classes that previously tripped the padding-insertion bug.
        for data in [&b""[..], &b"f"[..], &b"fo"[..], &b"foo"[..], &b"foob"[..]] {
            let encoded = Base64Encoding::encode(data);
            let decoded = Base64Encoding::decode(&encoded).unwrap();
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn base64_url_safe_alphabet() {
        let data = b"\xfb\xff\xfe";
        let encoded = Base64Encoding::encode(data);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn pem_encode_decode_roundtrip() {
        let data = b"test data";
        let pem = PemEncoding::encode(data, "TEST");
        assert!(pem.contains("-----BEGIN TEST-----"));
        assert!(pem.contains("-----END TEST-----"));
        let (label, decoded) = PemEncoding::decode(&pem).unwrap();
        assert_eq!(label, "TEST");
        assert_eq!(decoded, data);
    }
}
