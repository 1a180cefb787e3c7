//! Signing: JWS request signing over an account/certificate key, and the
//! HMAC-SHA256 signer used for External Account Binding.

use crate::crypto::encoding::Base64Encoding;
use crate::crypto::keypair::KeyMaterial;
use crate::error::{DriverError, Result};
use crate::types::Jwk;
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;

/// A signature over JWS signing input, ready to go into the `signature`
/// member of a flattened JWS.
#[derive(Debug, Clone)]
pub struct Signature {
    pub data: Vec<u8>,
    pub algorithm: &'static str,
}

impl Signature {
    pub fn to_base64(&self) -> String {
        Base64Encoding::encode(&self.data)
    }
}

/// Signs JWS signing input (`base64url(header) + "." + base64url(payload)`)
/// with an account or certificate [`KeyMaterial`].
pub struct JwsSigner<'a> {
    key: &'a KeyMaterial,
}

impl<'a> JwsSigner<'a> {
    pub fn new(key: &'a KeyMaterial) -> Self {
        Self { key }
    }

    pub fn algorithm(&self) -> &'static str {
        self.key.spec().jwa_algorithm()
    }

    pub fn sign(&self, signing_input: &[u8]) -> Result<Signature> {
        let data = self.key.sign(signing_input)?;
        Ok(Signature {
            data,
            algorithm: self.algorithm(),
        })
    }
}

/// HMAC-SHA256 signer for External Account Binding, keyed by the MAC key
/// the CA issued out of band alongside the `kid`.
pub struct EabSigner {
    key: Vec<u8>,
}

impl EabSigner {
    pub fn new(mac_key: Vec<u8>) -> Self {
        Self { key: mac_key }
    }

    pub fn sign(&self, signing_input: &[u8]) -> Result<Signature> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| DriverError::crypto(format!("invalid EAB MAC key: {}", e)))?;
        mac.update(signing_input);
        Ok(Signature {
            data: mac.finalize().into_bytes().to_vec(),
            algorithm: "HS256",
        })
    }
}

/// RFC 7638 JWK thumbprint: SHA-256 over the JWK's required members only,
/// serialized with sorted keys and no insignificant whitespace.
pub fn jwk_thumbprint(jwk: &Jwk) -> Result<String> {
    let canonical = canonical_jwk_json(jwk)?;
    let digest = crate::crypto::hash::Sha256Hash::hash(canonical.as_bytes())?;
    Ok(Base64Encoding::encode(&digest))
}

fn canonical_jwk_json(jwk: &Jwk) -> Result<String> {
    let get = |k: &str| -> Result<String> {
        jwk.params
            .get(k)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| DriverError::crypto(format!("JWK missing required member '{}'", k)))
    };
    match jwk.kty.as_str() {
        "EC" => {
            let crv = get("crv")?;
            let x = get("x")?;
            let y = get("y")?;
            Ok(format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                crv, x, y
            ))
        }
        "RSA" => {
            let e = get("e")?;
            let n = get("n")?;
            Ok(format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n))
        }
        other => Err(DriverError::crypto(format!(
            "unsupported key type for thumbprint: {}",
            other
        ))),
    }
}
