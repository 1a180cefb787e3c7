//! Flattened JWS construction for ACME requests (RFC 8555 §6.2).

use crate::crypto::keypair::KeyMaterial;
use crate::crypto::signer::JwsSigner as KeySigner;
use crate::crypto::{jwk_thumbprint, Base64Encoding};
use crate::error::Result;
use crate::types::Jwk;
use serde_json::Value;

/// Identifies the request as either the account's first request (carries
/// the full `jwk`) or a subsequent one (carries the account's `kid` URL).
pub enum AccountIdentity<'a> {
    Jwk(&'a Jwk),
    Kid(&'a str),
}

/// Builds flattened-serialization JWS bodies, signing with an account key.
pub struct JwsBuilder<'a> {
    key: &'a KeyMaterial,
}

impl<'a> JwsBuilder<'a> {
    pub fn new(key: &'a KeyMaterial) -> Self {
        Self { key }
    }

    /// Signs `payload` (or, if `None`, the POST-as-GET empty payload) into a
    /// flattened JWS JSON object: `{"protected", "payload", "signature"}`.
    pub fn sign(
        &self,
        url: &str,
        nonce: &str,
        identity: AccountIdentity<'_>,
        payload: Option<&Value>,
    ) -> Result<Value> {
        let signer = KeySigner::new(self.key);
        let mut protected = serde_json::Map::new();
        protected.insert("alg".to_string(), Value::String(signer.algorithm().to_string()));
        match identity {
            AccountIdentity::Jwk(jwk) => {
                protected.insert("jwk".to_string(), serde_json::to_value(jwk)?);
            }
            AccountIdentity::Kid(kid) => {
                protected.insert("kid".to_string(), Value::String(kid.to_string()));
            }
        }
        protected.insert("nonce".to_string(), Value::String(nonce.to_string()));
        protected.insert("url".to_string(), Value::String(url.to_string()));

        let protected_json = Value::Object(protected).to_string();
        let protected_b64 = Base64Encoding::encode(protected_json.as_bytes());
        let payload_b64 = match payload {
            Some(p) => Base64Encoding::encode(p.to_string().as_bytes()),
            None => String::new(),
        };

        let signing_input = format!("{}.{}", protected_b64, payload_b64);
        let signature = signer.sign(signing_input.as_bytes())?;

        Ok(serde_json::json!({
            "protected": protected_b64,
            "payload": payload_b64,
            "signature": signature.to_base64(),
        }))
    }

    /// The `keyAuthorization` value for a given challenge token: the token
    /// plus the account key's RFC 7638 thumbprint, per RFC 8555 §8.1.
    pub fn key_authorization(&self, token: &str) -> Result<String> {
        let jwk = self.key.public_jwk()?;
        let thumbprint = jwk_thumbprint(&jwk)?;
        Ok(format!("{}.{}", token, thumbprint))
    }
}
