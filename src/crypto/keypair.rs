//! Key generation and representation for account keys and certificate keys.
//!
//! A single [`KeyMaterial`] type serves both roles: the ACME account key
//! (always used to sign JWS requests) and the per-MD certificate key (used
//! only to build the CSR and to verify the issued leaf's public key
//! matches). Both are PKCS#8-encoded private keys tagged with the
//! [`KeySpec`] that produced them, since PKCS#8 alone does not disambiguate
//! the curve/size choices this crate's config exposes.

use crate::crypto::encoding::{Base64Encoding, PemEncoding};
use crate::error::{DriverError, Result};
use crate::types::Jwk;
use ring::signature::KeyPair as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key algorithm and size/curve, as accepted by the account manager and CSR
/// builder (RSA 2048/3072/4096, ECDSA P-256/P-384).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeySpec {
    EcdsaP256,
    EcdsaP384,
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

impl Default for KeySpec {
    fn default() -> Self {
        KeySpec::EcdsaP256
    }
}

impl KeySpec {
    /// The JWS `alg` value a key generated under this spec signs with.
    pub fn jwa_algorithm(&self) -> &'static str {
        match self {
            KeySpec::EcdsaP256 => "ES256",
            KeySpec::EcdsaP384 => "ES384",
            KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096 => "RS256",
        }
    }

    pub fn rsa_bits(&self) -> Option<usize> {
        match self {
            KeySpec::Rsa2048 => Some(2048),
            KeySpec::Rsa3072 => Some(3072),
            KeySpec::Rsa4096 => Some(4096),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySpec::EcdsaP256 => write!(f, "ECDSA-P256"),
            KeySpec::EcdsaP384 => write!(f, "ECDSA-P384"),
            KeySpec::Rsa2048 => write!(f, "RSA-2048"),
            KeySpec::Rsa3072 => write!(f, "RSA-3072"),
            KeySpec::Rsa4096 => write!(f, "RSA-4096"),
        }
    }
}

impl std::str::FromStr for KeySpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ecdsa-p256" | "p256" | "P-256" => Ok(KeySpec::EcdsaP256),
            "ecdsa-p384" | "p384" | "P-384" => Ok(KeySpec::EcdsaP384),
            "rsa2048" | "rsa-2048" => Ok(KeySpec::Rsa2048),
            "rsa3072" | "rsa-3072" => Ok(KeySpec::Rsa3072),
            "rsa4096" | "rsa-4096" => Ok(KeySpec::Rsa4096),
            other => Err(format!("unsupported key spec: {}", other)),
        }
    }
}

/// A PKCS#8-encoded private key together with the spec it was generated
/// under. `Debug` is intentionally not derived over the key bytes.
pub struct KeyMaterial {
    spec: KeySpec,
    pkcs8_der: Vec<u8>,
}

impl KeyMaterial {
    pub fn spec(&self) -> KeySpec {
        self.spec
    }

    /// Generates a fresh key under the given spec.
    pub fn generate(spec: KeySpec) -> Result<Self> {
        let pkcs8_der = match spec {
            KeySpec::EcdsaP256 => ring::signature::EcdsaKeyPair::generate_pkcs8(
                &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                &ring::rand::SystemRandom::new(),
            )
            .map_err(|e| DriverError::crypto(format!("EC key generation failed: {:?}", e)))?
            .as_ref()
            .to_vec(),
            KeySpec::EcdsaP384 => ring::signature::EcdsaKeyPair::generate_pkcs8(
                &ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING,
                &ring::rand::SystemRandom::new(),
            )
            .map_err(|e| DriverError::crypto(format!("EC key generation failed: {:?}", e)))?
            .as_ref()
            .to_vec(),
            KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096 => {
                use rsa::pkcs8::EncodePrivateKey;
                let bits = spec.rsa_bits().unwrap();
                let mut rng = rsa::rand_core::OsRng;
                let key = rsa::RsaPrivateKey::new(&mut rng, bits)
                    .map_err(|e| DriverError::crypto(format!("RSA key generation failed: {}", e)))?;
                key.to_pkcs8_der()
                    .map_err(|e| DriverError::crypto(format!("RSA PKCS8 encode failed: {}", e)))?
                    .as_bytes()
                    .to_vec()
            }
        };
        Ok(Self { spec, pkcs8_der })
    }

    /// Loads a key from a PKCS#8 PEM, given the spec it was generated under
    /// (persisted alongside it in the account/order metadata, since PKCS#8
    /// alone under-specifies RSA key size).
    pub fn from_pkcs8_pem(pem: &str, spec: KeySpec) -> Result<Self> {
        let pkcs8_der = PemEncoding::extract_data(pem, Some("PRIVATE KEY"))?;
        Ok(Self { spec, pkcs8_der })
    }

    pub fn to_pkcs8_pem(&self) -> String {
        PemEncoding::encode(&self.pkcs8_der, "PRIVATE KEY")
    }

    /// Signs `msg`, returning raw (non-DER) signature bytes suitable for
    /// direct base64url encoding into a JWS: fixed-width `r||s` for ECDSA,
    /// PKCS#1 v1.5 for RSA.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        match self.spec {
            KeySpec::EcdsaP256 => {
                let key_pair = ring::signature::EcdsaKeyPair::from_pkcs8(
                    &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                    &self.pkcs8_der,
                    &ring::rand::SystemRandom::new(),
                )
                .map_err(|e| DriverError::crypto(format!("invalid EC key: {:?}", e)))?;
                let sig = key_pair
                    .sign(&ring::rand::SystemRandom::new(), msg)
                    .map_err(|e| DriverError::crypto(format!("EC signing failed: {:?}", e)))?;
                Ok(sig.as_ref().to_vec())
            }
            KeySpec::EcdsaP384 => {
                let key_pair = ring::signature::EcdsaKeyPair::from_pkcs8(
                    &ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING,
                    &self.pkcs8_der,
                    &ring::rand::SystemRandom::new(),
                )
                .map_err(|e| DriverError::crypto(format!("invalid EC key: {:?}", e)))?;
                let sig = key_pair
                    .sign(&ring::rand::SystemRandom::new(), msg)
                    .map_err(|e| DriverError::crypto(format!("EC signing failed: {:?}", e)))?;
                Ok(sig.as_ref().to_vec())
            }
            KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096 => {
                use rsa::pkcs1v15::SigningKey;
                use rsa::pkcs8::DecodePrivateKey;
                use rsa::sha2::Sha256;
                use rsa::signature::Signer as _;
                use rsa::signature::SignatureEncoding as _;
                let private_key = rsa::RsaPrivateKey::from_pkcs8_der(&self.pkcs8_der)
                    .map_err(|e| DriverError::crypto(format!("invalid RSA key: {}", e)))?;
                let signing_key: SigningKey<Sha256> = SigningKey::new(private_key);
                let sig = signing_key.sign(msg);
                Ok(sig.to_vec())
            }
        }
    }

    /// Public JWK for this key, used both in the `jwk` field of account
    /// creation and for RFC 7638 thumbprint computation.
    pub fn public_jwk(&self) -> Result<Jwk> {
        match self.spec {
            KeySpec::EcdsaP256 | KeySpec::EcdsaP384 => {
                let (alg, crv, coord_len): (&ring::signature::EcdsaSigningAlgorithm, &str, usize) =
                    match self.spec {
                        KeySpec::EcdsaP256 => {
                            (&ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING, "P-256", 32)
                        }
                        KeySpec::EcdsaP384 => {
                            (&ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING, "P-384", 48)
                        }
                        _ => unreachable!(),
                    };
                let key_pair = ring::signature::EcdsaKeyPair::from_pkcs8(
                    alg,
                    &self.pkcs8_der,
                    &ring::rand::SystemRandom::new(),
                )
                .map_err(|e| DriverError::crypto(format!("invalid EC key: {:?}", e)))?;
                // Uncompressed SEC1 point: 0x04 || X || Y.
                let public = key_pair.public_key().as_ref();
                if public.len() != 1 + 2 * coord_len || public[0] != 0x04 {
                    return Err(DriverError::crypto("unexpected EC public key encoding"));
                }
                let (x, y) = public[1..].split_at(coord_len);
                let mut params = HashMap::new();
                params.insert("crv".to_string(), serde_json::Value::String(crv.to_string()));
                params.insert("x".to_string(), serde_json::Value::String(Base64Encoding::encode(x)));
                params.insert("y".to_string(), serde_json::Value::String(Base64Encoding::encode(y)));
                Ok(Jwk {
                    kty: "EC".to_string(),
                    use_: None,
                    key_ops: None,
                    params,
                })
            }
            KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096 => {
                use rsa::pkcs8::DecodePrivateKey;
                use rsa::traits::PublicKeyParts;
                let private_key = rsa::RsaPrivateKey::from_pkcs8_der(&self.pkcs8_der)
                    .map_err(|e| DriverError::crypto(format!("invalid RSA key: {}", e)))?;
                let n = private_key.n().to_bytes_be();
                let e = private_key.e().to_bytes_be();
                let mut params = HashMap::new();
                params.insert("n".to_string(), serde_json::Value::String(Base64Encoding::encode(&n)));
                params.insert("e".to_string(), serde_json::Value::String(Base64Encoding::encode(&e)));
                Ok(Jwk {
                    kty: "RSA".to_string(),
                    use_: None,
                    key_ops: None,
                    params,
                })
            }
        }
    }

    /// Builds an `rcgen::KeyPair` sharing this key's PKCS#8 material, for use
    /// when constructing the CSR for an MD's certificate key.
    pub fn to_rcgen_keypair(&self) -> Result<rcgen::KeyPair> {
        rcgen::KeyPair::from_pem(&self.to_pkcs8_pem())
            .map_err(|e| DriverError::crypto(format!("failed to load key into rcgen: {}", e)))
    }

    /// The raw bytes an X.509 certificate's `subjectPublicKey` BIT STRING
    /// carries for this key: the uncompressed SEC1 point for EC, or the
    /// PKCS#1 `RSAPublicKey` DER for RSA. Used to confirm an issued leaf's
    /// public key matches the certificate key the driver holds (§4.6 step
    /// "On VALID... verify... the leaf's public key matches").
    pub fn subject_public_key_bytes(&self) -> Result<Vec<u8>> {
        match self.spec {
            KeySpec::EcdsaP256 | KeySpec::EcdsaP384 => {
                let alg = match self.spec {
                    KeySpec::EcdsaP256 => &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                    KeySpec::EcdsaP384 => &ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING,
                    _ => unreachable!(),
                };
                let key_pair = ring::signature::EcdsaKeyPair::from_pkcs8(
                    alg,
                    &self.pkcs8_der,
                    &ring::rand::SystemRandom::new(),
                )
                .map_err(|e| DriverError::crypto(format!("invalid EC key: {:?}", e)))?;
                Ok(key_pair.public_key().as_ref().to_vec())
            }
            KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096 => {
                use rsa::pkcs1::EncodeRsaPublicKey;
                use rsa::pkcs8::DecodePrivateKey;
                let private_key = rsa::RsaPrivateKey::from_pkcs8_der(&self.pkcs8_der)
                    .map_err(|e| DriverError::crypto(format!("invalid RSA key: {}", e)))?;
                private_key
                    .to_public_key()
                    .to_pkcs1_der()
                    .map_err(|e| DriverError::crypto(format!("RSA public key encode failed: {}", e)))
                    .map(|doc| doc.as_bytes().to_vec())
            }
        }
    }
}
