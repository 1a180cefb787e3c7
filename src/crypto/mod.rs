//! Cryptographic primitives: key generation, signing, hashing, encoding.

pub mod encoding;
pub mod hash;
pub mod keypair;
pub mod signer;

pub use encoding::{Base64Encoding, PemEncoding};
pub use hash::{HashAlgorithm, Sha256Hash};
pub use keypair::{KeyMaterial, KeySpec};
pub use signer::{jwk_thumbprint, JwsSigner};
