//! Wire-level ACME protocol plumbing: directory discovery, nonce handling,
//! and JWS request construction. Higher-level request/retry policy lives in
//! `transport`.
pub mod directory;
pub mod jws;
pub mod nonce;

pub use directory::{Directory, DirectoryManager, DirectoryMeta};
pub use jws::{AccountIdentity, JwsBuilder};
pub use nonce::NonceManager;
