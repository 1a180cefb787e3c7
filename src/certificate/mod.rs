//! Issued certificate chain parsing and post-issuance verification (§4.6).
pub mod chain;

pub use chain::CertificateChain;
