//! # acmed — a restart-resumable ACME v2 renewal driver
//!
//! Drives RFC 8555 order issuance and renewal for a set of managed domains
//! (MDs): newOrder through authorization, challenge response, finalization,
//! and certificate download, persisting enough state after every network
//! call that a killed process resumes mid-order rather than restarting it.
//!
//! ## Layout
//!
//! - [`store`] — grouped, atomic persistence (`DOMAINS`/`STAGING`/
//!   `CHALLENGES`/`ACCOUNTS`/`TMP`/`OCSP`).
//! - [`protocol`] and [`transport`] — ACME directory/nonce/JWS wire
//!   plumbing and the signed-request transport with retry.
//! - [`crypto`] and [`certificate`] — key material, JWS signing, and
//!   issued-chain parsing/verification.
//! - [`account`] — account registration and reuse (§4.4).
//! - [`challenge`] and [`authz`] — per-type challenge responders and the
//!   authorization sub-driver that drives one to a terminal state (§4.5).
//! - [`order`] — the order driver state machine (§4.6).
//! - [`renewal`] — the supervisor that ticks over every MD (§4.7).
//! - [`status`] and [`server`] — the read-only status/health/metrics view.
//! - [`config`] — layered TOML + environment configuration.
//!
//! This crate never acts as an ACME *server*; it is only ever a client
//! driving renewal against an external CA.

pub mod account;
pub mod authz;
pub mod certificate;
pub mod challenge;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod order;
pub mod protocol;
pub mod renewal;
pub mod server;
pub mod status;
pub mod store;
pub mod transport;
pub mod types;

pub use account::{Account, AccountManager, ExternalAccountBinding};
pub use authz::AuthorizationDriver;
pub use certificate::CertificateChain;
pub use challenge::{ChallengeRegistry, ChallengeResponder, Dns01Responder, Http01Responder, TlsAlpn01Responder};
pub use config::{Config, ManagedDomainConfig};
pub use crypto::{Base64Encoding, KeyMaterial, KeySpec, PemEncoding};
pub use error::{DriverError, Result};
pub use order::{Authorization, Challenge, FinalizationRequest, ManagedDomain, NewOrderRequest, Order, OrderDriver};
pub use protocol::{AccountIdentity, Directory, DirectoryManager, NonceManager};
pub use renewal::{ManagedDomainSpec, RenewalOutcome, RenewalSupervisor};
pub use store::{FileStore, Group, MemoryStore, Store};
pub use transport::{AcmeTransport, HttpClient};
pub use types::{AuthorizationStatus, ChallengeType, Identifier, Jwk, MdState, OrderStatus};

/// Commonly used types for binaries embedding this crate.
pub mod prelude {
    pub use crate::{
        account::{Account, AccountManager, ExternalAccountBinding},
        certificate::CertificateChain,
        config::Config,
        crypto::{KeyMaterial, KeySpec},
        error::{DriverError, Result},
        order::{ManagedDomain, OrderDriver},
        renewal::{ManagedDomainSpec, RenewalSupervisor},
        store::{Group, Store},
        types::ChallengeType,
    };
}
