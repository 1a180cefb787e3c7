//! Challenge responders: one `ChallengeResponder` implementation per
//! challenge type, registered in a registry keyed by [`ChallengeType`]
//! (§4.5). The authorization sub-driver installs a response, waits for
//! local confirmation, tells the CA it's ready, then removes the
//! response once the authorization reaches a terminal state.

use crate::error::Result;
use crate::types::ChallengeType;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod dns01;
pub mod http01;
pub mod tls_alpn01;

pub use dns01::{Dns01Responder, DnsProvider, MockDnsProvider};
pub use http01::Http01Responder;
pub use tls_alpn01::TlsAlpn01Responder;

/// Installs, locally confirms, and removes a challenge response for one
/// identifier at a time. Implementations must tolerate `install` being
/// called for several identifiers concurrently (multi-name orders).
#[async_trait]
pub trait ChallengeResponder: Send + Sync {
    fn challenge_type(&self) -> ChallengeType;

    /// Makes the key authorization observable at the challenge point
    /// (serves it over HTTP, publishes the TXT record, presents the
    /// self-signed cert).
    async fn install(&self, identifier: &str, token: &str, key_authorization: &str) -> Result<()>;

    /// Locally confirms the response is observable before telling the CA
    /// to validate — for DNS-01 this means resolving the TXT record.
    async fn confirm(&self, identifier: &str, token: &str, key_authorization: &str) -> Result<bool>;

    /// Removes the response material, regardless of outcome.
    async fn remove(&self, identifier: &str, token: &str) -> Result<()>;
}

/// Maps each configured challenge type to its responder.
#[derive(Default, Clone)]
pub struct ChallengeRegistry {
    responders: HashMap<ChallengeType, Arc<dyn ChallengeResponder>>,
}

impl ChallengeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, responder: Arc<dyn ChallengeResponder>) {
        self.responders.insert(responder.challenge_type(), responder);
    }

    pub fn get(&self, challenge_type: ChallengeType) -> Option<Arc<dyn ChallengeResponder>> {
        self.responders.get(&challenge_type).cloned()
    }

    pub fn supported_types(&self) -> Vec<ChallengeType> {
        self.responders.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullResponder(ChallengeType);

    #[async_trait]
    impl ChallengeResponder for NullResponder {
        fn challenge_type(&self) -> ChallengeType {
            self.0
        }
        async fn install(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn confirm(&self, _: &str, _: &str, _: &str) -> Result<bool> {
            Ok(true)
        }
        async fn remove(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registry_looks_up_by_challenge_type() {
        let mut registry = ChallengeRegistry::new();
        registry.register(Arc::new(NullResponder(ChallengeType::Http01)));
        assert!(registry.get(ChallengeType::Http01).is_some());
        assert!(registry.get(ChallengeType::Dns01).is_none());
        assert_eq!(registry.supported_types(), vec![ChallengeType::Http01]);
    }
}
