//! DNS-01 responder: publishes `_acme-challenge.<domain>` TXT records
//! through a pluggable [`DnsProvider`], then confirms propagation with a
//! real DNS lookup before telling the authorization sub-driver it's safe
//! to ask the CA to validate (§4.5: "local confirmation precedes every
//! CA-facing readiness POST").

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::ChallengeResponder;
use crate::error::Result;
use crate::types::ChallengeType;

/// Manages TXT records at a DNS provider. Implementations own their own
/// API credentials and rate limiting.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Creates (or replaces) the TXT record at `name` with `value`,
    /// returning a provider-specific handle used to delete it later.
    async fn create_txt_record(&self, name: &str, value: &str) -> Result<String>;

    async fn delete_txt_record(&self, name: &str, record_id: &str) -> Result<()>;
}

/// In-memory provider for tests and the local driver scenarios.
#[derive(Default)]
pub struct MockDnsProvider {
    records: RwLock<HashMap<String, String>>,
    next_id: RwLock<u64>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, name: &str) -> Option<String> {
        self.records.read().await.get(name).cloned()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn create_txt_record(&self, name: &str, value: &str) -> Result<String> {
        let mut id = self.next_id.write().await;
        *id += 1;
        self.records.write().await.insert(name.to_string(), value.to_string());
        Ok(format!("mock-{}", id))
    }

    async fn delete_txt_record(&self, name: &str, _record_id: &str) -> Result<()> {
        self.records.write().await.remove(name);
        Ok(())
    }
}

/// DNS-01 record value: `base64url(SHA-256(keyAuthorization))` per RFC
/// 8555 §8.4.
fn record_value(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn record_name(identifier: &str) -> String {
    format!("_acme-challenge.{}", identifier)
}

pub struct Dns01Responder {
    provider: Arc<dyn DnsProvider>,
    resolver: TokioResolver,
    record_ids: RwLock<HashMap<String, String>>,
}

impl Dns01Responder {
    pub fn new(provider: Arc<dyn DnsProvider>) -> Result<Self> {
        let resolver = TokioResolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build();
        Ok(Self {
            provider,
            resolver,
            record_ids: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_mock() -> Self {
        Self::new(Arc::new(MockDnsProvider::new())).expect("default resolver config is infallible")
    }

    /// Resolves the TXT record for `identifier` and checks whether any
    /// returned value matches the expected challenge digest.
    async fn propagated(&self, identifier: &str, expected: &str) -> Result<bool> {
        let name = record_name(identifier);
        // NXDOMAIN/no-records is the expected state before the record has
        // propagated, not a hard error: the authorization sub-driver polls
        // this repeatedly, so we report "not yet" rather than fail the order.
        let Ok(lookup) = self.resolver.txt_lookup(name).await else {
            return Ok(false);
        };
        Ok(lookup.iter().any(|txt| {
            txt.iter().map(|chunk| String::from_utf8_lossy(chunk)).collect::<String>() == expected
        }))
    }
}

#[async_trait]
impl ChallengeResponder for Dns01Responder {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Dns01
    }

    async fn install(&self, identifier: &str, token: &str, key_authorization: &str) -> Result<()> {
        let name = record_name(identifier);
        let value = record_value(key_authorization);
        let id = self.provider.create_txt_record(&name, &value).await?;
        self.record_ids.write().await.insert(token.to_string(), id);
        Ok(())
    }

    async fn confirm(&self, identifier: &str, _token: &str, key_authorization: &str) -> Result<bool> {
        let expected = record_value(key_authorization);
        self.propagated(identifier, &expected).await
    }

    async fn remove(&self, identifier: &str, token: &str) -> Result<()> {
        if let Some(id) = self.record_ids.write().await.remove(token) {
            let name = record_name(identifier);
            self.provider.delete_txt_record(&name, &id).await?;
        }
        Ok(())
    }
}
