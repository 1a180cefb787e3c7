use acmed::challenge::ChallengeResponder;
use acmed::crypto::keypair::{KeyMaterial, KeySpec};
use acmed::order::ManagedDomain;
use acmed::store::{Group, Store};
use acmed::transport::{AcmeTransport, HttpClient, HttpClientConfig, RetryPolicy};
use acmed::types::ChallengeType;
use acmed::ChallengeRegistry;
use async_trait::async_trait;
use mockito::Server;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct MockAcmeServer {
    pub server: mockito::ServerGuard,
}

impl MockAcmeServer {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub async fn mock_directory(&mut self) -> mockito::Mock {
        let url = self.url();
        self.server
            .mock("GET", "/directory")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "newNonce": format!("{}/new-nonce", url),
                    "newAccount": format!("{}/new-account", url),
                    "newOrder": format!("{}/new-order", url),
                    "revokeCert": format!("{}/revoke-cert", url),
                    "keyChange": format!("{}/key-change", url),
                    "meta": {
                        "termsOfService": "https://example.com/tos"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_new_nonce(&mut self) -> mockito::Mock {
        self.server
            .mock("HEAD", "/new-nonce")
            .with_status(200)
            .with_header("replay-nonce", "test-nonce-123")
            .create_async()
            .await
    }

    pub async fn mock_new_account(&mut self) -> mockito::Mock {
        self.server
            .mock("POST", "/new-account")
            .with_status(201)
            .with_header("location", &format!("{}/account/1", self.url()))
            .with_body(
                json!({
                    "status": "valid",
                    "contact": ["mailto:admin@example.com"],
                    "orders": format!("{}/account/1/orders", self.url())
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    /// `/order/1` that always reports `status`, with the given
    /// `authorizations`/`finalize` URLs. Callers needing a pending-then-ready
    /// transition create the "ready" instance first and the "pending" one
    /// second (mockito matches the most-recently-created mock first), with
    /// `.expect(1)` on the earlier one so it's consumed exactly once.
    pub async fn mock_order(&mut self, status: &str, authorizations: &[String], finalize_url: &str, certificate_url: Option<&str>) -> mockito::Mock {
        self.server
            .mock("POST", "/order/1")
            .with_status(200)
            .with_header("replay-nonce", "n-order")
            .with_body(
                json!({
                    "status": status,
                    "expires": "2099-01-01T00:00:00Z",
                    "identifiers": [],
                    "authorizations": authorizations,
                    "finalize": finalize_url,
                    "certificate": certificate_url,
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_authz(&mut self, status: &str, challenge_url: &str, token: &str) -> mockito::Mock {
        self.server
            .mock("POST", "/authz/1")
            .with_status(200)
            .with_header("replay-nonce", "n-authz")
            .with_body(
                json!({
                    "identifier": {"type": "dns", "value": "a.test"},
                    "status": status,
                    "expires": "2099-01-01T00:00:00Z",
                    "challenges": [{
                        "type": "http-01",
                        "url": challenge_url,
                        "status": status,
                        "token": token,
                    }],
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    /// An `invalid` authorization with one challenge carrying the terminal
    /// error RFC 8555 attaches to the failed challenge, not the authorization.
    pub async fn mock_authz_invalid(&mut self, challenge_url: &str, token: &str) -> mockito::Mock {
        self.server
            .mock("POST", "/authz/1")
            .with_status(200)
            .with_header("replay-nonce", "n-authz")
            .with_body(
                json!({
                    "identifier": {"type": "dns", "value": "a.test"},
                    "status": "invalid",
                    "expires": "2099-01-01T00:00:00Z",
                    "challenges": [{
                        "type": "http-01",
                        "url": challenge_url,
                        "status": "invalid",
                        "token": token,
                        "error": {
                            "type": "urn:ietf:params:acme:error:incorrectResponse",
                            "detail": "response did not match expected token",
                        },
                    }],
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_challenge_ready(&mut self) -> mockito::Mock {
        self.server
            .mock("POST", "/chall/1")
            .with_status(200)
            .with_header("replay-nonce", "n-chall")
            .with_body("{}")
            .create_async()
            .await
    }

    pub async fn mock_finalize(&mut self, status: &str, certificate_url: &str) -> mockito::Mock {
        self.server
            .mock("POST", "/finalize/1")
            .with_status(200)
            .with_header("replay-nonce", "n-finalize")
            .with_body(
                json!({
                    "status": status,
                    "expires": "2099-01-01T00:00:00Z",
                    "identifiers": [],
                    "authorizations": [],
                    "finalize": format!("{}/finalize/1", self.url()),
                    "certificate": certificate_url,
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_certificate(&mut self, pem_chain: &str) -> mockito::Mock {
        self.server
            .mock("POST", "/cert/1")
            .with_status(200)
            .with_header("replay-nonce", "n-cert")
            .with_header("content-type", "application/pem-certificate-chain")
            .with_body(pem_chain)
            .create_async()
            .await
    }

    pub async fn mock_new_order_rate_limited(&mut self) -> mockito::Mock {
        self.server
            .mock("POST", "/new-order")
            .with_status(429)
            .with_header("retry-after", "600")
            .with_header("content-type", "application/problem+json")
            .with_body(
                json!({
                    "type": "urn:ietf:params:acme:error:rateLimited",
                    "detail": "too many new orders for a.test this week",
                })
                .to_string(),
            )
            .create_async()
            .await
    }
}

/// Installs nothing and always confirms: exercises the authorization
/// sub-driver's control flow without binding a real port.
pub struct AlwaysReadyResponder(pub ChallengeType);

#[async_trait]
impl ChallengeResponder for AlwaysReadyResponder {
    fn challenge_type(&self) -> ChallengeType {
        self.0
    }

    async fn install(&self, _identifier: &str, _token: &str, _key_authorization: &str) -> acmed::Result<()> {
        Ok(())
    }

    async fn confirm(&self, _identifier: &str, _token: &str, _key_authorization: &str) -> acmed::Result<bool> {
        Ok(true)
    }

    async fn remove(&self, _identifier: &str, _token: &str) -> acmed::Result<()> {
        Ok(())
    }
}

pub fn registry_with_http01() -> ChallengeRegistry {
    let mut registry = ChallengeRegistry::new();
    registry.register(Arc::new(AlwaysReadyResponder(ChallengeType::Http01)));
    registry
}

pub fn managed_domain(name: &str, domains: &[&str]) -> ManagedDomain {
    ManagedDomain {
        name: name.to_string(),
        domains: domains.iter().map(|d| d.to_string()).collect(),
        key_spec: KeySpec::EcdsaP256,
        challenge_types: vec![ChallengeType::Http01],
        monitor_timeout: Duration::from_secs(30),
    }
}

/// An `AcmeTransport` pointed at a mock CA's `new-nonce` endpoint, with the
/// retry policy a test cares about.
pub fn transport(base_url: &str, retry: RetryPolicy) -> AcmeTransport {
    let http = HttpClient::new(HttpClientConfig::default()).unwrap();
    let nonces = acmed::protocol::NonceManager::new(format!("{}/new-nonce", base_url), reqwest::Client::new());
    AcmeTransport::new(http, nonces, retry)
}

pub fn directory_manager(base_url: &str) -> acmed::protocol::DirectoryManager {
    acmed::protocol::DirectoryManager::new(format!("{}/directory", base_url), reqwest::Client::new())
}

/// Seeds STAGING as though a prior run already created an order: a fresh
/// key, its CSR, and an `order.json` pointing at `order_url`. `OrderDriver`
/// sees this on `load_or_start` and refreshes it instead of calling
/// `newOrder`, so the certificate key this test generates is the one the
/// mock CA must sign over at `/cert/1`.
pub async fn seed_staging_order(store: &Arc<dyn Store>, md: &ManagedDomain, order_url: &str) -> KeyMaterial {
    let cert_key = KeyMaterial::generate(md.key_spec).unwrap();
    let csr_der = acmed::order::build_csr(&md.domains, &cert_key).unwrap();

    store.write(Group::Staging, &md.name, "privkey.pem", cert_key.to_pkcs8_pem().as_bytes()).await.unwrap();
    store.write(Group::Staging, &md.name, "csr.der", &csr_der).await.unwrap();

    let order_json = json!({
        "order_url": order_url,
        "status": "pending",
        "authorizations": [],
        "finalize_url": "",
        "certificate_url": null,
    });
    store
        .write(Group::Staging, &md.name, "order.json", serde_json::to_vec(&order_json).unwrap().as_slice())
        .await
        .unwrap();

    cert_key
}

/// A self-signed leaf PEM whose key matches `key` and whose SAN set is
/// `domains`, as if a CA had just issued it over the CSR staged above.
pub fn issue_matching_chain(domains: &[String], key: &KeyMaterial) -> String {
    let params = rcgen::CertificateParams::new(domains.to_vec()).unwrap();
    let key_pair = key.to_rcgen_keypair().unwrap();
    params.self_signed(&key_pair).unwrap().pem()
}
