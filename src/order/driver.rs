//! The order driver (§4.6): carries a single managed domain from "needs a
//! certificate" to "verified chain staged, ready for activation." Every
//! phase transition is written to STAGING before the next network call, so
//! a fresh process resumes exactly where a prior run left off.

use crate::authz::AuthorizationDriver;
use crate::certificate::CertificateChain;
use crate::challenge::ChallengeRegistry;
use crate::crypto::encoding::Base64Encoding;
use crate::crypto::keypair::{KeyMaterial, KeySpec};
use crate::error::{DriverError, Result};
use crate::order::csr::build_csr;
use crate::order::objects::{FinalizationRequest, NewOrderRequest, Order};
use crate::protocol::{AccountIdentity, DirectoryManager};
use crate::store::{Group, Store};
use crate::transport::AcmeTransport;
use crate::types::ChallengeType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A managed domain as the order driver needs to see it: the identity set
/// plus the per-MD policy §3 attaches to it.
#[derive(Debug, Clone)]
pub struct ManagedDomain {
    pub name: String,
    pub domains: Vec<String>,
    pub key_spec: KeySpec,
    pub challenge_types: Vec<ChallengeType>,
    pub monitor_timeout: Duration,
}

/// Persisted at STAGING/<md>/order.json: everything needed to resume an
/// in-flight order without re-deriving it from the CSR or re-asking the CA.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderState {
    order_url: String,
    status: String,
    authorizations: Vec<String>,
    finalize_url: String,
    #[serde(default)]
    certificate_url: Option<String>,
}

pub struct OrderDriver<'a> {
    store: Arc<dyn Store>,
    transport: &'a AcmeTransport,
    directory: &'a DirectoryManager,
    responders: &'a ChallengeRegistry,
}

impl<'a> OrderDriver<'a> {
    pub fn new(
        store: Arc<dyn Store>,
        transport: &'a AcmeTransport,
        directory: &'a DirectoryManager,
        responders: &'a ChallengeRegistry,
    ) -> Self {
        Self { store, transport, directory, responders }
    }

    /// Drives `md` to a verified, staged certificate chain. `account_kid` is
    /// the account URL used as the JWS `kid` for every request.
    pub async fn drive(
        &self,
        md: &ManagedDomain,
        account_key: &KeyMaterial,
        account_kid: &str,
    ) -> Result<CertificateChain> {
        let deadline = Instant::now() + md.monitor_timeout;

        let mut state = self.load_or_start(md, account_key, account_kid).await?;

        if state.status == "pending" {
            self.complete_authorizations(md, &state, account_key, account_kid, deadline).await?;
            state = self.refresh_order(md, &state.order_url, account_key, account_kid).await?;
        }

        if state.status == "ready" {
            state = self.finalize(md, &state, account_key, account_kid).await?;
        }

        if state.status == "processing" {
            state = self.poll_until_terminal(md, &state, account_key, account_kid, deadline).await?;
        }

        match state.status.as_str() {
            "valid" => self.install_certificate(md, &state, account_key, account_kid).await,
            "invalid" => {
                self.store.remove_all(Group::Staging, &md.name).await?;
                Err(DriverError::ChallengeFailed(crate::error::ProblemDetail {
                    problem_type: String::new(),
                    detail: format!("order for {} went invalid during finalization", md.name),
                }))
            }
            other => Err(DriverError::transient(format!("unexpected order status {}", other))),
        }
    }

    /// §4.6 entry rule: load a stored order, refresh it, and decide whether
    /// it's still usable or must be abandoned and restarted from `newOrder`.
    async fn load_or_start(&self, md: &ManagedDomain, account_key: &KeyMaterial, account_kid: &str) -> Result<OrderState> {
        match self.load_state(&md.name).await {
            Ok(Some(state)) => match self.refresh_order(md, &state.order_url, account_key, account_kid).await {
                Ok(refreshed) => Ok(refreshed),
                Err(_) => self.start_new_order(md, account_key, account_kid).await,
            },
            // Any outcome other than a clean "no order on disk" is treated
            // as unusable: corrupt state is abandoned, not repaired.
            Ok(None) => self.start_new_order(md, account_key, account_kid).await,
            Err(DriverError::Corrupt(_)) => self.start_new_order(md, account_key, account_kid).await,
            Err(e) => Err(e),
        }
    }

    async fn load_state(&self, name: &str) -> Result<Option<OrderState>> {
        let Some(bytes) = self.store.read(Group::Staging, name, "order.json").await? else {
            return Ok(None);
        };
        let state = serde_json::from_slice(&bytes).map_err(|e| DriverError::corrupt(format!("order.json: {}", e)))?;
        Ok(Some(state))
    }

    async fn persist_state(&self, name: &str, state: &OrderState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.store.write(Group::Staging, name, "order.json", &bytes).await
    }

    /// Purges any prior STAGING record, generates a fresh key + CSR, and
    /// issues `newOrder`. The CSR is persisted immediately so it survives a
    /// restart and is never regenerated while this order is alive (§4.6:
    /// regenerating on restart would burn rate-limit budget for nothing).
    async fn start_new_order(&self, md: &ManagedDomain, account_key: &KeyMaterial, account_kid: &str) -> Result<OrderState> {
        self.store.remove_all(Group::Staging, &md.name).await?;

        let cert_key = KeyMaterial::generate(md.key_spec)?;
        let csr_der = build_csr(&md.domains, &cert_key)?;
        self.store.write(Group::Staging, &md.name, "privkey.pem", cert_key.to_pkcs8_pem().as_bytes()).await?;
        self.store.write(Group::Staging, &md.name, "csr.der", &csr_der).await?;

        let directory = self.directory.get().await?;
        let request = NewOrderRequest::new(md.domains.clone());
        let payload = serde_json::to_value(&request)?;
        let resp = self
            .transport
            .post_signed(&directory.new_order, account_key, AccountIdentity::Kid(account_kid), Some(&payload))
            .await?;

        let order_url = resp
            .headers
            .get("location")
            .cloned()
            .ok_or_else(|| DriverError::fatal("newOrder response missing Location header"))?;
        let order: Order = resp.json()?;

        let state = OrderState {
            order_url,
            status: order.status,
            authorizations: order.authorizations,
            finalize_url: order.finalize,
            certificate_url: order.certificate,
        };
        self.persist_state(&md.name, &state).await?;
        Ok(state)
    }

    /// POST-as-GET refresh of the order resource. A 404 or `invalid` makes
    /// the caller restart from `newOrder` (signaled via `Err`).
    async fn refresh_order(&self, md: &ManagedDomain, order_url: &str, account_key: &KeyMaterial, account_kid: &str) -> Result<OrderState> {
        let resp = self
            .transport
            .post_signed(order_url, account_key, AccountIdentity::Kid(account_kid), None)
            .await?;
        let order: Order = resp.json()?;
        if order.status == "invalid" {
            return Err(DriverError::transient("order is invalid, restarting"));
        }
        let state = OrderState {
            order_url: order_url.to_string(),
            status: order.status,
            authorizations: order.authorizations,
            finalize_url: order.finalize,
            certificate_url: order.certificate,
        };
        self.persist_state(&md.name, &state).await?;
        Ok(state)
    }

    async fn complete_authorizations(
        &self,
        md: &ManagedDomain,
        state: &OrderState,
        account_key: &KeyMaterial,
        account_kid: &str,
        deadline: Instant,
    ) -> Result<()> {
        let authz_driver = AuthorizationDriver::new(self.transport, self.responders);
        for authz_url in &state.authorizations {
            authz_driver.run(authz_url, account_key, account_kid, &md.challenge_types, deadline).await?;
        }
        Ok(())
    }

    async fn finalize(&self, md: &ManagedDomain, state: &OrderState, account_key: &KeyMaterial, account_kid: &str) -> Result<OrderState> {
        let Some(csr_der) = self.store.read(Group::Staging, &md.name, "csr.der").await? else {
            return Err(DriverError::corrupt("missing staged CSR at finalize time"));
        };
        let payload = serde_json::to_value(FinalizationRequest { csr: Base64Encoding::encode(&csr_der) })?;
        let resp = self
            .transport
            .post_signed(&state.finalize_url, account_key, AccountIdentity::Kid(account_kid), Some(&payload))
            .await?;
        let order: Order = resp.json()?;
        let updated = OrderState {
            order_url: state.order_url.clone(),
            status: order.status,
            authorizations: order.authorizations,
            finalize_url: order.finalize,
            certificate_url: order.certificate,
        };
        self.persist_state(&md.name, &updated).await?;
        Ok(updated)
    }

    /// §4.6: poll the order with the same back-off shape as §4.5, bounded
    /// by `deadline`, until it reaches `valid` or `invalid`.
    async fn poll_until_terminal(
        &self,
        md: &ManagedDomain,
        state: &OrderState,
        account_key: &KeyMaterial,
        account_kid: &str,
        deadline: Instant,
    ) -> Result<OrderState> {
        let mut delay = Duration::from_secs(1);
        let mut current = state.clone();
        loop {
            if matches!(current.status.as_str(), "valid" | "invalid") {
                return Ok(current);
            }
            if Instant::now() + delay > deadline {
                return Err(DriverError::timeout(format!("order for {} did not finalize in time", md.name)));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(8));
            current = self.refresh_order(md, &current.order_url, account_key, account_kid).await?;
        }
    }

    /// §4.6 final step: download, verify, and stage the issued chain.
    async fn install_certificate(&self, md: &ManagedDomain, state: &OrderState, account_key: &KeyMaterial, account_kid: &str) -> Result<CertificateChain> {
        let cert_url = state
            .certificate_url
            .as_ref()
            .ok_or_else(|| DriverError::corrupt("order valid but no certificate URL"))?;

        let resp = self
            .transport
            .post_signed(cert_url, account_key, AccountIdentity::Kid(account_kid), None)
            .await?;
        let chain = CertificateChain::from_pem(&resp.body)?;

        let Some(key_pem) = self.store.read(Group::Staging, &md.name, "privkey.pem").await? else {
            return Err(DriverError::corrupt("missing staged certificate key at install time"));
        };
        let cert_key = KeyMaterial::from_pkcs8_pem(&String::from_utf8_lossy(&key_pem), md.key_spec)?;

        if let Err(e) = chain.verify(&md.domains, &cert_key, Duration::from_secs(300)) {
            self.store.remove_all(Group::Staging, &md.name).await?;
            return Err(e);
        }

        self.store.write(Group::Staging, &md.name, "pubcert.pem", chain.to_pem().as_bytes()).await?;
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn md() -> ManagedDomain {
        ManagedDomain {
            name: "a.test".to_string(),
            domains: vec!["a.test".to_string()],
            key_spec: KeySpec::EcdsaP256,
            challenge_types: vec![ChallengeType::Http01],
            monitor_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn order_state_roundtrips_through_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = OrderState {
            order_url: "https://ca.test/acme/order/1".to_string(),
            status: "pending".to_string(),
            authorizations: vec!["https://ca.test/acme/authz/1".to_string()],
            finalize_url: "https://ca.test/acme/finalize/1".to_string(),
            certificate_url: None,
        };
        let bytes = serde_json::to_vec(&state).unwrap();
        store.write(Group::Staging, &md().name, "order.json", &bytes).await.unwrap();
        let read_back = store.read(Group::Staging, &md().name, "order.json").await.unwrap().unwrap();
        let parsed: OrderState = serde_json::from_slice(&read_back).unwrap();
        assert_eq!(parsed.order_url, state.order_url);
        assert_eq!(parsed.status, "pending");
    }
}
