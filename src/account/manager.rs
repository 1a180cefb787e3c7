//! Account create/read/update/deactivate, and `select_or_create` (§4.4):
//! reuse a stored account that already matches a CA URL and contact set
//! before registering a new one.

use crate::crypto::keypair::{KeyMaterial, KeySpec};
use crate::error::{DriverError, Result};
use crate::protocol::{AccountIdentity, DirectoryManager};
use crate::store::{Group, Store};
use crate::transport::AcmeTransport;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// External Account Binding credentials a CA issues out of band; attached
/// to the `newAccount` request only, never reused afterward.
#[derive(Debug, Clone)]
pub struct ExternalAccountBinding {
    pub kid: String,
    pub mac_key: Vec<u8>,
}

/// An ACME account as persisted under the ACCOUNTS store group. The
/// signing key lives alongside it as `acct.pem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Locally-assigned stable id, also the ACCOUNTS record name.
    #[serde(default)]
    pub local_id: String,
    /// Account URL at the CA (the `kid` used on every subsequent request).
    pub url: String,
    pub ca_url: String,
    pub contacts: Vec<String>,
    pub status: String,
    pub terms_of_service_agreed: bool,
    pub key_spec: KeySpec,
    #[serde(default)]
    pub eab_kid: Option<String>,
}

impl Account {
    fn matches(&self, ca_url: &str, contacts: &[String]) -> bool {
        self.status == "valid" && self.ca_url == ca_url && self.contacts == contacts
    }
}

pub struct AccountManager<'a> {
    store: Arc<dyn Store>,
    transport: &'a AcmeTransport,
    directory: &'a DirectoryManager,
}

impl<'a> AccountManager<'a> {
    pub fn new(store: Arc<dyn Store>, transport: &'a AcmeTransport, directory: &'a DirectoryManager) -> Self {
        Self { store, transport, directory }
    }

    /// §4.4 step 1-3: reuse a stored, `valid` account matching `ca_url` and
    /// `contacts`; otherwise register a new one.
    pub async fn select_or_create(
        &self,
        ca_url: &str,
        contacts: &[String],
        tos_accepted: bool,
        key_spec: KeySpec,
        eab: Option<ExternalAccountBinding>,
    ) -> Result<(Account, KeyMaterial)> {
        for name in self.store.names(Group::Accounts).await? {
            let Some((account, key)) = self.load(&name).await? else { continue };
            if account.matches(ca_url, contacts) {
                return Ok((account, key));
            }
        }
        self.register(contacts.to_vec(), tos_accepted, key_spec, eab).await
    }

    async fn load(&self, local_id: &str) -> Result<Option<(Account, KeyMaterial)>> {
        let Some(bytes) = self.store.read(Group::Accounts, local_id, "account.json").await? else {
            return Ok(None);
        };
        let account: Account = serde_json::from_slice(&bytes)
            .map_err(|e| DriverError::corrupt(format!("account {}: {}", local_id, e)))?;
        let Some(pem_bytes) = self.store.read(Group::Accounts, local_id, "acct.pem").await? else {
            return Ok(None);
        };
        let pem = String::from_utf8(pem_bytes)
            .map_err(|e| DriverError::corrupt(format!("account {} key: {}", local_id, e)))?;
        let key = KeyMaterial::from_pkcs8_pem(&pem, account.key_spec)?;
        Ok(Some((account, key)))
    }

    async fn persist(&self, account: &Account, key: &KeyMaterial) -> Result<()> {
        let json = serde_json::to_vec_pretty(account)?;
        self.store.write(Group::Accounts, &account.local_id, "account.json", &json).await?;
        self.store
            .write(Group::Accounts, &account.local_id, "acct.pem", key.to_pkcs8_pem().as_bytes())
            .await
    }

    /// Registers a new account via `newAccount` and persists it.
    pub async fn register(
        &self,
        contacts: Vec<String>,
        tos_accepted: bool,
        key_spec: KeySpec,
        eab: Option<ExternalAccountBinding>,
    ) -> Result<(Account, KeyMaterial)> {
        let directory = self.directory.get().await?;
        let key = KeyMaterial::generate(key_spec)?;
        let jwk = key.public_jwk()?;

        let mut payload = json!({
            "termsOfServiceAgreed": tos_accepted,
            "contact": contacts,
        });
        let eab_kid = eab.as_ref().map(|e| e.kid.clone());
        if let Some(binding) = &eab {
            payload["externalAccountBinding"] = eab_jws(&directory.new_account, binding, &jwk)?;
        }

        let resp = self
            .transport
            .post_signed(&directory.new_account, &key, AccountIdentity::Jwk(&jwk), Some(&payload))
            .await?;

        let url = resp
            .headers
            .get("location")
            .cloned()
            .ok_or_else(|| DriverError::fatal("newAccount response missing Location header"))?;

        #[derive(Deserialize)]
        struct NewAccountResponse {
            status: String,
            #[serde(default, rename = "termsOfServiceAgreed")]
            terms_of_service_agreed: bool,
        }
        let body: NewAccountResponse = resp.json()?;

        let account = Account {
            local_id: new_local_id(),
            url,
            ca_url: directory.new_account.clone(),
            contacts,
            status: body.status,
            terms_of_service_agreed: body.terms_of_service_agreed || tos_accepted,
            key_spec,
            eab_kid,
        };
        self.persist(&account, &key).await?;
        Ok((account, key))
    }

    /// POST-as-GET refresh of an account's current status from the CA.
    pub async fn refresh(&self, account: &Account, key: &KeyMaterial) -> Result<Account> {
        let resp = self
            .transport
            .post_signed(&account.url, key, AccountIdentity::Kid(&account.url), None)
            .await?;
        #[derive(Deserialize)]
        struct AccountStatusResponse {
            status: String,
        }
        let body: AccountStatusResponse = resp.json()?;
        let mut refreshed = account.clone();
        refreshed.status = body.status;
        self.persist(&refreshed, key).await?;
        Ok(refreshed)
    }

    pub async fn update_contacts(
        &self,
        account: &Account,
        key: &KeyMaterial,
        contacts: Vec<String>,
    ) -> Result<Account> {
        let payload = json!({ "contact": contacts });
        self.transport
            .post_signed(&account.url, key, AccountIdentity::Kid(&account.url), Some(&payload))
            .await?;
        let mut updated = account.clone();
        updated.contacts = contacts;
        self.persist(&updated, key).await?;
        Ok(updated)
    }

    pub async fn deactivate(&self, account: &Account, key: &KeyMaterial) -> Result<()> {
        let payload = json!({ "status": "deactivated" });
        self.transport
            .post_signed(&account.url, key, AccountIdentity::Kid(&account.url), Some(&payload))
            .await?;
        let mut deactivated = account.clone();
        deactivated.status = "deactivated".to_string();
        self.persist(&deactivated, key).await
    }
}

/// Signs the account's public JWK with the EAB MAC key, per RFC 8555 §7.3.4.
fn eab_jws(
    new_account_url: &str,
    binding: &ExternalAccountBinding,
    account_jwk: &crate::types::Jwk,
) -> Result<serde_json::Value> {
    use crate::crypto::encoding::Base64Encoding;
    use crate::crypto::signer::EabSigner;

    let protected = json!({
        "alg": "HS256",
        "kid": binding.kid,
        "url": new_account_url,
    })
    .to_string();
    let protected_b64 = Base64Encoding::encode(protected.as_bytes());
    let payload_b64 = Base64Encoding::encode(serde_json::to_string(account_jwk)?.as_bytes());
    let signing_input = format!("{}.{}", protected_b64, payload_b64);

    let signer = EabSigner::new(binding.mac_key.clone());
    let signature = signer.sign(signing_input.as_bytes())?;

    Ok(json!({
        "protected": protected_b64,
        "payload": payload_b64,
        "signature": signature.to_base64(),
    }))
}

fn new_local_id() -> String {
    let bytes: [u8; 8] = rand::random();
    format!("acct-{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_matches_requires_valid_status_and_exact_contact_set() {
        let account = Account {
            local_id: "acct-1".into(),
            url: "https://ca.test/acme/acct/1".into(),
            ca_url: "https://ca.test/acme/new-account".into(),
            contacts: vec!["mailto:a@example.com".into()],
            status: "valid".into(),
            terms_of_service_agreed: true,
            key_spec: KeySpec::EcdsaP256,
            eab_kid: None,
        };
        assert!(account.matches("https://ca.test/acme/new-account", &["mailto:a@example.com".to_string()]));
        assert!(!account.matches("https://other.test/acme/new-account", &["mailto:a@example.com".to_string()]));
        assert!(!account.matches("https://ca.test/acme/new-account", &["mailto:b@example.com".to_string()]));

        let deactivated = Account { status: "deactivated".into(), ..account };
        assert!(!deactivated.matches("https://ca.test/acme/new-account", &["mailto:a@example.com".to_string()]));
    }

    #[test]
    fn local_ids_are_unique() {
        let a = new_local_id();
        let b = new_local_id();
        assert_ne!(a, b);
        assert!(a.starts_with("acct-"));
    }
}
