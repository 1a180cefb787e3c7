mod common;

use acmed::account::AccountManager;
use acmed::crypto::{KeyMaterial, KeySpec};
use acmed::store::{Group, MemoryStore, Store};
use acmed::transport::RetryPolicy;
use acmed::Account;
use common::MockAcmeServer;
use std::sync::Arc;

#[tokio::test]
async fn select_or_create_registers_when_no_account_is_stored() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let _m_dir = mock.mock_directory().await;
    let _m_nonce = mock.mock_new_nonce().await;
    let _m_account = mock.mock_new_account().await;

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = common::transport(&url, RetryPolicy::default());
    let directory = common::directory_manager(&url);
    let manager = AccountManager::new(store.clone(), &transport, &directory);

    let contacts = vec!["mailto:admin@example.com".to_string()];
    let (account, _key) = manager
        .select_or_create(&format!("{}/new-account", url), &contacts, true, KeySpec::EcdsaP256, None)
        .await
        .expect("should register a fresh account");

    assert_eq!(account.status, "valid");
    assert!(!store.names(Group::Accounts).await.unwrap().is_empty());
}

#[tokio::test]
async fn select_or_create_reuses_a_matching_valid_account_without_any_network_call() {
    // No mocks are created at all: any accidental call to the CA would fail
    // to connect and fail the test, so success here proves reuse took the
    // stored-account path.
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ca_url = "http://127.0.0.1:1/new-account".to_string();
    let contacts = vec!["mailto:admin@example.com".to_string()];

    let key = KeyMaterial::generate(KeySpec::EcdsaP256).unwrap();
    let stored = Account {
        local_id: "acct-seed".to_string(),
        url: "http://127.0.0.1:1/acct/1".to_string(),
        ca_url: ca_url.clone(),
        contacts: contacts.clone(),
        status: "valid".to_string(),
        terms_of_service_agreed: true,
        key_spec: KeySpec::EcdsaP256,
        eab_kid: None,
    };
    store
        .write(Group::Accounts, &stored.local_id, "account.json", &serde_json::to_vec(&stored).unwrap())
        .await
        .unwrap();
    store
        .write(Group::Accounts, &stored.local_id, "acct.pem", key.to_pkcs8_pem().as_bytes())
        .await
        .unwrap();

    let transport = common::transport("http://127.0.0.1:1", RetryPolicy::default());
    let directory = common::directory_manager("http://127.0.0.1:1");
    let manager = AccountManager::new(store.clone(), &transport, &directory);

    let (account, _key) = manager
        .select_or_create(&ca_url, &contacts, true, KeySpec::EcdsaP256, None)
        .await
        .expect("should reuse the stored account");

    assert_eq!(account.local_id, "acct-seed");
}
