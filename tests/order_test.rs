mod common;

use acmed::error::DriverError;
use acmed::order::OrderDriver;
use acmed::store::{Group, MemoryStore, Store};
use acmed::transport::RetryPolicy;
use common::MockAcmeServer;
use std::sync::Arc;
use std::time::Instant;

fn account_kid(url: &str) -> String {
    format!("{}/acct/1", url)
}

/// S1: a single-name HTTP-01 order runs authorization, finalizes, and
/// downloads a chain that verifies against the staged key.
#[tokio::test]
async fn happy_path_http01_issues_a_verified_chain() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let order_url = format!("{}/order/1", url);
    let authz_url = format!("{}/authz/1", url);
    let challenge_url = format!("{}/chall/1", url);
    let finalize_url = format!("{}/finalize/1", url);
    let cert_url = format!("{}/cert/1", url);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test"]);
    let cert_key = common::seed_staging_order(&store, &md, &order_url).await;

    let _m_nonce = mock.mock_new_nonce().await;

    // /order/1: pending once (load_or_start's refresh), then ready forever
    // (after authorization completes). Registered in reverse so mockito's
    // most-recently-created-first matching serves "pending" to call #1.
    let _m_order_ready = mock.mock_order("ready", &[authz_url.clone()], &finalize_url, None).await;
    let mut m_order_pending = mock.mock_order("pending", &[authz_url.clone()], &finalize_url, None).await;
    m_order_pending = m_order_pending.expect(1);

    // /authz/1: pending once, then valid.
    let _m_authz_valid = mock.mock_authz("valid", &challenge_url, "tok1").await;
    let mut m_authz_pending = mock.mock_authz("pending", &challenge_url, "tok1").await;
    m_authz_pending = m_authz_pending.expect(1);

    let _m_chall = mock.mock_challenge_ready().await;

    let _m_finalize = mock.mock_finalize("valid", &cert_url).await;

    let chain_pem = common::issue_matching_chain(&md.domains, &cert_key);
    let _m_cert = mock.mock_certificate(&chain_pem).await;

    let transport = common::transport(&url, RetryPolicy::default());
    let directory = common::directory_manager(&url);
    let registry = common::registry_with_http01();
    let driver = OrderDriver::new(store.clone(), &transport, &directory, &registry);

    let account_key = acmed::crypto::KeyMaterial::generate(acmed::KeySpec::EcdsaP256).unwrap();
    let kid = account_kid(&url);

    let chain = driver.drive(&md, &account_key, &kid).await.expect("happy path should issue");
    chain.verify(&md.domains, &cert_key, std::time::Duration::from_secs(300)).unwrap();

    assert!(store.read(Group::Staging, "a.test", "pubcert.pem").await.unwrap().is_some());
}

/// S2: a process restart resumes from the persisted STAGING order instead
/// of generating a new key. Simulated by re-running `OrderDriver::drive`
/// against the same store with a directory that has already moved past
/// `pending`, and checking the installed key is the one staged originally.
#[tokio::test]
async fn resumes_with_the_same_staged_key_after_a_restart() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let order_url = format!("{}/order/1", url);
    let finalize_url = format!("{}/finalize/1", url);
    let cert_url = format!("{}/cert/1", url);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test"]);
    let cert_key = common::seed_staging_order(&store, &md, &order_url).await;

    // The order is already `ready` on disk at the CA - as if the process
    // died right after authorization completed and before finalize.
    let _m_nonce = mock.mock_new_nonce().await;
    let _m_order = mock.mock_order("ready", &[], &finalize_url, None).await;
    let _m_finalize = mock.mock_finalize("valid", &cert_url).await;

    let chain_pem = common::issue_matching_chain(&md.domains, &cert_key);
    let _m_cert = mock.mock_certificate(&chain_pem).await;

    let transport = common::transport(&url, RetryPolicy::default());
    let directory = common::directory_manager(&url);
    let registry = common::registry_with_http01();
    let driver = OrderDriver::new(store.clone(), &transport, &directory, &registry);

    let account_key = acmed::crypto::KeyMaterial::generate(acmed::KeySpec::EcdsaP256).unwrap();
    let kid = account_kid(&url);

    let chain = driver.drive(&md, &account_key, &kid).await.expect("resumed drive should finish");

    let staged_key_pem = store.read(Group::Staging, "a.test", "privkey.pem").await.unwrap().unwrap();
    assert_eq!(staged_key_pem, cert_key.to_pkcs8_pem().as_bytes());
    chain.verify(&md.domains, &cert_key, std::time::Duration::from_secs(300)).unwrap();
}

/// S3: a `badNonce` on the order refresh is retried transparently by
/// `AcmeTransport`, and the run still reaches the same happy-path outcome.
#[tokio::test]
async fn bad_nonce_on_order_refresh_is_retried_once() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let order_url = format!("{}/order/1", url);
    let authz_url = format!("{}/authz/1", url);
    let challenge_url = format!("{}/chall/1", url);
    let finalize_url = format!("{}/finalize/1", url);
    let cert_url = format!("{}/cert/1", url);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test"]);
    let cert_key = common::seed_staging_order(&store, &md, &order_url).await;

    let _m_nonce = mock.mock_new_nonce().await;

    // First hit to /order/1 (load_or_start's refresh) returns badNonce;
    // registered most-recently so it's tried first and consumed once.
    let mut m_bad_nonce = mock
        .server
        .mock("POST", "/order/1")
        .with_status(400)
        .with_header("replay-nonce", "n-retry")
        .with_header("content-type", "application/problem+json")
        .with_body(serde_json::json!({"type": "urn:ietf:params:acme:error:badNonce", "detail": "stale"}).to_string())
        .create_async()
        .await;
    m_bad_nonce = m_bad_nonce.expect(1);

    let _m_order_ready = mock.mock_order("ready", &[authz_url.clone()], &finalize_url, None).await;
    let mut m_order_pending = mock.mock_order("pending", &[authz_url.clone()], &finalize_url, None).await;
    m_order_pending = m_order_pending.expect(1);

    let _m_authz_valid = mock.mock_authz("valid", &challenge_url, "tok1").await;
    let mut m_authz_pending = mock.mock_authz("pending", &challenge_url, "tok1").await;
    m_authz_pending = m_authz_pending.expect(1);

    let _m_chall = mock.mock_challenge_ready().await;
    let _m_finalize = mock.mock_finalize("valid", &cert_url).await;
    let chain_pem = common::issue_matching_chain(&md.domains, &cert_key);
    let _m_cert = mock.mock_certificate(&chain_pem).await;

    let transport = common::transport(&url, RetryPolicy::default());
    let directory = common::directory_manager(&url);
    let registry = common::registry_with_http01();
    let driver = OrderDriver::new(store.clone(), &transport, &directory, &registry);

    let account_key = acmed::crypto::KeyMaterial::generate(acmed::KeySpec::EcdsaP256).unwrap();
    let kid = account_kid(&url);

    driver.drive(&md, &account_key, &kid).await.expect("badNonce should be retried transparently");
    m_bad_nonce.assert_async().await;
}

/// S4: an authorization that goes `invalid` purges STAGING and surfaces a
/// `ChallengeFailed` error; DOMAINS is never touched.
#[tokio::test]
async fn invalid_authorization_purges_staging_and_fails() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let order_url = format!("{}/order/1", url);
    let authz_url = format!("{}/authz/1", url);
    let challenge_url = format!("{}/chall/1", url);
    let finalize_url = format!("{}/finalize/1", url);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test"]);
    common::seed_staging_order(&store, &md, &order_url).await;

    let _m_nonce = mock.mock_new_nonce().await;
    let _m_order = mock.mock_order("pending", &[authz_url.clone()], &finalize_url, None).await;
    let _m_authz = mock.mock_authz_invalid(&challenge_url, "tok1").await;
    let _m_chall = mock.mock_challenge_ready().await;

    let transport = common::transport(&url, RetryPolicy::default());
    let directory = common::directory_manager(&url);
    let registry = common::registry_with_http01();
    let driver = OrderDriver::new(store.clone(), &transport, &directory, &registry);

    let account_key = acmed::crypto::KeyMaterial::generate(acmed::KeySpec::EcdsaP256).unwrap();
    let kid = account_kid(&url);

    let err = driver.drive(&md, &account_key, &kid).await.unwrap_err();
    assert!(matches!(err, DriverError::ChallengeFailed(_)));

    assert!(store.files(Group::Staging, "a.test").await.unwrap().is_empty());
    assert!(store.names(Group::Domains).await.unwrap().is_empty());
}

/// S6: the CA issues a chain whose SAN set doesn't cover every requested
/// name. STAGING is purged and the mismatch surfaces as `CertMismatch`.
#[tokio::test]
async fn san_mismatch_is_rejected_and_staging_purged() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let order_url = format!("{}/order/1", url);
    let authz_url = format!("{}/authz/1", url);
    let challenge_url = format!("{}/chall/1", url);
    let finalize_url = format!("{}/finalize/1", url);
    let cert_url = format!("{}/cert/1", url);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test", "b.test"]);
    let cert_key = common::seed_staging_order(&store, &md, &order_url).await;

    let _m_nonce = mock.mock_new_nonce().await;

    let _m_order_ready = mock.mock_order("ready", &[authz_url.clone()], &finalize_url, None).await;
    let mut m_order_pending = mock.mock_order("pending", &[authz_url.clone()], &finalize_url, None).await;
    m_order_pending = m_order_pending.expect(1);

    let _m_authz_valid = mock.mock_authz("valid", &challenge_url, "tok1").await;
    let mut m_authz_pending = mock.mock_authz("pending", &challenge_url, "tok1").await;
    m_authz_pending = m_authz_pending.expect(1);

    let _m_chall = mock.mock_challenge_ready().await;
    let _m_finalize = mock.mock_finalize("valid", &cert_url).await;

    // Leaf only covers "a.test", while the MD also requires "b.test".
    let chain_pem = common::issue_matching_chain(&["a.test".to_string()], &cert_key);
    let _m_cert = mock.mock_certificate(&chain_pem).await;

    let transport = common::transport(&url, RetryPolicy::default());
    let directory = common::directory_manager(&url);
    let registry = common::registry_with_http01();
    let driver = OrderDriver::new(store.clone(), &transport, &directory, &registry);

    let account_key = acmed::crypto::KeyMaterial::generate(acmed::KeySpec::EcdsaP256).unwrap();
    let kid = account_kid(&url);

    let err = driver.drive(&md, &account_key, &kid).await.unwrap_err();
    assert!(matches!(err, DriverError::CertMismatch(_)));
    assert!(store.files(Group::Staging, "a.test").await.unwrap().is_empty());
}

#[allow(dead_code)]
fn unused_instant_for_deadline_imports() -> Instant {
    Instant::now()
}
