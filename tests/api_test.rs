mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::sync::Arc;
use tower::ServiceExt;

use acmed::renewal::{ManagedDomainSpec, RenewalSupervisor};
use acmed::server::status::{router, StatusServerState};
use acmed::server::HealthCheck;
use acmed::store::MemoryStore;
use common::MockAcmeServer;

fn spec_for(md: acmed::ManagedDomain, ca_directory_url: String) -> ManagedDomainSpec {
    ManagedDomainSpec {
        md,
        ca_directory_url,
        contacts: vec!["mailto:ops@a.test".to_string()],
        tos_accepted: true,
        renewal_window: std::time::Duration::from_secs(30 * 24 * 3600),
        eab: None,
    }
}

#[tokio::test]
async fn status_endpoint_reports_one_entry_per_configured_md() {
    let store = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test"]);
    let supervisor = Arc::new(RenewalSupervisor::new(
        store,
        std::env::temp_dir().join("acmed-api-test-status"),
        Arc::new(acmed::ChallengeRegistry::new()),
        vec![spec_for(md, "https://ca.test/directory".to_string())],
        1,
    ));

    let state = StatusServerState { supervisor, health: Arc::new(HealthCheck::new()) };
    let app = router(state);

    let response = app
        .oneshot(Request::builder().method("GET").uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    let statuses: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(statuses.as_array().unwrap().len(), 1);
    assert_eq!(statuses[0]["md_name"], "a.test");
}

#[tokio::test]
async fn healthz_and_metrics_endpoints_respond_ok() {
    let store = Arc::new(MemoryStore::new());
    let supervisor = Arc::new(RenewalSupervisor::new(
        store,
        std::env::temp_dir().join("acmed-api-test-health"),
        Arc::new(acmed::ChallengeRegistry::new()),
        vec![],
        1,
    ));
    let state = StatusServerState { supervisor, health: Arc::new(HealthCheck::new()) };
    let app = router(state);

    let health_resp = app
        .clone()
        .oneshot(Request::builder().method("GET").uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health_resp.status(), StatusCode::OK);

    let metrics_resp = app
        .oneshot(Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics_resp.status(), StatusCode::OK);
}

/// S5: a rate-limited `newOrder` fails the tick for that MD without ever
/// reaching authorization, and `next_check` honors the CA's `Retry-After`
/// instead of the default error-count back-off.
#[tokio::test]
async fn rate_limited_new_order_fails_the_tick_and_honors_retry_after() {
    let mut mock = MockAcmeServer::new().await;
    let url = mock.url();
    let _m_dir = mock.mock_directory().await;
    let _m_nonce = mock.mock_new_nonce().await;
    let _m_account = mock.mock_new_account().await;
    let _m_rate_limited = mock.mock_new_order_rate_limited().await;

    let store = Arc::new(MemoryStore::new());
    let md = common::managed_domain("a.test", &["a.test"]);
    let supervisor = Arc::new(RenewalSupervisor::new(
        store,
        std::env::temp_dir().join("acmed-api-test-ratelimit"),
        Arc::new(common::registry_with_http01()),
        vec![spec_for(md, format!("{}/directory", url))],
        1,
    ));

    let outcomes = supervisor.clone().tick().await;
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].renewed);
    assert!(outcomes[0].error.is_some());

    // mock_new_order_rate_limited sets `Retry-After: 600`; the default
    // error_runs²×60s back-off at error_runs=1 would be ~60s, so this only
    // passes if RateLimited's retry_after is actually honored.
    let snapshot = supervisor.snapshot().await;
    assert_eq!(snapshot[0].error_runs, 1);
    assert!(snapshot[0].next_check_in > std::time::Duration::from_secs(500));
}
