//! The status view (§4.8): a read-only projection over store state and the
//! renewal supervisor's schedule. Never mutates anything and never talks
//! to a CA — it only reads what earlier driver runs already persisted.

use crate::certificate::CertificateChain;
use crate::renewal::RenewalSupervisor;
use crate::store::Group;
use serde::Serialize;
use std::sync::Arc;

/// Per-MD report: certificate state, staged order phase, and schedule.
#[derive(Debug, Clone, Serialize)]
pub struct MdStatus {
    pub md_name: String,
    pub domains: Vec<String>,
    /// `notAfter` of the currently installed (DOMAINS) certificate, if any.
    pub current_expiry_unix: Option<i64>,
    pub current_issuer: Option<String>,
    /// Whether a STAGING order is in flight, and which phase it reports.
    pub staged_phase: Option<String>,
    pub next_check_in_secs: u64,
    pub error_runs: u32,
    pub last_attempt_unix: Option<i64>,
    pub last_error: Option<String>,
}

/// Builds the current status view for every configured MD.
pub async fn build(supervisor: &RenewalSupervisor) -> Vec<MdStatus> {
    let snapshots = supervisor.snapshot().await;
    let store = supervisor.store();

    let mut out = Vec::with_capacity(supervisor.specs().len());
    for spec in supervisor.specs() {
        let snapshot = snapshots.iter().find(|s| s.md_name == spec.md.name);

        let (current_expiry_unix, current_issuer) = match current_certificate(store, &spec.md.name).await {
            Some(chain) => (chain.not_after_unix().ok(), chain.common_name().ok()),
            None => (None, None),
        };

        out.push(MdStatus {
            md_name: spec.md.name.clone(),
            domains: spec.md.domains.clone(),
            current_expiry_unix,
            current_issuer,
            staged_phase: staged_phase(store, &spec.md.name).await,
            next_check_in_secs: snapshot.map(|s| s.next_check_in.as_secs()).unwrap_or(0),
            error_runs: snapshot.map(|s| s.error_runs).unwrap_or(0),
            last_attempt_unix: snapshot.and_then(|s| s.last_attempt_unix),
            last_error: snapshot.and_then(|s| s.last_error.clone()),
        });
    }
    out
}

async fn current_certificate(store: &Arc<dyn crate::store::Store>, md_name: &str) -> Option<CertificateChain> {
    let bytes = store.read(Group::Domains, md_name, "pubcert.pem").await.ok().flatten()?;
    CertificateChain::from_pem(&bytes).ok()
}

async fn staged_phase(store: &Arc<dyn crate::store::Store>, md_name: &str) -> Option<String> {
    let bytes = store.read(Group::Staging, md_name, "order.json").await.ok().flatten()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("status").and_then(|v| v.as_str()).map(|s| s.to_string())
}
