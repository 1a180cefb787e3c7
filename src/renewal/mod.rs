//! The renewal supervisor (§4.7): ticks over every managed domain, decides
//! which are due, and runs the order driver for each — bounded by a
//! concurrency pool and serialized per MD by an advisory lock (§5). Each
//! tick also purges TMP scratch space and orphaned STAGING records before
//! driving anything due. Per-MD schedule bookkeeping (the §3 "Job") is
//! persisted to `DOMAINS/<md>/job.json` after every run so back-off
//! survives a process restart; call [`RenewalSupervisor::hydrate`] once
//! at startup to load it back in.
//! Grounded on `src/scheduler/renewal_scheduler.rs`'s `AdvancedRenewalScheduler`
//! (priority queue + semaphore-bounded concurrency + retry), restructured
//! around a real `next_check` schedule instead of a stubbed "always due"
//! check and around the driver/store stack built for this crate.

pub mod lock;

use crate::account::manager::{AccountManager, ExternalAccountBinding};
use crate::challenge::ChallengeRegistry;
use crate::error::{DriverError, Result};
use crate::order::{ManagedDomain, OrderDriver};
use crate::protocol::{DirectoryManager, NonceManager};
use crate::renewal::lock::MdLock;
use crate::store::{Group, Store};
use crate::transport::{AcmeTransport, HttpClient, HttpClientConfig, RetryPolicy};
use crate::types::MdState;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

/// Everything the supervisor needs about a managed domain beyond what the
/// order driver itself requires: where to register an account and how
/// long before expiry to start renewing.
#[derive(Debug, Clone)]
pub struct ManagedDomainSpec {
    pub md: ManagedDomain,
    pub ca_directory_url: String,
    pub contacts: Vec<String>,
    pub tos_accepted: bool,
    pub renewal_window: Duration,
    pub eab: Option<ExternalAccountBinding>,
}

/// Emitted after each tick so the caller (daemon loop, `once` CLI verb) can
/// act on it — in particular, requesting the host reload served certs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RenewalOutcome {
    pub md_name: String,
    pub renewed: bool,
    pub need_restart: bool,
    pub error: Option<String>,
}

struct MdSchedule {
    next_check: Instant,
    error_runs: u32,
    last_attempt_unix: Option<i64>,
    last_error: Option<String>,
}

impl MdSchedule {
    fn fresh() -> Self {
        Self { next_check: Instant::now(), error_runs: 0, last_attempt_unix: None, last_error: None }
    }

    fn to_job(&self) -> Job {
        Job {
            next_check_unix: now_unix() + self.next_check.saturating_duration_since(Instant::now()).as_secs() as i64,
            error_runs: self.error_runs,
            last_attempt_unix: self.last_attempt_unix,
            last_error: self.last_error.clone(),
        }
    }

    fn from_job(job: Job) -> Self {
        let delay = (job.next_check_unix - now_unix()).max(0) as u64;
        Self {
            next_check: Instant::now() + Duration::from_secs(delay),
            error_runs: job.error_runs,
            last_attempt_unix: job.last_attempt_unix,
            last_error: job.last_error,
        }
    }
}

/// The per-MD supervisor bookkeeping named in the data model (§3), persisted
/// as `STAGING/<md>/job.json` so back-off survives process restarts. `Instant`
/// isn't serializable, so `next_check` round-trips through a Unix timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Job {
    next_check_unix: i64,
    error_runs: u32,
    last_attempt_unix: Option<i64>,
    last_error: Option<String>,
}

/// The MD lifecycle record persisted at `DOMAINS/<md>/md.json`. Written
/// only on a successful promotion; an MD left in STAGING (still pending or
/// failed) has no record here, matching the "DOMAINS unchanged on error"
/// rule — the status view falls back to `Incomplete` in that case.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct MdRecord {
    state: MdState,
    domains: Vec<String>,
}

/// A point-in-time snapshot of one MD's schedule, for the status view
/// (§4.8); never triggers network activity.
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub md_name: String,
    pub next_check_in: Duration,
    pub error_runs: u32,
    pub last_attempt_unix: Option<i64>,
    pub last_error: Option<String>,
}

pub struct RenewalSupervisor {
    store: Arc<dyn Store>,
    staging_root: PathBuf,
    responders: Arc<ChallengeRegistry>,
    specs: Vec<ManagedDomainSpec>,
    schedule: Mutex<HashMap<String, MdSchedule>>,
    concurrency: usize,
}

impl RenewalSupervisor {
    pub fn new(
        store: Arc<dyn Store>,
        staging_root: PathBuf,
        responders: Arc<ChallengeRegistry>,
        specs: Vec<ManagedDomainSpec>,
        concurrency: usize,
    ) -> Self {
        let schedule = specs.iter().map(|s| (s.md.name.clone(), MdSchedule::fresh())).collect();
        Self {
            store,
            staging_root,
            responders,
            specs,
            schedule: Mutex::new(schedule),
            concurrency,
        }
    }

    /// Loads any persisted `job.json` for each configured MD, so back-off
    /// and error counts survive a process restart. Call once before the
    /// first tick; an MD with no persisted job keeps its fresh schedule.
    pub async fn hydrate(&self) {
        let mut schedule = self.schedule.lock().await;
        for spec in &self.specs {
            if let Some(job) = self.load_job(&spec.md.name).await {
                schedule.insert(spec.md.name.clone(), MdSchedule::from_job(job));
            }
        }
    }

    // Job bookkeeping lives under DOMAINS, not STAGING: STAGING/<md> is
    // moved wholesale on promotion, which would otherwise carry an MD's
    // schedule history into the middle of the next order's scratch space.
    async fn load_job(&self, md_name: &str) -> Option<Job> {
        let bytes = self.store.read(Group::Domains, md_name, "job.json").await.ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn persist_job(&self, md_name: &str, job: &Job) {
        let bytes = match serde_json::to_vec(job) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        if let Err(e) = self.store.write(Group::Domains, md_name, "job.json", &bytes).await {
            tracing::warn!(md = %md_name, error = %e, "failed to persist renewal job state");
        }
    }

    /// Runs forever, ticking at `interval`.
    pub async fn run(self: Arc<Self>, interval: Duration) -> ! {
        loop {
            let outcomes = self.clone().tick().await;
            for outcome in &outcomes {
                if let Some(err) = &outcome.error {
                    tracing::warn!(md = %outcome.md_name, error = %err, "renewal attempt failed");
                } else if outcome.renewed {
                    tracing::info!(md = %outcome.md_name, "certificate renewed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Runs a single pass: every MD whose `next_check` has arrived gets
    /// driven, up to `concurrency` at a time. MDs not yet due are skipped
    /// without taking their lock (testable property: idempotence on a
    /// not-yet-due, already-COMPLETE MD performs no network requests).
    pub async fn tick(self: Arc<Self>) -> Vec<RenewalOutcome> {
        if let Err(e) = self.purge_stale().await {
            tracing::warn!(error = %e, "stale STAGING/TMP purge failed");
        }

        let due: Vec<ManagedDomainSpec> = {
            let schedule = self.schedule.lock().await;
            let now = Instant::now();
            self.specs
                .iter()
                .filter(|s| schedule.get(&s.md.name).map(|sc| sc.next_check <= now).unwrap_or(true))
                .cloned()
                .collect()
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::new();
        for spec in due {
            let supervisor = self.clone();
            let permit = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.ok();
                supervisor.run_one(&spec).await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            if let Ok(outcome) = handle.await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Drives one MD: acquires its lock, runs the order driver, promotes
    /// STAGING to DOMAINS on success, and schedules the next check.
    async fn run_one(&self, spec: &ManagedDomainSpec) -> RenewalOutcome {
        let md_name = spec.md.name.clone();
        let lock = match MdLock::try_acquire(&self.staging_root, &md_name).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                return RenewalOutcome { md_name, renewed: false, need_restart: false, error: None };
            }
            Err(e) => {
                return RenewalOutcome { md_name, renewed: false, need_restart: false, error: Some(e.to_string()) };
            }
        };

        let metrics = crate::metrics::global();
        metrics.orders_started_total.inc();
        let started = Instant::now();
        let mut result = self.drive_one(spec).await;

        // §7: Unauthorized/BadAccount gets exactly one retry, after
        // recreating the account that was rejected.
        if let Err(DriverError::Unauthorized(_)) = &result {
            match self.recreate_account(spec).await {
                Ok(()) => result = self.drive_one(spec).await,
                Err(e) => tracing::warn!(md = %md_name, error = %e, "failed to recreate account after Unauthorized"),
            }
        }

        metrics.renewal_latency_seconds.observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => metrics.orders_succeeded_total.inc(),
            Err(_) => metrics.orders_failed_total.inc(),
        }
        drop(lock);

        let job = {
            let mut schedule = self.schedule.lock().await;
            let entry = schedule.entry(md_name.clone()).or_insert_with(MdSchedule::fresh);
            entry.last_attempt_unix = Some(now_unix());

            match &result {
                Ok(not_after_unix) => {
                    entry.error_runs = 0;
                    entry.last_error = None;
                    entry.next_check = next_check_from_expiry(*not_after_unix, spec.renewal_window);
                }
                Err(e) => {
                    entry.error_runs += 1;
                    entry.last_error = Some(e.to_string());
                    entry.next_check = next_check_after_error(e, entry.error_runs);
                }
            }
            entry.to_job()
        };
        self.persist_job(&md_name, &job).await;

        match result {
            Ok(_) => RenewalOutcome { md_name, renewed: true, need_restart: true, error: None },
            Err(e) => RenewalOutcome { md_name, renewed: false, need_restart: false, error: Some(e.to_string()) },
        }
    }

    /// §7 Unauthorized/BadAccount recovery: drops the stored account that
    /// matches this MD's CA/contacts so the next `select_or_create` call
    /// registers a fresh one instead of reusing the rejected credentials.
    async fn recreate_account(&self, spec: &ManagedDomainSpec) -> Result<()> {
        for name in self.store.names(Group::Accounts).await? {
            let Some(bytes) = self.store.read(Group::Accounts, &name, "account.json").await? else { continue };
            let Ok(account) = serde_json::from_slice::<crate::account::Account>(&bytes) else { continue };
            if account.ca_url == spec.ca_directory_url && account.contacts == spec.contacts {
                self.store.remove_all(Group::Accounts, &name).await?;
            }
        }
        Ok(())
    }

    /// Clears TMP scratch space and drops STAGING records for MDs no
    /// longer in the configured set, so a removed MD's half-finished
    /// order doesn't linger forever. Never touches a STAGING record that
    /// still belongs to a configured MD, even mid-drive, since the lock
    /// in `run_one` (not this purge) is what guards concurrent access.
    async fn purge_stale(&self) -> Result<()> {
        for name in self.store.names(Group::Tmp).await? {
            self.store.remove_all(Group::Tmp, &name).await?;
        }

        let known: std::collections::HashSet<&str> = self.specs.iter().map(|s| s.md.name.as_str()).collect();
        for name in self.store.names(Group::Staging).await? {
            if !known.contains(name.as_str()) {
                self.store.remove_all(Group::Staging, &name).await?;
            }
        }
        Ok(())
    }

    pub fn specs(&self) -> &[ManagedDomainSpec] {
        &self.specs
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Read-only snapshot of every MD's schedule, for the status view.
    /// Never touches the network.
    pub async fn snapshot(&self) -> Vec<ScheduleSnapshot> {
        let schedule = self.schedule.lock().await;
        let now = Instant::now();
        self.specs
            .iter()
            .map(|s| {
                let sched = schedule.get(&s.md.name);
                ScheduleSnapshot {
                    md_name: s.md.name.clone(),
                    next_check_in: sched.map(|e| e.next_check.saturating_duration_since(now)).unwrap_or_default(),
                    error_runs: sched.map(|e| e.error_runs).unwrap_or(0),
                    last_attempt_unix: sched.and_then(|e| e.last_attempt_unix),
                    last_error: sched.and_then(|e| e.last_error.clone()),
                }
            })
            .collect()
    }

    /// Runs the order driver end to end for one MD and promotes its
    /// verified chain from STAGING to DOMAINS. Returns the issued leaf's
    /// `notAfter` on success, used to schedule the next check.
    async fn drive_one(&self, spec: &ManagedDomainSpec) -> Result<i64> {
        let http = HttpClient::new(HttpClientConfig::default())?;
        let reqwest_client = reqwest::Client::builder()
            .build()
            .map_err(|e| DriverError::transient(format!("http client: {}", e)))?;
        let directory = DirectoryManager::new(spec.ca_directory_url.clone(), reqwest_client.clone());
        let dir = directory.get().await?;
        let nonces = NonceManager::new(dir.new_nonce.clone(), reqwest_client);
        let transport = AcmeTransport::new(http, nonces, RetryPolicy::default());

        let accounts = AccountManager::new(self.store.clone(), &transport, &directory);
        let (account, key) = accounts
            .select_or_create(&spec.ca_directory_url, &spec.contacts, spec.tos_accepted, spec.md.key_spec, spec.eab.clone())
            .await?;

        let order_driver = OrderDriver::new(self.store.clone(), &transport, &directory, &self.responders);
        let chain = order_driver.drive(&spec.md, &key, &account.url).await?;
        let not_after = chain.not_after_unix()?;

        self.store.rename(Group::Staging, Group::Domains, &spec.md.name).await?;

        let record = MdRecord { state: MdState::Complete, domains: spec.md.domains.clone() };
        if let Ok(bytes) = serde_json::to_vec_pretty(&record) {
            self.store.write(Group::Domains, &spec.md.name, "md.json", &bytes).await?;
        }

        Ok(not_after)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn next_check_from_expiry(not_after_unix: i64, renewal_window: Duration) -> Instant {
    let renew_at = not_after_unix - renewal_window.as_secs() as i64;
    let delay = (renew_at - now_unix()).max(0) as u64;
    Instant::now() + Duration::from_secs(delay)
}

/// A decade out: §7's "stop driving this MD until config changes" has no
/// dedicated halt state in the data model, so `Fatal` is modeled as a
/// back-off far past any realistic operator response time instead.
const FATAL_BACKOFF: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

fn default_backoff(error_runs: u32) -> Duration {
    Duration::from_secs((error_runs as u64).pow(2) * 60).min(Duration::from_secs(24 * 3600))
}

/// §7: dispatches `next_check` on the error kind rather than applying a
/// uniform back-off to every failure.
fn next_check_after_error(err: &DriverError, error_runs: u32) -> Instant {
    match err {
        DriverError::RateLimited { retry_after } => Instant::now() + retry_after.unwrap_or_else(|| default_backoff(error_runs)),
        DriverError::Fatal(_) => Instant::now() + FATAL_BACKOFF,
        _ => Instant::now() + default_backoff(error_runs),
    }
}
