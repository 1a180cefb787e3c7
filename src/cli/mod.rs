//! CLI entry point: wires a parsed [`args::Cli`] into a real driver —
//! config, store, challenge registry, and renewal supervisor — then
//! dispatches on the requested verb.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::challenge::{ChallengeRegistry, Dns01Responder, Http01Responder, MockDnsProvider, TlsAlpn01Responder};
use crate::config::Config;
use crate::error::{DriverError, Result};
use crate::renewal::RenewalSupervisor;
use crate::store::FileStore;

pub mod args;

use args::{Cli, Commands};

pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    tracing::debug!(level = %log_level, "logging initialized");
}

/// Builds a [`ChallengeRegistry`] with one responder per type the
/// configured managed domains actually use, binding HTTP-01 and
/// TLS-ALPN-01 to the well-known ports on every interface.
///
/// DNS-01 is wired to [`MockDnsProvider`] until a real provider is
/// selected by configuration; that wiring is an open point tracked in
/// the driver's design notes.
async fn build_challenge_registry() -> Result<ChallengeRegistry> {
    let mut registry = ChallengeRegistry::new();

    let http = Http01Responder::bind("0.0.0.0:80".parse().unwrap()).await?;
    registry.register(Arc::new(http));

    let tls_alpn = TlsAlpn01Responder::bind("0.0.0.0:443".parse().unwrap()).await?;
    registry.register(Arc::new(tls_alpn));

    let dns = Dns01Responder::new(Arc::new(MockDnsProvider::new()))?;
    registry.register(Arc::new(dns));

    Ok(registry)
}

async fn build_supervisor(config: &Config) -> Result<Arc<RenewalSupervisor>> {
    let store = Arc::new(FileStore::new(&config.store.base_path));
    let staging_root = config.store.base_path.join("STAGING");
    let responders = Arc::new(build_challenge_registry().await?);
    let specs = config.clone().into_specs()?;

    Ok(Arc::new(RenewalSupervisor::new(
        store,
        staging_root,
        responders,
        specs,
        config.renewal.concurrency,
    )))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::load(cli.config.as_deref())?;
    let supervisor = build_supervisor(&config).await?;
    supervisor.hydrate().await;

    match cli.command {
        Commands::Run(run_args) => {
            let interval = run_args
                .tick_interval_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| std::time::Duration::from_secs(config.renewal.tick_interval_secs));
            let addr = config
                .server
                .listen_addr
                .parse()
                .map_err(|e| DriverError::fatal(format!("invalid server.listen_addr: {}", e)))?;

            let supervisor_for_ticks = supervisor.clone();
            tokio::select! {
                _ = supervisor_for_ticks.run(interval) => unreachable!("RenewalSupervisor::run never returns"),
                result = crate::server::serve(addr, supervisor) => result?,
            }
            Ok(())
        }
        Commands::Once => {
            let outcomes = supervisor.tick().await;
            for outcome in &outcomes {
                match &outcome.error {
                    Some(err) => tracing::warn!(md = %outcome.md_name, error = %err, "renewal failed"),
                    None if outcome.renewed => tracing::info!(md = %outcome.md_name, "renewed"),
                    None => tracing::debug!(md = %outcome.md_name, "not due"),
                }
            }
            let report = serde_json::to_string_pretty(&outcomes)
                .map_err(|e| DriverError::fatal(format!("serializing outcomes: {}", e)))?;
            println!("{}", report);
            Ok(())
        }
        Commands::Status => {
            let statuses = crate::status::build(&supervisor).await;
            let report = serde_json::to_string_pretty(&statuses)
                .map_err(|e| DriverError::fatal(format!("serializing status: {}", e)))?;
            println!("{}", report);
            Ok(())
        }
    }
}
