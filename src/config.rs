//! Configuration for the renewal driver (§2.9).
//!
//! Layered: a TOML file defines defaults and the list of managed domains;
//! `ACMED_<SECTION>__<KEY>`-shaped environment variables override individual
//! fields at process start. Every type is `serde::Deserialize` with
//! `#[serde(default)]` throughout, so a partial file is valid.

use crate::account::manager::ExternalAccountBinding;
use crate::crypto::keypair::KeySpec;
use crate::error::{DriverError, Result};
use crate::order::ManagedDomain;
use crate::renewal::ManagedDomainSpec;
use crate::types::ChallengeType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration: shared store/server/renewal settings plus the
/// list of managed domains this process drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub renewal: RenewalSettings,

    #[serde(default)]
    pub managed_domains: Vec<ManagedDomainConfig>,
}

/// One entry per managed domain (§3's MD data model), the unit the
/// renewal supervisor and order driver operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedDomainConfig {
    /// Stable local name; also the STAGING/DOMAINS record key.
    pub name: String,

    /// DNS names to cover. The first is the certificate's subject CN.
    pub domains: Vec<String>,

    #[serde(default = "default_ca_url")]
    pub ca_url: String,

    #[serde(default)]
    pub contacts: Vec<String>,

    #[serde(default = "default_true")]
    pub tos_accepted: bool,

    /// Challenge types this MD allows, in preference order.
    #[serde(default = "default_challenge_types")]
    pub challenge_types: Vec<ChallengeType>,

    #[serde(default)]
    pub key_spec: KeySpec,

    /// How long before expiry the supervisor starts renewing.
    #[serde(default = "default_renewal_window_secs")]
    pub renewal_window_secs: u64,

    /// Deadline for one order-driver run (authorization + finalize +
    /// poll), after which the attempt is abandoned for this tick.
    #[serde(default = "default_monitor_timeout_secs")]
    pub monitor_timeout_secs: u64,

    #[serde(default)]
    pub eab_keyid: Option<String>,

    #[serde(default)]
    pub eab_hmac: Option<String>,
}

impl ManagedDomainConfig {
    fn into_spec(self) -> Result<ManagedDomainSpec> {
        if self.domains.is_empty() {
            return Err(DriverError::fatal(format!("managed domain {:?} has no domains", self.name)));
        }
        if self.challenge_types.is_empty() {
            return Err(DriverError::fatal(format!("managed domain {:?} has no allowed challenge types", self.name)));
        }

        let eab = match (self.eab_keyid, self.eab_hmac) {
            (Some(kid), Some(hmac)) => {
                let mac_key = crate::crypto::encoding::Base64Encoding::decode(&hmac)
                    .map_err(|e| DriverError::fatal(format!("managed domain {:?}: invalid eab_hmac: {}", self.name, e)))?;
                Some(ExternalAccountBinding { kid, mac_key })
            }
            (None, None) => None,
            _ => {
                return Err(DriverError::fatal(format!(
                    "managed domain {:?}: eab_keyid and eab_hmac must be set together",
                    self.name
                )));
            }
        };

        Ok(ManagedDomainSpec {
            md: ManagedDomain {
                name: self.name,
                domains: self.domains,
                key_spec: self.key_spec,
                challenge_types: self.challenge_types,
                monitor_timeout: Duration::from_secs(self.monitor_timeout_secs),
            },
            ca_directory_url: self.ca_url,
            contacts: self.contacts,
            tos_accepted: self.tos_accepted,
            renewal_window: Duration::from_secs(self.renewal_window_secs),
            eab,
        })
    }
}

/// Where the grouped store keeps its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_base")]
    pub base_path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { base_path: default_store_base() }
    }
}

/// The read-only status/health HTTP surface (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_status_listen")]
    pub listen_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { listen_addr: default_status_listen() }
    }
}

/// How the renewal supervisor paces its ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalSettings {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Upper bound on MDs driven concurrently in one tick.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self { tick_interval_secs: default_tick_interval_secs(), concurrency: default_concurrency() }
    }
}

fn default_ca_url() -> String {
    "https://acme-v02.api.letsencrypt.org/directory".to_string()
}

fn default_true() -> bool {
    true
}

fn default_challenge_types() -> Vec<ChallengeType> {
    vec![ChallengeType::Http01]
}

fn default_renewal_window_secs() -> u64 {
    30 * 24 * 3600
}

fn default_monitor_timeout_secs() -> u64 {
    300
}

fn default_store_base() -> PathBuf {
    PathBuf::from("/var/lib/acmed")
}

fn default_status_listen() -> String {
    "127.0.0.1:8555".to_string()
}

fn default_tick_interval_secs() -> u64 {
    3600
}

fn default_concurrency() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            server: ServerSettings::default(),
            renewal: RenewalSettings::default(),
            managed_domains: Vec::new(),
        }
    }
}

impl Config {
    /// Loads from `path` (defaulting to `acmed.toml` in the working
    /// directory), applies environment overrides, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = PathBuf::from("acmed.toml");
        let path = path.unwrap_or(&default_path);
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(DriverError::from)
    }

    /// Overrides a handful of top-level fields from the environment; per-MD
    /// fields are only ever set via the file, since `ACMED_MANAGED_DOMAINS`
    /// has no sane flat env representation.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(base) = env::var("ACMED_STORE__BASE_PATH") {
            self.store.base_path = PathBuf::from(base);
        }
        if let Ok(addr) = env::var("ACMED_SERVER__LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(secs) = env::var("ACMED_RENEWAL__TICK_INTERVAL_SECS") {
            self.renewal.tick_interval_secs =
                secs.parse().map_err(|_| DriverError::fatal("ACMED_RENEWAL__TICK_INTERVAL_SECS must be an integer"))?;
        }
        if let Ok(n) = env::var("ACMED_RENEWAL__CONCURRENCY") {
            self.renewal.concurrency =
                n.parse().map_err(|_| DriverError::fatal("ACMED_RENEWAL__CONCURRENCY must be an integer"))?;
        }
        Ok(())
    }

    /// Cross-field validation: unique MD names, non-empty domain lists,
    /// at least one allowed challenge type per MD.
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for md in &self.managed_domains {
            if md.name.is_empty() {
                return Err(DriverError::fatal("managed domain name must not be empty"));
            }
            if !seen.insert(md.name.clone()) {
                return Err(DriverError::fatal(format!("duplicate managed domain name: {}", md.name)));
            }
            if md.domains.is_empty() {
                return Err(DriverError::fatal(format!("managed domain {:?} has no domains", md.name)));
            }
            if md.challenge_types.is_empty() {
                return Err(DriverError::fatal(format!("managed domain {:?} has no allowed challenge types", md.name)));
            }
        }
        if self.renewal.tick_interval_secs == 0 {
            return Err(DriverError::fatal("renewal.tick_interval_secs must be greater than 0"));
        }
        Ok(())
    }

    /// Consumes the config into the specs the renewal supervisor drives.
    pub fn into_specs(self) -> Result<Vec<ManagedDomainSpec>> {
        self.managed_domains.into_iter().map(ManagedDomainConfig::into_spec).collect()
    }
}
