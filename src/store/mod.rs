//! The grouped, atomic persistence layer every other component drives
//! state through (§4.1). Every write the driver makes — order state,
//! staged keys/certs, challenge responses, account credentials — goes
//! through a [`Store`], never raw filesystem calls, so that an in-memory
//! implementation can stand in for tests.

pub mod file;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

pub use file::FileStore;
pub use memory::MemoryStore;

/// The six persistence groups named in the data model (§3). Each groups
/// records by MD name (or account id, for `Accounts`); within a name,
/// records are further keyed by a file name (`order.json`, `cert.pem`,
/// `privkey.pem`, a challenge token, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Live, verified certificate/key material currently in service.
    Domains,
    /// In-progress order/authorization state and not-yet-promoted
    /// key/cert material, keyed by MD name.
    Staging,
    /// Pending challenge responses, keyed by token.
    Challenges,
    /// ACME account credentials, keyed by a locally-assigned account id.
    Accounts,
    /// Scratch space for atomic write staging; purged freely.
    Tmp,
    /// Cached OCSP responses, keyed by MD name.
    Ocsp,
}

impl Group {
    fn dirname(&self) -> &'static str {
        match self {
            Group::Domains => "domains",
            Group::Staging => "staging",
            Group::Challenges => "challenges",
            Group::Accounts => "accounts",
            Group::Tmp => "tmp",
            Group::Ocsp => "ocsp",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dirname())
    }
}

/// Grouped, atomic key-value persistence. Implementations must make
/// `write` crash-atomic (a reader never observes a partially written
/// file) and must make every other operation safe to call concurrently
/// with a `write` to a different `name`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Writes `data` to `group/name/file`, replacing any prior contents
    /// atomically (write to a temp file, then rename over the target).
    async fn write(&self, group: Group, name: &str, file: &str, data: &[u8]) -> Result<()>;

    /// Reads `group/name/file`. `Ok(None)` means the record is absent,
    /// distinct from any I/O failure (which is `Err`).
    async fn read(&self, group: Group, name: &str, file: &str) -> Result<Option<Vec<u8>>>;

    /// Removes a single file within a name's record, if present.
    async fn remove(&self, group: Group, name: &str, file: &str) -> Result<()>;

    /// Removes every file under `group/name` (used to purge a failed or
    /// superseded order's STAGING record, or a consumed CHALLENGES entry).
    async fn remove_all(&self, group: Group, name: &str) -> Result<()>;

    /// Moves every file under `from_group/name` to `to_group/name`,
    /// atomically with respect to readers of either group (used to
    /// promote a validated order from STAGING to DOMAINS).
    async fn rename(&self, from_group: Group, to_group: Group, name: &str) -> Result<()>;

    /// Lists the record names present in a group.
    async fn names(&self, group: Group) -> Result<Vec<String>>;

    /// Lists the file names present within one record.
    async fn files(&self, group: Group, name: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    async fn write(&self, group: Group, name: &str, file: &str, data: &[u8]) -> Result<()> {
        (**self).write(group, name, file, data).await
    }

    async fn read(&self, group: Group, name: &str, file: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(group, name, file).await
    }

    async fn remove(&self, group: Group, name: &str, file: &str) -> Result<()> {
        (**self).remove(group, name, file).await
    }

    async fn remove_all(&self, group: Group, name: &str) -> Result<()> {
        (**self).remove_all(group, name).await
    }

    async fn rename(&self, from_group: Group, to_group: Group, name: &str) -> Result<()> {
        (**self).rename(from_group, to_group, name).await
    }

    async fn names(&self, group: Group) -> Result<Vec<String>> {
        (**self).names(group).await
    }

    async fn files(&self, group: Group, name: &str) -> Result<Vec<String>> {
        (**self).files(group, name).await
    }
}
