/// Error taxonomy for the renewal driver.
///
/// Variants are grouped by policy, not by origin: the supervisor dispatches
/// on the variant to decide whether to retry in-process, back off, or stop
/// driving an MD until configuration changes.
use std::time::Duration;
use thiserror::Error;

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// A CA-supplied RFC 7807 problem document, kept verbatim for user-visible
/// surfacing alongside the driver's phase label.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProblemDetail {
    #[serde(rename = "type", default)]
    pub problem_type: String,
    #[serde(default)]
    pub detail: String,
}

impl std::fmt::Display for ProblemDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.problem_type.is_empty() {
            write!(f, "{}", self.detail)
        } else {
            write!(f, "{} ({})", self.detail, self.problem_type)
        }
    }
}

/// Error types for driver operations, grouped per the error handling design.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Network failure, 5xx without `Retry-After`, or a stale nonce.
    /// Recovered in-driver by the transport retry policy; only surfaced to
    /// the supervisor once retries are exhausted.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// CA asked us to wait. `retry_after` becomes the next scheduled tick.
    #[error("rate limited by CA{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// The challenge responder refused to install or confirm a response.
    /// The order itself is kept; the supervisor retries on the next tick.
    #[error("challenge setup failed for {domain}: {reason}")]
    ChallengeSetup { domain: String, reason: String },

    /// CA marked an authorization `invalid`. The order is purged.
    #[error("challenge failed: {0}")]
    ChallengeFailed(ProblemDetail),

    /// Account is unauthorized, deactivated, or 404s; supervisor recreates
    /// the account and retries once.
    #[error("account unauthorized: {0}")]
    Unauthorized(ProblemDetail),

    /// CAA policy rejected issuance for a name.
    #[error("CAA problem: {0}")]
    CaaProblem(ProblemDetail),

    /// DNS-01 propagation or resolution problem.
    #[error("DNS problem: {0}")]
    DnsProblem(ProblemDetail),

    /// Local post-issuance verification failed (SAN coverage, key match,
    /// validity window). STAGING is purged and the order restarts.
    #[error("issued certificate failed verification: {0}")]
    CertMismatch(String),

    /// Store I/O failure (permission, disk). Aborts the current tick.
    #[error("store I/O error: {0}")]
    StoreIo(String),

    /// Store returned bytes that failed to parse.
    #[error("corrupt store entry: {0}")]
    Corrupt(String),

    /// The caller-supplied deadline elapsed. On-disk state remains
    /// resumable; the supervisor retries next tick.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Unrecoverable without a configuration change (ToS not accepted,
    /// unsupported key spec, invalid MD definition).
    #[error("fatal configuration error: {0}")]
    Fatal(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// PEM encoding/decoding error.
    #[error("PEM error: {0}")]
    Pem(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl DriverError {
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        DriverError::Transient(msg.into())
    }

    pub fn challenge_setup<S: Into<String>>(domain: S, reason: S) -> Self {
        DriverError::ChallengeSetup {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        DriverError::Crypto(msg.into())
    }

    pub fn pem<S: Into<String>>(msg: S) -> Self {
        DriverError::Pem(msg.into())
    }

    pub fn fatal<S: Into<String>>(msg: S) -> Self {
        DriverError::Fatal(msg.into())
    }

    pub fn store_io<S: Into<String>>(msg: S) -> Self {
        DriverError::StoreIo(msg.into())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        DriverError::Corrupt(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        DriverError::Timeout(msg.into())
    }

    /// Maps an ACME `urn:ietf:params:acme:error:*` problem type to a
    /// taxonomy kind, per the transport's 4xx/5xx handling table.
    pub fn from_problem(status: u16, problem: ProblemDetail) -> Self {
        let kind = problem
            .problem_type
            .strip_prefix("urn:ietf:params:acme:error:")
            .unwrap_or("");
        match kind {
            "badNonce" => DriverError::Transient("badNonce".into()),
            "rateLimited" => DriverError::RateLimited { retry_after: None },
            "unauthorized" | "accountDoesNotExist" => DriverError::Unauthorized(problem),
            "caa" => DriverError::CaaProblem(problem),
            "dns" => DriverError::DnsProblem(problem),
            "connection" | "serverInternal" if status >= 500 => {
                DriverError::Transient(problem.detail)
            }
            _ => DriverError::ChallengeFailed(problem),
        }
    }

    /// True if this error should be retried by the transport itself rather
    /// than bubbled to the supervisor.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Transient(_))
    }
}
