//! Centralizes signed-POST request construction, nonce handling, and
//! badNonce/5xx retry policy for every authenticated ACME request the
//! driver makes (§4.3).

use crate::crypto::keypair::KeyMaterial;
use crate::error::{DriverError, ProblemDetail, Result};
use crate::protocol::{AccountIdentity, JwsBuilder, NonceManager};
use crate::transport::http_client::{HttpClient, HttpResponse};
use crate::transport::retry::RetryPolicy;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Signed ACME request/response plumbing over a single CA's directory.
pub struct AcmeTransport {
    http: HttpClient,
    nonces: NonceManager,
    retry: RetryPolicy,
}

impl AcmeTransport {
    pub fn new(http: HttpClient, nonces: NonceManager, retry: RetryPolicy) -> Self {
        Self { http, nonces, retry }
    }

    /// Unauthenticated GET, used only for directory discovery.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.http.get(url).await?;
        Self::check_status(&resp)?;
        resp.json()
    }

    /// POST-as-GET or a signed POST with a body, retrying on `badNonce` and
    /// on 5xx responses per the configured [`RetryPolicy`].
    pub async fn post_signed(
        &self,
        url: &str,
        key: &KeyMaterial,
        identity: AccountIdentity<'_>,
        payload: Option<&Value>,
    ) -> Result<HttpResponse> {
        let builder = JwsBuilder::new(key);
        let mut attempt = 0u32;
        loop {
            let nonce = self.nonces.get_nonce().await?;
            let body = builder.sign(url, &nonce, clone_identity(&identity), payload)?;
            let resp = self.http.post_jose(url, &body).await?;

            if let Some(fresh) = resp.replay_nonce() {
                self.nonces.cache_nonce(fresh.to_string()).await;
            }

            if resp.is_success() {
                return Ok(resp);
            }

            let problem = Self::parse_problem(&resp);
            let err = DriverError::from_problem(resp.status, problem);

            // badNonce is a protocol-mandated retry regardless of the
            // configured 4xx/5xx policy: the CA is telling us the nonce we
            // signed with is gone, not that the request itself is bad.
            let retryable = err.is_transient() && attempt < self.retry.max_retries;
            let retryable = retryable || (resp.is_server_error() && self.retry.should_retry(resp.status, attempt));
            if retryable {
                tokio::time::sleep(self.retry.retry_delay(attempt)).await;
                attempt += 1;
                continue;
            }

            if let DriverError::RateLimited { .. } = err {
                return Err(DriverError::RateLimited {
                    retry_after: resp.retry_after(),
                });
            }

            return Err(err);
        }
    }

    fn check_status(resp: &HttpResponse) -> Result<()> {
        if resp.is_success() {
            return Ok(());
        }
        Err(DriverError::from_problem(resp.status, Self::parse_problem(resp)))
    }

    fn parse_problem(resp: &HttpResponse) -> ProblemDetail {
        resp.json::<ProblemDetail>().unwrap_or(ProblemDetail {
            problem_type: String::new(),
            detail: format!("HTTP {}", resp.status),
        })
    }
}

fn clone_identity<'a>(identity: &AccountIdentity<'a>) -> AccountIdentity<'a> {
    match identity {
        AccountIdentity::Jwk(jwk) => AccountIdentity::Jwk(jwk),
        AccountIdentity::Kid(kid) => AccountIdentity::Kid(kid),
    }
}
