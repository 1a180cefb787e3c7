//! Authorization sub-driver (§4.5): drives one authorization URL from
//! whatever state the CA holds it in through to `valid` or `invalid`,
//! installing and removing exactly one challenge response along the way.

use crate::challenge::ChallengeRegistry;
use crate::crypto::keypair::KeyMaterial;
use crate::error::{DriverError, ProblemDetail, Result};
use crate::order::{Authorization, Challenge};
use crate::protocol::{AccountIdentity, JwsBuilder};
use crate::transport::AcmeTransport;
use crate::types::ChallengeType;
use serde_json::json;
use std::time::{Duration, Instant};

/// Drives a single authorization to a terminal state, per §4.5.
pub struct AuthorizationDriver<'a> {
    transport: &'a AcmeTransport,
    responders: &'a ChallengeRegistry,
}

impl<'a> AuthorizationDriver<'a> {
    pub fn new(transport: &'a AcmeTransport, responders: &'a ChallengeRegistry) -> Self {
        Self { transport, responders }
    }

    /// Runs the full sub-driver against `authz_url`, using `allowed` (the
    /// MD's challenge-type allow-list intersected with what the driver
    /// supports) in preference order. Returns once the authorization is
    /// `valid`; any other terminal outcome is an `Err`.
    pub async fn run(
        &self,
        authz_url: &str,
        account: &KeyMaterial,
        account_kid: &str,
        allowed: &[ChallengeType],
        deadline: Instant,
    ) -> Result<()> {
        crate::metrics::global().challenge_attempts_total.inc();

        let authz = self.fetch(authz_url, account, account_kid).await?;
        if authz.status == "valid" {
            return Ok(());
        }

        let (challenge_type, challenge) = self.pick_challenge(&authz, allowed)?;
        let responder = self
            .responders
            .get(challenge_type)
            .ok_or_else(|| DriverError::challenge_setup(authz.identifier.value.clone(), format!("no responder registered for {}", challenge_type)))?;

        let key_authorization = JwsBuilder::new(account).key_authorization(&challenge.token)?;
        let identifier = authz.identifier.value.clone();

        let install_result = responder.install(&identifier, &challenge.token, &key_authorization).await;
        let outcome = match install_result {
            Ok(()) => self.drive_to_terminal(authz_url, &identifier, &challenge, account, account_kid, responder.as_ref(), &key_authorization, deadline).await,
            Err(e) => Err(e),
        };

        // §5: responder material must never outlive the authorization,
        // regardless of how this run ends.
        let _ = responder.remove(&identifier, &challenge.token).await;
        outcome
    }

    async fn drive_to_terminal(
        &self,
        authz_url: &str,
        identifier: &str,
        challenge: &Challenge,
        account: &KeyMaterial,
        account_kid: &str,
        responder: &(dyn crate::challenge::ChallengeResponder),
        key_authorization: &str,
        deadline: Instant,
    ) -> Result<()> {
        let confirmed = responder.confirm(identifier, &challenge.token, key_authorization).await?;
        if !confirmed {
            return Err(DriverError::challenge_setup(identifier.to_string(), "responder did not confirm local readiness".to_string()));
        }

        self.notify_ready(&challenge.url, account, account_kid).await?;
        self.poll_until_terminal(authz_url, identifier, account, account_kid, deadline).await
    }

    async fn fetch(&self, authz_url: &str, account: &KeyMaterial, account_kid: &str) -> Result<Authorization> {
        let resp = self
            .transport
            .post_signed(authz_url, account, AccountIdentity::Kid(account_kid), None)
            .await?;
        resp.json()
    }

    fn pick_challenge<'b>(&self, authz: &'b Authorization, allowed: &[ChallengeType]) -> Result<(ChallengeType, &'b Challenge)> {
        for candidate in allowed {
            if let Some(challenge) = authz.challenges.iter().find(|c| c.challenge_type == candidate.as_str()) {
                return Ok((*candidate, challenge));
            }
        }
        Err(DriverError::challenge_setup(
            authz.identifier.value.clone(),
            "no offered challenge type is in the configured allow-list".to_string(),
        ))
    }

    async fn notify_ready(&self, challenge_url: &str, account: &KeyMaterial, account_kid: &str) -> Result<()> {
        self.transport
            .post_signed(challenge_url, account, AccountIdentity::Kid(account_kid), Some(&json!({})))
            .await?;
        Ok(())
    }

    /// §4.5 step 5: poll with 1s-doubling-to-8s back-off until `valid` or
    /// `invalid`, bounded by `deadline`.
    async fn poll_until_terminal(
        &self,
        authz_url: &str,
        identifier: &str,
        account: &KeyMaterial,
        account_kid: &str,
        deadline: Instant,
    ) -> Result<()> {
        let mut delay = Duration::from_secs(1);
        loop {
            let authz = self.fetch(authz_url, account, account_kid).await?;
            match authz.status.as_str() {
                "valid" => return Ok(()),
                "invalid" => {
                    let detail = authz
                        .challenges
                        .iter()
                        .find_map(|c| c.error.clone())
                        .map(|v| ProblemDetail {
                            problem_type: v.get("type").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                            detail: v.get("detail").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                        })
                        .unwrap_or(ProblemDetail {
                            problem_type: String::new(),
                            detail: format!("authorization for {} went invalid", identifier),
                        });
                    return Err(DriverError::ChallengeFailed(detail));
                }
                _ => {}
            }

            if Instant::now() + delay > deadline {
                return Err(DriverError::timeout(format!("authorization for {} did not complete in time", identifier)));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(8));
        }
    }
}

/// Intersects an MD's allow-list with the responders actually registered,
/// preserving the allow-list's preference order.
pub fn supported_challenge_types(allowed: &[ChallengeType], registry: &ChallengeRegistry) -> Vec<ChallengeType> {
    allowed.iter().copied().filter(|ct| registry.get(*ct).is_some()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChallengeType;

    #[test]
    fn supported_types_preserves_allow_list_order_and_drops_unregistered() {
        let registry = ChallengeRegistry::new();
        let allowed = vec![ChallengeType::TlsAlpn01, ChallengeType::Http01, ChallengeType::Dns01];
        assert!(supported_challenge_types(&allowed, &registry).is_empty());
    }
}
