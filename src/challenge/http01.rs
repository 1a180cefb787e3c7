//! HTTP-01 responder: a single long-lived axum server, shared across
//! every MD the driver serves, keyed by token (§5: "the responder's
//! challenge directory is shared but keyed by token, so collisions are
//! impossible").

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::{Router, http::StatusCode, routing::get};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use super::ChallengeResponder;
use crate::error::{DriverError, Result};
use crate::types::ChallengeType;

type TokenMap = Arc<RwLock<HashMap<String, String>>>;

pub struct Http01Responder {
    key_authorizations: TokenMap,
    _server: tokio::task::JoinHandle<()>,
}

impl Http01Responder {
    /// Binds `listen_addr` and spawns the challenge server immediately;
    /// the responder answers `GET /.well-known/acme-challenge/<token>`
    /// for as long as it lives.
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self> {
        let key_authorizations: TokenMap = Arc::new(RwLock::new(HashMap::new()));
        let app = Router::new()
            .route("/.well-known/acme-challenge/{token}", get(handle_challenge))
            .with_state(key_authorizations.clone());

        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| DriverError::challenge_setup("*".to_string(), format!("bind {}: {}", listen_addr, e)))?;

        tracing::info!(addr = %listen_addr, "http-01 responder listening");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { key_authorizations, _server: server })
    }
}

async fn handle_challenge(
    Path(token): Path<String>,
    State(key_authorizations): State<TokenMap>,
) -> std::result::Result<String, StatusCode> {
    let map = key_authorizations.read().await;
    map.get(&token).cloned().ok_or(StatusCode::NOT_FOUND)
}

#[async_trait]
impl ChallengeResponder for Http01Responder {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Http01
    }

    async fn install(&self, _identifier: &str, token: &str, key_authorization: &str) -> Result<()> {
        let mut map = self.key_authorizations.write().await;
        map.insert(token.to_string(), key_authorization.to_string());
        Ok(())
    }

    async fn confirm(&self, _identifier: &str, token: &str, key_authorization: &str) -> Result<bool> {
        let map = self.key_authorizations.read().await;
        Ok(map.get(token).map(|v| v == key_authorization).unwrap_or(false))
    }

    async fn remove(&self, _identifier: &str, token: &str) -> Result<()> {
        let mut map = self.key_authorizations.write().await;
        map.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_then_confirm_roundtrips() {
        let responder = Http01Responder::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        responder.install("a.test", "tok1", "tok1.thumb").await.unwrap();
        assert!(responder.confirm("a.test", "tok1", "tok1.thumb").await.unwrap());
        responder.remove("a.test", "tok1").await.unwrap();
        assert!(!responder.confirm("a.test", "tok1", "tok1.thumb").await.unwrap());
    }
}
