//! TLS-ALPN-01 responder: one shared `acme-tls/1` listener, presenting a
//! distinct self-signed cert per identifier selected by SNI, carrying the
//! `id-pe-acmeIdentifier` extension (RFC 8737 §3) over the key
//! authorization digest.

use async_trait::async_trait;
use rcgen::CertificateParams;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::ChallengeResponder;
use crate::error::{DriverError, Result};
use crate::types::ChallengeType;

const ACME_IDENTIFIER_OID: [u64; 9] = [1, 3, 6, 1, 5, 5, 7, 1, 31];

fn build_cert(domain: &str, key_authorization: &str) -> Result<CertifiedKey> {
    let digest = Sha256::digest(key_authorization.as_bytes());

    let mut params = CertificateParams::new(vec![domain.to_string()])
        .map_err(|e| DriverError::crypto(format!("cert params: {}", e)))?;
    // OCTET STRING tag + 32-byte length prefix around the raw digest.
    let mut value = vec![0x04, 0x20];
    value.extend_from_slice(&digest);
    params.custom_extensions.push(rcgen::CustomExtension::from_oid_content(&ACME_IDENTIFIER_OID, value));

    let key_pair = rcgen::KeyPair::generate().map_err(|e| DriverError::crypto(format!("key generation: {}", e)))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| DriverError::crypto(format!("self-sign: {}", e)))?;

    let cert_der = CertificateDer::from(cert.der().to_vec());
    let key_der = PrivateKeyDer::try_from(key_pair.serialize_der())
        .map_err(|_| DriverError::crypto("serializing challenge key"))?;
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key_der)
        .map_err(|e| DriverError::crypto(format!("unsupported key type: {}", e)))?;

    Ok(CertifiedKey::new(vec![cert_der], signing_key))
}

/// Resolves a `CertifiedKey` by SNI against whatever identifiers are
/// currently installed, so one listener serves every MD concurrently.
struct PerIdentityResolver {
    certs: RwLock<HashMap<String, Arc<CertifiedKey>>>,
}

impl std::fmt::Debug for PerIdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerIdentityResolver").finish()
    }
}

impl ResolvesServerCert for PerIdentityResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let name = client_hello.server_name()?;
        self.certs.read().unwrap().get(name).cloned()
    }
}

pub struct TlsAlpn01Responder {
    resolver: Arc<PerIdentityResolver>,
    _server: tokio::task::JoinHandle<()>,
}

impl TlsAlpn01Responder {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self> {
        let resolver = Arc::new(PerIdentityResolver { certs: RwLock::new(HashMap::new()) });

        let mut config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| DriverError::crypto(format!("tls protocol versions: {}", e)))?
            .with_no_client_auth()
            .with_cert_resolver(resolver.clone());
        config.alpn_protocols = vec![b"acme-tls/1".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| DriverError::challenge_setup("*".to_string(), format!("bind {}: {}", listen_addr, e)))?;

        tracing::info!(addr = %listen_addr, "tls-alpn-01 responder listening");
        let server = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "tls-alpn-01 accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    // The handshake alone proves possession of the
                    // challenge key; the CA closes the connection itself.
                    match acceptor.accept(stream).await {
                        Ok(_) => tracing::debug!(%peer, "tls-alpn-01 handshake completed"),
                        Err(e) => tracing::debug!(%peer, error = %e, "tls-alpn-01 handshake failed"),
                    }
                });
            }
        });

        Ok(Self { resolver, _server: server })
    }
}

#[async_trait]
impl ChallengeResponder for TlsAlpn01Responder {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::TlsAlpn01
    }

    async fn install(&self, identifier: &str, _token: &str, key_authorization: &str) -> Result<()> {
        let certified = build_cert(identifier, key_authorization)?;
        self.resolver.certs.write().unwrap().insert(identifier.to_string(), Arc::new(certified));
        Ok(())
    }

    async fn confirm(&self, identifier: &str, _token: &str, _key_authorization: &str) -> Result<bool> {
        Ok(self.resolver.certs.read().unwrap().contains_key(identifier))
    }

    async fn remove(&self, identifier: &str, _token: &str) -> Result<()> {
        self.resolver.certs.write().unwrap().remove(identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_cert_embeds_the_acme_identifier_extension() {
        let certified = build_cert("a.test", "tok1.thumb").unwrap();
        assert_eq!(certified.cert.len(), 1);
    }

    #[tokio::test]
    async fn install_then_confirm_then_remove() {
        let responder = TlsAlpn01Responder::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        responder.install("a.test", "tok1", "tok1.thumb").await.unwrap();
        assert!(responder.confirm("a.test", "tok1", "tok1.thumb").await.unwrap());
        responder.remove("a.test", "tok1").await.unwrap();
        assert!(!responder.confirm("a.test", "tok1", "tok1.thumb").await.unwrap());
    }
}
