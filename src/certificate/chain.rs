//! Parses an issued certificate chain and runs the post-issuance checks
//! §4.6 requires before a STAGING order is promoted to DOMAINS: the chain
//! parses, each certificate's validity window contains "now" within a
//! small skew, the leaf's SAN set covers every MD name, and the leaf's
//! public key matches the certificate key the driver holds.

use crate::crypto::keypair::KeyMaterial;
use crate::error::{DriverError, Result};
use jiff::Zoned;
use pem::parse_many;
use std::time::Duration;
use x509_parser::asn1_rs::FromDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::GeneralName;
use x509_parser::prelude::ParsedExtension;

/// A PEM certificate chain as returned by the ACME `certificate` endpoint:
/// leaf first, intermediates following, per RFC 8555 §7.4.2.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    pub leaf: Vec<u8>,
    pub intermediates: Vec<Vec<u8>>,
}

impl CertificateChain {
    /// Parses a PEM chain as downloaded from the CA.
    pub fn from_pem(pem_data: &[u8]) -> Result<Self> {
        let mut certs = Vec::new();
        for p in parse_many(pem_data).map_err(|e| DriverError::corrupt(format!("chain PEM: {}", e)))? {
            if p.tag() == "CERTIFICATE" {
                certs.push(p.contents().to_vec());
            }
        }
        if certs.is_empty() {
            return Err(DriverError::corrupt("no certificates found in chain PEM"));
        }
        let leaf = certs.remove(0);
        Ok(Self { leaf, intermediates: certs })
    }

    pub fn to_pem(&self) -> String {
        let mut out = String::new();
        for der in std::iter::once(&self.leaf).chain(self.intermediates.iter()) {
            out.push_str(&pem::encode(&pem::Pem::new("CERTIFICATE", der.clone())));
        }
        out
    }

    /// Runs every §4.6 post-issuance check. `skew` is the tolerance applied
    /// to each certificate's validity window (5 minutes per the spec).
    pub fn verify(&self, expected_domains: &[String], key: &KeyMaterial, skew: Duration) -> Result<()> {
        self.check_validity_window(skew)?;
        if !self.covers_names(expected_domains)? {
            return Err(DriverError::CertMismatch(format!(
                "leaf SAN set does not cover {:?}",
                expected_domains
            )));
        }
        if !self.matches_key(key)? {
            return Err(DriverError::CertMismatch(
                "leaf public key does not match the certificate key".to_string(),
            ));
        }
        Ok(())
    }

    fn check_validity_window(&self, skew: Duration) -> Result<()> {
        let now = Zoned::now().timestamp().as_second();
        let skew_secs = skew.as_secs() as i64;
        for (label, der) in self.labeled_certs() {
            let (_, cert) = X509Certificate::from_der(der)
                .map_err(|e| DriverError::CertMismatch(format!("invalid {} certificate: {}", label, e)))?;
            if cert.validity().not_after.timestamp() + skew_secs < now {
                return Err(DriverError::CertMismatch(format!("{} certificate expired", label)));
            }
            if cert.validity().not_before.timestamp() - skew_secs > now {
                return Err(DriverError::CertMismatch(format!("{} certificate not yet valid", label)));
            }
        }
        Ok(())
    }

    fn labeled_certs(&self) -> Vec<(&'static str, &Vec<u8>)> {
        let mut out = vec![("leaf", &self.leaf)];
        out.extend(self.intermediates.iter().map(|c| ("intermediate", c)));
        out
    }

    /// True if the leaf's SAN set contains every name in `expected_domains`.
    pub fn covers_names(&self, expected_domains: &[String]) -> Result<bool> {
        let sans = self.subject_alt_names()?;
        Ok(expected_domains.iter().all(|d| sans.contains(d)))
    }

    /// True if the leaf's public key matches `key`'s public component.
    pub fn matches_key(&self, key: &KeyMaterial) -> Result<bool> {
        let (_, cert) = X509Certificate::from_der(&self.leaf)
            .map_err(|e| DriverError::CertMismatch(format!("invalid leaf certificate: {}", e)))?;
        let cert_spki = cert.public_key().subject_public_key.data.as_ref();
        let key_spki = key.subject_public_key_bytes()?;
        Ok(cert_spki == key_spki.as_slice())
    }

    /// The leaf's `notAfter` as a Unix timestamp, used by the renewal
    /// supervisor (§4.7) to schedule the next check.
    pub fn not_after_unix(&self) -> Result<i64> {
        let (_, cert) = X509Certificate::from_der(&self.leaf)
            .map_err(|e| DriverError::corrupt(format!("invalid leaf certificate: {}", e)))?;
        Ok(cert.validity().not_after.timestamp())
    }

    pub fn common_name(&self) -> Result<String> {
        let (_, cert) = X509Certificate::from_der(&self.leaf)
            .map_err(|e| DriverError::corrupt(format!("invalid leaf certificate: {}", e)))?;
        for attr in cert.subject().iter_common_name() {
            if let Ok(cn) = attr.as_str() {
                return Ok(cn.to_string());
            }
        }
        Err(DriverError::corrupt("no Common Name found in leaf certificate"))
    }

    pub fn subject_alt_names(&self) -> Result<Vec<String>> {
        let (_, cert) = X509Certificate::from_der(&self.leaf)
            .map_err(|e| DriverError::corrupt(format!("invalid leaf certificate: {}", e)))?;

        let mut sans = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san_ext) = ext.parsed_extension() {
                for name in &san_ext.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        sans.push(dns.to_string());
                    }
                }
            }
        }
        Ok(sans)
    }
}
