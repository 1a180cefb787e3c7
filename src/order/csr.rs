//! CSR construction for a certificate key and an identifier set (§4.6).

use crate::crypto::keypair::KeyMaterial;
use crate::error::{DriverError, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType};

/// Builds a DER-encoded CSR for `domains`, signed by `key`. The first
/// domain becomes the subject Common Name; every domain becomes a SAN
/// DNS entry (rcgen always adds the CN domain to the SAN list too).
pub fn build_csr(domains: &[String], key: &KeyMaterial) -> Result<Vec<u8>> {
    if domains.is_empty() {
        return Err(DriverError::fatal("CSR requires at least one domain"));
    }

    let mut params = CertificateParams::new(domains.to_vec())
        .map_err(|e| DriverError::crypto(format!("invalid CSR params: {}", e)))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, domains[0].clone());
    params.distinguished_name = dn;

    let key_pair = key.to_rcgen_keypair()?;
    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| DriverError::crypto(format!("CSR generation failed: {}", e)))?;
    Ok(csr.der().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keypair::KeySpec;

    #[test]
    fn builds_a_nonempty_der_csr() {
        let key = KeyMaterial::generate(KeySpec::EcdsaP256).unwrap();
        let der = build_csr(&["example.com".to_string()], &key).unwrap();
        assert!(!der.is_empty());
    }

    #[test]
    fn multi_domain_csr_succeeds() {
        let key = KeyMaterial::generate(KeySpec::EcdsaP256).unwrap();
        let domains = vec!["a.test".to_string(), "b.test".to_string()];
        let der = build_csr(&domains, &key).unwrap();
        assert!(!der.is_empty());
    }

    #[test]
    fn rejects_empty_domain_list() {
        let key = KeyMaterial::generate(KeySpec::EcdsaP256).unwrap();
        assert!(build_csr(&[], &key).is_err());
    }
}
