use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use openssl::hash::{MessageDigest, hash};
use openssl::x509::X509;
use thiserror::Error;
use tracing::{debug, warn};
use x509_parser::prelude::*;

const MAX_CHAIN_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("X.509 error: {0}")]
    X509(#[from] X509Error),

    #[error("PEM bundle error: {0}")]
    Pem(#[from] openssl::error::ErrorStack),

    #[error("Certificate path error: {0}")]
    Path(String),
}

/// A trusted certificate and the identifying fields used in logs and lookups.
#[derive(Debug, Clone)]
pub struct CertificateEntry {
    pub der: Arc<Vec<u8>>,
    /// Lowercase hex SHA-1 of the DER encoding
    pub fingerprint: String,
    pub serial_number: String,
    pub subject: String,
    pub issuer: String,
}

impl CertificateEntry {
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, TrustStoreError> {
        let der = der.as_ref();
        let cert = parse_der(der)?;
        Ok(Self {
            fingerprint: fingerprint(der)?,
            serial_number: cert.tbs_certificate.serial.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            der: Arc::new(der.to_vec()),
        })
    }

    pub fn certificate(&self) -> Result<X509Certificate<'_>, TrustStoreError> {
        parse_der(&self.der)
    }
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>, TrustStoreError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| TrustStoreError::X509(e.into()))
}

fn fingerprint(der: &[u8]) -> Result<String, TrustStoreError> {
    Ok(hex::encode(hash(MessageDigest::sha1(), der)?))
}

fn issued_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    cert.issuer() == issuer.subject() && cert.verify_signature(Some(issuer.public_key())).is_ok()
}

/// Certificates a verifying party accepts signatures from.
///
/// A presented chain is trusted when its leaf is itself in the store (explicit key
/// trust, the usual arrangement with certificates exchanged through metadata) or when a
/// valid path leads from the leaf to a self-signed anchor held in the store.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    entries: Arc<DashMap<String, CertificateEntry>>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CertificateEntry> + '_ {
        self.entries.iter().map(|entry| entry.value().clone())
    }

    /// Add DER certificates, skipping any that do not parse. Returns how many were added.
    pub fn add_certs<I, D>(&self, certs: I) -> usize
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let mut added = 0;
        for der in certs {
            match CertificateEntry::from_der(der) {
                Ok(entry) => {
                    self.entries.insert(entry.fingerprint.clone(), entry);
                    added += 1;
                }
                Err(e) => warn!("skipping unparsable trusted certificate: {e}"),
            }
        }
        added
    }

    /// Add every certificate of a PEM bundle.
    pub fn add_pem_bundle(&self, pem: &[u8]) -> Result<usize, TrustStoreError> {
        let ders = X509::stack_from_pem(pem)?
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.add_certs(ders))
    }

    pub fn contains(&self, der: &[u8]) -> bool {
        fingerprint(der).is_ok_and(|fp| self.entries.contains_key(&fp))
    }

    pub fn remove(&self, der: &[u8]) -> bool {
        fingerprint(der).is_ok_and(|fp| self.entries.remove(&fp).is_some())
    }

    /// Check a DER certificate chain, leaf first.
    ///
    /// Certificates that do not parse and chains longer than ten are errors; a chain that
    /// simply does not lead to the store is `Ok(false)`.
    pub fn verify<I, D>(&self, chain: I) -> Result<bool, TrustStoreError>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let presented = chain
            .into_iter()
            .map(CertificateEntry::from_der)
            .collect::<Result<Vec<_>, _>>()?;
        if presented.len() > MAX_CHAIN_LEN {
            return Err(TrustStoreError::Path(format!(
                "{} certificates presented, at most {MAX_CHAIN_LEN} accepted",
                presented.len()
            )));
        }
        let Some(leaf) = presented.first() else {
            return Ok(false);
        };

        if self.entries.contains_key(&leaf.fingerprint) {
            debug!(subject = %leaf.subject, "leaf certificate explicitly trusted");
            return Ok(true);
        }

        let path = match self.path_to_anchor(&presented) {
            Ok(path) => path,
            Err(e) => {
                debug!(subject = %leaf.subject, "no certification path: {e}");
                return Ok(false);
            }
        };
        self.path_is_valid(&path)
    }

    fn is_anchor(&self, cert: &X509Certificate<'_>) -> bool {
        cert.subject() == cert.issuer()
            && self.entries.iter().any(|entry| {
                entry.value().certificate().is_ok_and(|anchor| {
                    anchor.subject() == cert.subject()
                        && anchor.public_key().raw == cert.public_key().raw
                })
            })
    }

    /// Issuer of `cert` among the presented certificates, then among the trusted ones.
    fn find_issuer(
        &self,
        cert: &X509Certificate<'_>,
        presented: &[CertificateEntry],
    ) -> Option<CertificateEntry> {
        presented
            .iter()
            .cloned()
            .chain(self.iter())
            .find(|candidate| {
                candidate
                    .certificate()
                    .is_ok_and(|issuer| issued_by(cert, &issuer))
            })
    }

    /// Walk issuer links from the leaf until a trusted anchor is reached.
    fn path_to_anchor(
        &self,
        presented: &[CertificateEntry],
    ) -> Result<Vec<CertificateEntry>, TrustStoreError> {
        let mut path: Vec<CertificateEntry> = Vec::new();
        let mut visited = HashSet::new();
        let mut next = presented.first().cloned();

        while let Some(entry) = next.take() {
            if !visited.insert(entry.fingerprint.clone()) {
                return Err(TrustStoreError::Path("issuer loop".to_string()));
            }
            let cert = entry.certificate()?;
            if self.is_anchor(&cert) {
                path.push(entry);
                return Ok(path);
            }
            if cert.subject() == cert.issuer() {
                return Err(TrustStoreError::Path(format!(
                    "untrusted self-signed certificate {}",
                    entry.subject
                )));
            }
            next = self.find_issuer(&cert, presented);
            if next.is_none() {
                return Err(TrustStoreError::Path(format!(
                    "no issuer for {}",
                    entry.subject
                )));
            }
            path.push(entry);
        }
        Err(TrustStoreError::Path("empty chain".to_string()))
    }

    /// Every certificate must be within its validity period and signed by its successor;
    /// the anchor must verify against itself.
    fn path_is_valid(&self, path: &[CertificateEntry]) -> Result<bool, TrustStoreError> {
        let certs = path
            .iter()
            .map(CertificateEntry::certificate)
            .collect::<Result<Vec<_>, _>>()?;

        if certs.iter().any(|cert| !cert.validity().is_valid()) {
            return Ok(false);
        }
        let links_hold = certs
            .windows(2)
            .all(|pair| pair[0].verify_signature(Some(pair[1].public_key())).is_ok());
        let anchor_holds = certs
            .last()
            .is_some_and(|anchor| anchor.verify_signature(None).is_ok());
        Ok(links_hold && anchor_holds)
    }
}
