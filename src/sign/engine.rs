use openssl::bn::BigNum;
use openssl::dsa::DsaSig;
use openssl::pkey::{HasPublic, Id, PKeyRef, Private, Public};
use openssl::sign::{Signer, Verifier};
use tracing::debug;

use super::{Result, SignError, SignatureAlgorithm};
use crate::crypto::DigestAlgorithm;
use crate::xmldsig::{self, CanonicalizationAlgorithm, Span};

/// The primitives XML signature construction and validation run on.
///
/// Passed explicitly to verification so callers choose the implementation per call.
pub trait SignatureEngine: Send + Sync {
    /// Canonicalize the element at `target` (the document element when `None`) without
    /// the subtree at `exclude`.
    fn canonicalize(
        &self,
        xml: &str,
        target: Option<Span>,
        exclude: Option<Span>,
        algorithm: CanonicalizationAlgorithm,
        inclusive_prefixes: &[String],
    ) -> Result<String>;

    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>>;

    /// Produce an XML-DSig `SignatureValue` (DSA values are `r || s`).
    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        key: &PKeyRef<Private>,
        data: &[u8],
    ) -> Result<Vec<u8>>;

    fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        key: &PKeyRef<Public>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool>;
}

/// OpenSSL backed [`SignatureEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSignatureEngine;

impl SignatureEngine for DefaultSignatureEngine {
    fn canonicalize(
        &self,
        xml: &str,
        target: Option<Span>,
        exclude: Option<Span>,
        algorithm: CanonicalizationAlgorithm,
        inclusive_prefixes: &[String],
    ) -> Result<String> {
        Ok(xmldsig::canonicalize_subtree(
            xml,
            target,
            exclude,
            algorithm,
            inclusive_prefixes,
        )?)
    }

    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        Ok(algorithm.hash(data)?)
    }

    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        key: &PKeyRef<Private>,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let der = sign_detached(algorithm, key, data)?;
        if algorithm.key_id() != Id::DSA {
            return Ok(der);
        }
        let q_len = key.dsa()?.q().num_bytes();
        dsa_der_to_raw(&der, q_len)
    }

    fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        key: &PKeyRef<Public>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        if algorithm.key_id() != Id::DSA {
            return verify_detached(algorithm, key, data, signature);
        }
        match dsa_raw_to_der(signature) {
            Some(der) => verify_detached(algorithm, key, data, &der),
            None => {
                debug!(len = signature.len(), "DSA signature value has an odd length");
                Ok(false)
            }
        }
    }
}

fn ensure_key_family<T: HasPublic>(algorithm: SignatureAlgorithm, key: &PKeyRef<T>) -> Result<()> {
    if key.id() == algorithm.key_id() {
        Ok(())
    } else {
        Err(SignError::UnsupportedKeyType(format!(
            "{algorithm} needs a {} key",
            if algorithm.key_id() == Id::DSA { "DSA" } else { "RSA" }
        )))
    }
}

/// Sign `data`; DSA signatures come out DER encoded.
pub(crate) fn sign_detached(
    algorithm: SignatureAlgorithm,
    key: &PKeyRef<Private>,
    data: &[u8],
) -> Result<Vec<u8>> {
    ensure_key_family(algorithm, key)?;
    let mut signer = Signer::new(algorithm.digest(), key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

/// Verify a signature produced by [`sign_detached`].
///
/// Signatures openssl cannot even decode count as not matching.
pub(crate) fn verify_detached(
    algorithm: SignatureAlgorithm,
    key: &PKeyRef<Public>,
    data: &[u8],
    signature: &[u8],
) -> Result<bool> {
    ensure_key_family(algorithm, key)?;
    let mut verifier = Verifier::new(algorithm.digest(), key)?;
    verifier.update(data)?;
    match verifier.verify(signature) {
        Ok(valid) => Ok(valid),
        Err(e) => {
            debug!("signature rejected by openssl: {e}");
            Ok(false)
        }
    }
}

fn dsa_der_to_raw(der: &[u8], q_len: i32) -> Result<Vec<u8>> {
    let sig = DsaSig::from_der(der)?;
    let mut raw = sig.r().to_vec_padded(q_len)?;
    raw.extend(sig.s().to_vec_padded(q_len)?);
    Ok(raw)
}

fn dsa_raw_to_der(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return None;
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let r = BigNum::from_slice(r).ok()?;
    let s = BigNum::from_slice(s).ok()?;
    DsaSig::from_private_components(r, s).ok()?.to_der().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::dsa::Dsa;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;

    fn public<T: HasPublic>(key: &PKeyRef<T>) -> PKey<Public> {
        PKey::public_key_from_der(&key.public_key_to_der().unwrap()).unwrap()
    }

    #[test]
    fn test_rsa_sign_verify() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let engine = DefaultSignatureEngine;

        let signature = engine
            .sign(SignatureAlgorithm::RsaSha1, &key, b"signed info")
            .unwrap();
        assert_eq!(signature.len(), 256);
        assert!(
            engine
                .verify(SignatureAlgorithm::RsaSha1, &public(&key), b"signed info", &signature)
                .unwrap()
        );
        assert!(
            !engine
                .verify(SignatureAlgorithm::RsaSha1, &public(&key), b"other info", &signature)
                .unwrap()
        );
    }

    #[test]
    fn test_dsa_signature_value_is_raw() {
        let key = PKey::from_dsa(Dsa::generate(1024).unwrap()).unwrap();
        let engine = DefaultSignatureEngine;

        let signature = engine
            .sign(SignatureAlgorithm::DsaSha1, &key, b"signed info")
            .unwrap();
        // r || s, each padded to the 160 bit subgroup order
        assert_eq!(signature.len(), 40);
        assert!(
            engine
                .verify(SignatureAlgorithm::DsaSha1, &public(&key), b"signed info", &signature)
                .unwrap()
        );
        assert!(
            !engine
                .verify(SignatureAlgorithm::DsaSha1, &public(&key), b"signed info", &signature[1..])
                .unwrap()
        );
    }

    #[test]
    fn test_key_family_mismatch() {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let result = DefaultSignatureEngine.sign(SignatureAlgorithm::DsaSha1, &key, b"data");
        assert!(matches!(result, Err(SignError::UnsupportedKeyType(_))));
    }

    #[test]
    fn test_digest() {
        let digest = DefaultSignatureEngine
            .digest(DigestAlgorithm::Sha256, b"abc")
            .unwrap();
        assert_eq!(digest.len(), 32);
    }
}
