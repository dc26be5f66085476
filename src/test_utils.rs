//! Certificate and identity generators for unit tests.

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::dsa::Dsa;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder};

use crate::credentials::{CredentialStore, CryptoIdentity, IdentityRole};

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn dsa_key() -> PKey<Private> {
    PKey::from_dsa(Dsa::generate(1024).unwrap()).unwrap()
}

fn x509_name(common_name: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "CM").unwrap();
    name.append_entry_by_text("O", "SAML Test").unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    name.build()
}

fn serial_number() -> Asn1Integer {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    serial.to_asn1_integer().unwrap()
}

/// Self-signed end entity certificate for `key`.
pub fn self_signed(key: &PKey<Private>, common_name: &str) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial_number()).unwrap();

    let name = x509_name(common_name);
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .digital_signature()
                .key_encipherment()
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

pub fn identity(role: IdentityRole, key: PKey<Private>) -> CryptoIdentity {
    let cert = self_signed(&key, "samlhost");
    CryptoIdentity::new(role, "samlhost", key, vec![cert]).unwrap()
}

/// Store whose signing identity uses `signing_key`.
pub fn credential_store(signing_key: PKey<Private>) -> CredentialStore {
    CredentialStore::from_identities(
        "test",
        identity(IdentityRole::Signature, signing_key),
        identity(IdentityRole::Encryption, rsa_key()),
    )
    .unwrap()
}
