#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::dsa::Dsa;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder, X509NameRef};
use saml_ctk::config::KeystoreSettings;
use tempfile::TempDir;

pub const ALIAS: &str = "samlhost";
pub const STORE_PASSWORD: &str = "changeit";

pub fn init() {
    saml_ctk::telemetry::init_tracing();
}

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn dsa_key() -> PKey<Private> {
    PKey::from_dsa(Dsa::generate(1024).unwrap()).unwrap()
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn x509_name(common_name: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "CM").unwrap();
    name.append_entry_by_text("O", "SAML Integration").unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    name.build()
}

fn serial_number() -> Asn1Integer {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    serial.to_asn1_integer().unwrap()
}

fn builder(subject: &X509NameRef, issuer: &X509NameRef, key: &PKey<Private>) -> X509Builder {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial_number()).unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder
}

/// Self-signed end entity certificate.
pub fn self_signed(key: &PKey<Private>, common_name: &str) -> X509 {
    let name = x509_name(common_name);
    let mut builder = builder(&name, &name, key);
    builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// Self-signed RSA CA.
pub fn generate_ca(common_name: &str) -> (X509, PKey<Private>) {
    let key = rsa_key();
    let name = x509_name(common_name);
    let mut builder = builder(&name, &name, &key);
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

/// End entity certificate for `key` issued by the CA.
pub fn issue(ca: &X509, ca_key: &PKey<Private>, key: &PKey<Private>, common_name: &str) -> X509 {
    let mut builder = builder(&x509_name(common_name), ca.subject_name(), key);
    builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    builder
        .append_extension(KeyUsage::new().digital_signature().build().unwrap())
        .unwrap();
    builder.sign(ca_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// A keystore directory for one participant label.
pub struct KeystoreDir {
    pub dir: TempDir,
}

impl KeystoreDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self) -> KeystoreSettings {
        KeystoreSettings {
            directory: self.dir.path().to_path_buf(),
        }
    }

    /// Write a PKCS#12 file holding `key` and `chain` (leaf first) under `friendly_name`.
    pub fn write_pkcs12(
        &self,
        file: &str,
        friendly_name: &str,
        key: &PKey<Private>,
        chain: &[X509],
        password: &str,
    ) -> PathBuf {
        let (leaf, rest) = chain.split_first().unwrap();
        let mut builder = Pkcs12::builder();
        builder.name(friendly_name).pkey(key).cert(leaf);
        if !rest.is_empty() {
            let mut ca = Stack::new().unwrap();
            for cert in rest {
                ca.push(cert.clone()).unwrap();
            }
            builder.ca(ca);
        }
        let pkcs12 = builder.build2(password).unwrap();

        let path = self.path().join(file);
        fs::write(&path, pkcs12.to_der().unwrap()).unwrap();
        path
    }

    /// Write a PEM chain and key; the key is encrypted when `key_password` is set.
    pub fn write_pem(
        &self,
        cert_file: &str,
        key_file: &str,
        key: &PKey<Private>,
        chain: &[X509],
        key_password: Option<&str>,
    ) {
        let mut pem = Vec::new();
        for cert in chain {
            pem.extend(cert.to_pem().unwrap());
        }
        fs::write(self.path().join(cert_file), pem).unwrap();

        let key_pem = match key_password {
            Some(password) => key
                .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
                .unwrap(),
            None => key.private_key_to_pem_pkcs8().unwrap(),
        };
        fs::write(self.path().join(key_file), key_pem).unwrap();
    }

    /// Write the property set `name` as TOML.
    pub fn write_properties(&self, name: &str, body: &str) {
        fs::write(self.path().join(format!("{name}.toml")), body).unwrap();
    }

    /// A complete PKCS#12 backed participant: signing identity on `signing_key`, RSA
    /// encryption identity, both self-signed.
    pub fn pkcs12_participant(&self, label: &str, signing_key: &PKey<Private>) {
        let encryption_key = rsa_key();
        let signing_cert = self_signed(signing_key, ALIAS);
        let encryption_cert = self_signed(&encryption_key, ALIAS);

        for (role, key, cert) in [
            ("signature", signing_key, signing_cert),
            ("encryption", &encryption_key, encryption_cert),
        ] {
            let file = format!("{label}-{role}.p12");
            self.write_pkcs12(&file, ALIAS, key, &[cert], STORE_PASSWORD);
            self.write_properties(
                &format!("{label}-{role}"),
                &format!(
                    "[keystore]\ntype = \"pkcs12\"\nfile = \"{file}\"\npassword = \"{STORE_PASSWORD}\"\nalias = \"{ALIAS}\"\n"
                ),
            );
        }
    }
}

/// Bare base64 DER, as carried in metadata and KeyInfo.
pub fn base64_certificate(cert: &X509) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(cert.to_der().unwrap())
}
