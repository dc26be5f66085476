//! The two cryptographic identities (signature and encryption) of a SAML participant,
//! loaded from keystore-backed property sets, and the trust store used to accept the
//! credentials of remote parties.

mod error;
mod identity;
pub mod keystore;
pub mod secret;
pub mod truststore;

pub use error::ConfigError;
pub use identity::CryptoIdentity;
pub use secret::{SecretDecryptor, resolve_secret, unwrap_encrypted};
pub use truststore::{CertificateEntry, TrustStore, TrustStoreError};

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use openssl::pkey::Id;
use tracing::{debug, info};

use crate::config::{KeystoreSettings, Settings};
use crate::crypto::certificate_fingerprint;
use crate::crypto::sym::SymmetricSecretCipher;
use identity::key_type_name;
use keystore::{IdentityProperties, open_keystore, resolve_path, select_entry};

/// The role a cryptographic identity plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityRole {
    Signature,
    Encryption,
}

impl IdentityRole {
    pub const ALL: [IdentityRole; 2] = [Self::Signature, Self::Encryption];

    /// Suffix of the role's property set name
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Encryption => "encryption",
        }
    }

    /// `<label>-signature` or `<label>-encryption`
    pub fn properties_name(self, label: &str) -> String {
        format!("{label}-{}", self.suffix())
    }

    const fn index(self) -> usize {
        match self {
            Self::Signature => 0,
            Self::Encryption => 1,
        }
    }
}

impl fmt::Display for IdentityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

static SHARED_STORES: OnceLock<Mutex<HashMap<String, Arc<CredentialStore>>>> = OnceLock::new();

/// Signature and encryption identities of one participant plus its trust store.
#[derive(Debug)]
pub struct CredentialStore {
    label: String,
    identities: [CryptoIdentity; 2],
    trust_store: TrustStore,
}

impl CredentialStore {
    /// Build a store from already loaded identities. The trust store is seeded with every
    /// certificate of both chains.
    pub fn from_identities(
        label: impl Into<String>,
        signing: CryptoIdentity,
        encryption: CryptoIdentity,
    ) -> Result<Self, ConfigError> {
        if signing.role() != IdentityRole::Signature {
            return Err(ConfigError::NoIdentity {
                path: PathBuf::new(),
                role: IdentityRole::Signature,
            });
        }
        if encryption.role() != IdentityRole::Encryption {
            return Err(ConfigError::NoIdentity {
                path: PathBuf::new(),
                role: IdentityRole::Encryption,
            });
        }
        ensure_signing_key(&signing)?;

        let trust_store = TrustStore::new();
        for identity in [&signing, &encryption] {
            let ders = identity
                .certificate_chain()
                .iter()
                .map(|cert| cert.to_der())
                .collect::<Result<Vec<_>, _>>()?;
            trust_store.add_certs(ders);
        }

        Ok(Self {
            label: label.into(),
            identities: [signing, encryption],
            trust_store,
        })
    }

    /// Load both identities of `label` from the property sets in the keystore directory.
    pub fn load(
        label: &str,
        settings: &KeystoreSettings,
        decryptor: Option<&dyn SecretDecryptor>,
    ) -> Result<Self, ConfigError> {
        let directory = settings.directory.as_path();
        info!(label, directory = %directory.display(), "loading credential store");

        let (signing, signing_bundle) =
            load_identity(directory, label, IdentityRole::Signature, decryptor)?;
        let (encryption, encryption_bundle) =
            load_identity(directory, label, IdentityRole::Encryption, decryptor)?;

        let store = Self::from_identities(label, signing, encryption)?;
        for bundle in [signing_bundle, encryption_bundle].into_iter().flatten() {
            let pem = fs::read(&bundle).map_err(|source| ConfigError::KeystoreUnreadable {
                path: bundle.clone(),
                source,
            })?;
            let added = store.trust_store.add_pem_bundle(&pem)?;
            debug!(path = %bundle.display(), added, "loaded trust bundle");
        }

        let fingerprint =
            certificate_fingerprint(store.signing_identity().certificate()).unwrap_or_default();
        info!(
            label,
            signing_alias = store.signing_identity().alias(),
            signing_fingerprint = %fingerprint,
            encryption_alias = store.encryption_identity().alias(),
            trusted = store.trust_store.len(),
            "credential store ready"
        );
        Ok(store)
    }

    /// [`CredentialStore::load`] with the secret cipher named by the `secrets` settings.
    pub fn from_settings(label: &str, settings: &Settings) -> Result<Self, ConfigError> {
        let cipher = settings
            .secrets
            .as_ref()
            .map(|secrets| SymmetricSecretCipher::from_key_file(&secrets.key_file))
            .transpose()?;
        let decryptor = cipher.as_ref().map(|c| c as &dyn SecretDecryptor);
        Self::load(label, &settings.keystore, decryptor)
    }

    /// Process-wide store for `label`, loaded on first use.
    ///
    /// Bootstrap is serialised so concurrent first callers never open a keystore twice.
    pub fn shared(
        label: &str,
        settings: &KeystoreSettings,
        decryptor: Option<&dyn SecretDecryptor>,
    ) -> Result<Arc<Self>, ConfigError> {
        let registry = SHARED_STORES.get_or_init(Default::default);
        let mut stores = registry.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(store) = stores.get(label) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Self::load(label, settings, decryptor)?);
        stores.insert(label.to_string(), Arc::clone(&store));
        Ok(store)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn identity(&self, role: IdentityRole) -> &CryptoIdentity {
        &self.identities[role.index()]
    }

    pub fn signing_identity(&self) -> &CryptoIdentity {
        self.identity(IdentityRole::Signature)
    }

    pub fn encryption_identity(&self) -> &CryptoIdentity {
        self.identity(IdentityRole::Encryption)
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }
}

/// Load one role's identity; also returns the role's trust bundle path, if any.
fn load_identity(
    directory: &Path,
    label: &str,
    role: IdentityRole,
    decryptor: Option<&dyn SecretDecryptor>,
) -> Result<(CryptoIdentity, Option<PathBuf>), ConfigError> {
    let properties = IdentityProperties::read(directory, &role.properties_name(label))?;
    let keystore = &properties.keystore;

    let unwrap = |value: &secrecy::SecretString| {
        resolve_secret(secrecy::ExposeSecret::expose_secret(value), decryptor)
    };
    let store_password = keystore.password.as_ref().map(unwrap);
    let private_password = keystore.private_password().map(unwrap);

    let entries = open_keystore(
        keystore,
        directory,
        store_password.as_ref(),
        private_password.as_ref(),
        role,
    )?;
    let entry = select_entry(
        entries,
        keystore.alias.as_deref(),
        role,
        &resolve_path(directory, &keystore.file),
    )?;
    debug!(%role, alias = %entry.alias, chain_len = entry.chain.len(), "resolved keystore entry");

    let mut identity = CryptoIdentity::new(role, entry.alias, entry.private_key, entry.chain)?;
    if let Some(password) = private_password.or(store_password) {
        identity = identity.with_password(password);
    }

    let bundle = properties
        .truststore
        .map(|truststore| resolve_path(directory, &truststore.file));
    Ok((identity, bundle))
}

/// Signing keys must be RSA or DSA, the two families the signature algorithms cover.
fn ensure_signing_key(identity: &CryptoIdentity) -> Result<(), ConfigError> {
    let id = identity.key_type();
    if id == Id::RSA || id == Id::DSA {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedKeyType {
            role: identity.role(),
            key_type: key_type_name(id),
        })
    }
}
