use std::fs;
use std::path::{Path, PathBuf};

use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509Ref};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{ConfigError, IdentityRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreKind {
    /// A PKCS#12 container holding key and certificate chain
    #[default]
    Pkcs12,
    /// A PEM certificate chain (leaf first) next to a PEM private key
    Pem,
}

/// One `<label>-signature` / `<label>-encryption` property set.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProperties {
    pub keystore: KeystoreProperties,
    #[serde(default)]
    pub truststore: Option<TruststoreProperties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreProperties {
    #[serde(rename = "type", default)]
    pub kind: KeystoreKind,
    pub file: PathBuf,
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub private_password: Option<SecretString>,
    /// Legacy name of `private_password`
    #[serde(default)]
    pub private_key_password: Option<SecretString>,
}

impl KeystoreProperties {
    /// The private key password under its current name, else its legacy name.
    pub fn private_password(&self) -> Option<&SecretString> {
        self.private_password
            .as_ref()
            .or(self.private_key_password.as_ref())
    }
}

/// PEM bundle of additional trusted certificates
#[derive(Debug, Clone, Deserialize)]
pub struct TruststoreProperties {
    pub file: PathBuf,
}

impl IdentityProperties {
    /// Read the property set `name` from `directory`, in any format the `config` crate
    /// recognises by extension.
    pub fn read(directory: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = directory.join(name);
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path.to_string_lossy()))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// A private key and its certificate chain as found in a keystore.
pub struct KeystoreEntry {
    pub alias: String,
    pub private_key: PKey<Private>,
    pub chain: Vec<X509>,
}

/// Resolve `path` against the keystore directory unless it is absolute.
pub(crate) fn resolve_path(directory: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::KeystoreUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path) -> impl FnOnce(openssl::error::ErrorStack) -> ConfigError + '_ {
    move |source| ConfigError::KeystoreInvalid {
        path: path.to_path_buf(),
        source,
    }
}

/// Open the keystore described by `props` and list its key entries.
pub fn open_keystore(
    props: &KeystoreProperties,
    directory: &Path,
    store_password: Option<&SecretString>,
    private_password: Option<&SecretString>,
    role: IdentityRole,
) -> Result<Vec<KeystoreEntry>, ConfigError> {
    let path = resolve_path(directory, &props.file);
    debug!(%role, path = %path.display(), kind = ?props.kind, "opening keystore");

    match props.kind {
        KeystoreKind::Pkcs12 => {
            // openssl uses one password for the MAC and the key bags
            let password = store_password
                .or(private_password)
                .map_or("", |p| p.expose_secret());
            let der = read_file(&path)?;
            let parsed = Pkcs12::from_der(&der)
                .and_then(|pkcs12| pkcs12.parse2(password))
                .map_err(invalid(&path))?;

            let (Some(private_key), Some(cert)) = (parsed.pkey, parsed.cert) else {
                return Ok(Vec::new());
            };
            let alias = cert
                .alias()
                .map(|alias| String::from_utf8_lossy(alias).into_owned())
                .or_else(|| common_name(&cert))
                .unwrap_or_default();

            let mut chain = vec![cert];
            if let Some(ca) = parsed.ca {
                chain.extend(ca);
            }
            Ok(vec![KeystoreEntry {
                alias,
                private_key,
                chain,
            }])
        }
        KeystoreKind::Pem => {
            let key_file = props
                .private_key_file
                .as_ref()
                .ok_or(ConfigError::MissingPrivateKeyFile { role })?;
            let key_path = resolve_path(directory, key_file);

            let chain = X509::stack_from_pem(&read_file(&path)?).map_err(invalid(&path))?;
            let key_pem = read_file(&key_path)?;
            let private_key = match private_password {
                Some(password) => PKey::private_key_from_pem_passphrase(
                    &key_pem,
                    password.expose_secret().as_bytes(),
                ),
                None => PKey::private_key_from_pem(&key_pem),
            }
            .map_err(invalid(&key_path))?;

            let Some(leaf) = chain.first() else {
                return Ok(Vec::new());
            };
            let alias = common_name(leaf).unwrap_or_default();
            Ok(vec![KeystoreEntry {
                alias,
                private_key,
                chain,
            }])
        }
    }
}

/// Pick the entry named `alias`, or the sole entry when no alias is configured.
pub fn select_entry(
    entries: Vec<KeystoreEntry>,
    alias: Option<&str>,
    role: IdentityRole,
    path: &Path,
) -> Result<KeystoreEntry, ConfigError> {
    match alias {
        Some(alias) => {
            let available: Vec<String> = entries.iter().map(|e| e.alias.clone()).collect();
            entries
                .into_iter()
                .find(|entry| entry.alias.eq_ignore_ascii_case(alias))
                .ok_or_else(|| ConfigError::AliasNotFound {
                    alias: alias.to_string(),
                    role,
                    available,
                })
        }
        None => {
            let mut entries = entries.into_iter();
            match (entries.next(), entries.next()) {
                (Some(entry), None) => Ok(entry),
                _ => Err(ConfigError::NoIdentity {
                    path: path.to_path_buf(),
                    role,
                }),
            }
        }
    }
}

fn common_name(cert: &X509Ref) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|name| name.to_string())
}
