use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub keystore: KeystoreSettings,
    pub metadata: MetadataSettings,
    #[serde(default)]
    pub secrets: Option<SecretsSettings>,
}

/// Where the per-identity keystore property sets (`<label>-signature`,
/// `<label>-encryption`) and the keystores they reference live.
#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSettings {
    /// Cache duration injected into descriptors that carry neither `validUntil` nor
    /// `cacheDuration`, in humantime syntax (`7days`, `12h`, ...).
    pub cache_duration: String,
}

impl MetadataSettings {
    pub fn cache_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.cache_duration)
    }
}

/// Key material for unwrapping `ENC(...)` values in keystore property sets.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsSettings {
    pub key_file: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("keystore.directory", "config/keystores")?
            .set_default("metadata.cache_duration", "7days")?
            .add_source(File::with_name("config/settings").required(false));

        // An explicit map replaces the process environment so tests do not leak
        // variables into each other
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // e.g. SAMLCTK_METADATA__CACHE_DURATION or SAMLCTK_KEYSTORE__DIRECTORY
            builder = builder.add_source(
                Environment::with_prefix("SAMLCTK")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
