use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use super::entity::EntityRecord;
use super::parser::parse_document;
use super::{MetadataError, MetadataResult};
use crate::config::MetadataSettings;

/// Cache period of descriptors that publish neither `validUntil` nor `cacheDuration`.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Invoked once for every descriptor the cache indexes.
pub type UpdateCallback = Arc<dyn Fn(&Arc<EntityRecord>) + Send + Sync>;

/// Remote party metadata indexed by entityID.
///
/// Cloning is cheap; clones share the index.
#[derive(Clone)]
pub struct MetadataCache {
    entries: Arc<DashMap<String, Arc<EntityRecord>>>,
    default_cache_duration: Duration,
    on_update: Option<UpdateCallback>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DURATION)
    }
}

impl MetadataCache {
    pub fn new(default_cache_duration: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_cache_duration,
            on_update: None,
        }
    }

    pub fn from_settings(settings: &MetadataSettings) -> MetadataResult<Self> {
        Ok(Self::new(settings.cache_duration()?))
    }

    pub fn with_update_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<EntityRecord>) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    pub fn default_cache_duration(&self) -> Duration {
        self.default_cache_duration
    }

    /// Index every input; returns the number of descriptors indexed.
    pub fn parse<I, S>(&self, inputs: I) -> MetadataResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        inputs
            .into_iter()
            .try_fold(0, |total, input| -> MetadataResult<usize> {
                Ok(total + self.parse_one(input.as_ref())?)
            })
    }

    /// Index one input: inline XML, or the path of a metadata file (`file:` prefix optional).
    pub fn parse_one(&self, input: &str) -> MetadataResult<usize> {
        let trimmed = input.trim();
        if trimmed.starts_with('<') && trimmed.ends_with('>') {
            return self.parse_xml(trimmed);
        }

        let path = Path::new(trimmed.strip_prefix("file:").unwrap_or(trimmed));
        let xml = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "read metadata file");
        self.parse_xml(&xml)
    }

    /// Index the descriptors of one metadata document.
    ///
    /// The document is parsed completely before anything is indexed, so a malformed
    /// document leaves the cache untouched.
    pub fn parse_xml(&self, xml: &str) -> MetadataResult<usize> {
        let records = parse_document(xml.trim(), self.default_cache_duration, Utc::now())?;
        let count = records.len();

        for record in records {
            let record = Arc::new(record);
            let replaced = self
                .entries
                .insert(record.entity_id.clone(), Arc::clone(&record))
                .is_some();
            debug!(entity_id = %record.entity_id, replaced, "indexed entity descriptor");
            if let Some(callback) = &self.on_update {
                callback(&record);
            }
        }

        info!(count, total = self.entries.len(), "metadata indexed");
        Ok(count)
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityRecord>> {
        self.entries
            .get(entity_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.contains_key(entity_id)
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Point-in-time copy of the index
    pub fn snapshot(&self) -> HashMap<String, Arc<EntityRecord>> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityRecord>> {
        self.entries.remove(entity_id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("entries", &self.entries.len())
            .field("default_cache_duration", &self.default_cache_duration)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SP: &str = r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://sp.example.org"><SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></EntityDescriptor>"#;

    #[test]
    fn test_inline_and_file_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idp.xml");
        std::fs::write(
            &path,
            r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example.org"/>"#,
        )
        .unwrap();

        let cache = MetadataCache::default();
        let indexed = cache
            .parse([format!("  {SP}\n"), format!("file:{}", path.display())])
            .unwrap();

        assert_eq!(indexed, 2);
        assert!(cache.contains("https://sp.example.org"));
        assert!(cache.contains("https://idp.example.org"));
        assert_eq!(
            cache.get("https://idp.example.org").unwrap().cache_duration,
            Some(DEFAULT_CACHE_DURATION)
        );
    }

    #[test]
    fn test_missing_file() {
        let cache = MetadataCache::default();
        let result = cache.parse_one("file:/nonexistent/metadata.xml");
        assert!(matches!(result, Err(MetadataError::Io { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_callback_per_descriptor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = MetadataCache::new(Duration::from_secs(60))
            .with_update_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        cache.parse_one(SP).unwrap();
        cache.parse_one(SP).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = MetadataSettings {
            cache_duration: "12h".to_string(),
        };
        let cache = MetadataCache::from_settings(&settings).unwrap();
        assert_eq!(cache.default_cache_duration(), Duration::from_secs(12 * 3_600));

        let settings = MetadataSettings {
            cache_duration: "soon".to_string(),
        };
        assert!(matches!(
            MetadataCache::from_settings(&settings),
            Err(MetadataError::DefaultCacheDuration(_))
        ));
    }
}
