use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::binding::Binding;

/// What a `KeyDescriptor` may be used for. A descriptor without `use` serves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyUse {
    Signing,
    Encryption,
    #[default]
    Unspecified,
}

impl KeyUse {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("signing") => KeyUse::Signing,
            Some("encryption") => KeyUse::Encryption,
            _ => KeyUse::Unspecified,
        }
    }

    fn covers(self, wanted: KeyUse) -> bool {
        self == wanted || self == KeyUse::Unspecified
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyDescriptor {
    pub key_use: KeyUse,
    /// Base64 DER certificates without whitespace
    pub certificates: Vec<String>,
}

/// The endpoint element kinds a role descriptor lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    SingleSignOn,
    AssertionConsumer,
    SingleLogout,
    ArtifactResolution,
}

impl EndpointKind {
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "SingleSignOnService" => Some(Self::SingleSignOn),
            "AssertionConsumerService" => Some(Self::AssertionConsumer),
            "SingleLogoutService" => Some(Self::SingleLogout),
            "ArtifactResolutionService" => Some(Self::ArtifactResolution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: EndpointKind,
    /// Binding URI as published
    pub binding: String,
    pub location: String,
    pub response_location: Option<String>,
    pub index: Option<u16>,
    pub is_default: Option<bool>,
}

impl Endpoint {
    pub fn binding(&self) -> Option<Binding> {
        Binding::from_uri(&self.binding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleKind {
    IdpSso,
    SpSso,
    /// Any other role descriptor, by local name
    Other(String),
}

impl RoleKind {
    pub fn from_local_name(name: &str) -> Self {
        match name {
            "IDPSSODescriptor" => RoleKind::IdpSso,
            "SPSSODescriptor" => RoleKind::SpSso,
            other => RoleKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDescriptor {
    pub kind: RoleKind,
    pub protocol_support: Vec<String>,
    pub want_authn_requests_signed: Option<bool>,
    pub authn_requests_signed: Option<bool>,
    pub want_assertions_signed: Option<bool>,
    pub keys: Vec<KeyDescriptor>,
    pub endpoints: Vec<Endpoint>,
}

impl RoleDescriptor {
    pub fn new(kind: RoleKind) -> Self {
        Self {
            kind,
            protocol_support: Vec::new(),
            want_authn_requests_signed: None,
            authn_requests_signed: None,
            want_assertions_signed: None,
            keys: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn endpoints(&self, kind: EndpointKind) -> impl Iterator<Item = &Endpoint> {
        self.endpoints
            .iter()
            .filter(move |endpoint| endpoint.kind == kind)
    }

    /// First certificate published for `key_use`.
    pub fn certificate(&self, key_use: KeyUse) -> Option<&str> {
        self.keys
            .iter()
            .filter(|key| key.key_use.covers(key_use))
            .flat_map(|key| key.certificates.iter())
            .map(String::as_str)
            .next()
    }
}

/// One indexed `EntityDescriptor`.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity_id: String,
    /// The descriptor element as it appeared in its document
    pub xml: String,
    pub valid_until: Option<DateTime<Utc>>,
    pub cache_duration: Option<Duration>,
    /// Whether `cache_duration` is the configured default rather than published
    pub cache_duration_defaulted: bool,
    pub roles: Vec<RoleDescriptor>,
    pub indexed_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn role(&self, kind: &RoleKind) -> Option<&RoleDescriptor> {
        self.roles.iter().find(|role| &role.kind == kind)
    }

    pub fn idp_sso_descriptor(&self) -> Option<&RoleDescriptor> {
        self.role(&RoleKind::IdpSso)
    }

    pub fn sp_sso_descriptor(&self) -> Option<&RoleDescriptor> {
        self.role(&RoleKind::SpSso)
    }

    pub fn signing_certificate(&self) -> Option<&str> {
        self.roles
            .iter()
            .find_map(|role| role.certificate(KeyUse::Signing))
    }

    pub fn encryption_certificate(&self) -> Option<&str> {
        self.roles
            .iter()
            .find_map(|role| role.certificate(KeyUse::Encryption))
    }

    /// The earlier of `validUntil` and the end of the cache period.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let cached_until = self
            .cache_duration
            .and_then(|duration| chrono::Duration::from_std(duration).ok())
            .and_then(|duration| self.indexed_at.checked_add_signed(duration));

        match (self.valid_until, cached_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires| now < expires)
    }
}
