use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::MetadataResult;
use super::cache::MetadataCache;
use super::entity::{Endpoint, EndpointKind, EntityRecord, RoleDescriptor};
use crate::binding::Binding;

/// What the local party needs to talk to one remote entity, narrowed to the bindings it
/// supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInformation {
    pub entity_id: String,
    pub signing_certificate: Option<String>,
    pub encryption_certificate: Option<String>,
    pub single_sign_on_services: Vec<Endpoint>,
    pub assertion_consumer_services: Vec<Endpoint>,
    pub single_logout_services: Vec<Endpoint>,
}

impl EntityInformation {
    /// Build the view of `record`, or `None` when it has no SSO role descriptor.
    pub fn from_record(record: &EntityRecord, bindings: &HashSet<Binding>) -> Option<Self> {
        let roles: Vec<&RoleDescriptor> = [record.sp_sso_descriptor(), record.idp_sso_descriptor()]
            .into_iter()
            .flatten()
            .collect();
        if roles.is_empty() {
            debug!(entity_id = %record.entity_id, "no SSO role descriptor, skipping");
            return None;
        }

        let supported = |kind: EndpointKind| -> Vec<Endpoint> {
            roles
                .iter()
                .flat_map(|role| role.endpoints(kind))
                .filter(|endpoint| endpoint.binding().is_some_and(|b| bindings.contains(&b)))
                .cloned()
                .collect()
        };

        Some(Self {
            entity_id: record.entity_id.clone(),
            signing_certificate: record.signing_certificate().map(str::to_string),
            encryption_certificate: record.encryption_certificate().map(str::to_string),
            single_sign_on_services: supported(EndpointKind::SingleSignOn),
            assertion_consumer_services: supported(EndpointKind::AssertionConsumer),
            single_logout_services: supported(EndpointKind::SingleLogout),
        })
    }

    /// The assertion consumer service to answer on: the one flagged `isDefault`, else the
    /// lowest `index`, else the first listed; restricted to `binding` when given.
    pub fn assertion_consumer_service(&self, binding: Option<Binding>) -> Option<&Endpoint> {
        let candidates: Vec<&Endpoint> = self
            .assertion_consumer_services
            .iter()
            .filter(|endpoint| binding.is_none() || endpoint.binding() == binding)
            .collect();

        candidates
            .iter()
            .find(|endpoint| endpoint.is_default == Some(true))
            .or_else(|| {
                candidates
                    .iter()
                    .filter(|endpoint| endpoint.index.is_some())
                    .min_by_key(|endpoint| endpoint.index)
            })
            .or_else(|| candidates.first())
            .copied()
    }

    pub fn single_sign_on_service(&self, binding: Binding) -> Option<&Endpoint> {
        self.single_sign_on_services
            .iter()
            .find(|endpoint| endpoint.binding() == Some(binding))
    }

    pub fn single_logout_service(&self, binding: Binding) -> Option<&Endpoint> {
        self.single_logout_services
            .iter()
            .find(|endpoint| endpoint.binding() == Some(binding))
    }
}

/// Parse service provider metadata into binding-filtered views keyed by entityID.
///
/// Entities without an SSO role descriptor are left out.
pub fn parse_sp_metadata<I, S>(
    inputs: I,
    bindings: &HashSet<Binding>,
    default_cache_duration: Duration,
) -> MetadataResult<HashMap<String, EntityInformation>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let collected: Arc<DashMap<String, EntityInformation>> = Arc::new(DashMap::new());
    let sink = Arc::clone(&collected);
    let bindings_owned = bindings.clone();

    let cache = MetadataCache::new(default_cache_duration).with_update_callback(move |record| {
        if let Some(information) = EntityInformation::from_record(record, &bindings_owned) {
            sink.insert(record.entity_id.clone(), information);
        }
    });
    cache.parse(inputs)?;

    Ok(collected
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP: &str = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="https://sp.example.org">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="encryption"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>RU5D</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>U0lH</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:SOAP" Location="https://sp.example.org/slo/soap"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.example.org/acs/post" index="2"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://sp.example.org/acs/redirect" index="1"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:PAOS" Location="https://sp.example.org/acs/paos" index="0" isDefault="true"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#;

    const AUTHORITY_ONLY: &str = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://aa.example.org"><md:AttributeAuthorityDescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></md:EntityDescriptor>"#;

    fn web_bindings() -> HashSet<Binding> {
        HashSet::from([Binding::HttpPost, Binding::HttpRedirect])
    }

    #[test]
    fn test_endpoints_filtered_by_binding() {
        let map = parse_sp_metadata([SP], &web_bindings(), Duration::from_secs(60)).unwrap();
        let info = &map["https://sp.example.org"];

        assert_eq!(info.assertion_consumer_services.len(), 2);
        assert!(info.single_logout_services.is_empty());
        assert_eq!(info.signing_certificate.as_deref(), Some("U0lH"));
        assert_eq!(info.encryption_certificate.as_deref(), Some("RU5D"));

        // The PAOS default is filtered out, so the lowest index wins
        let acs = info.assertion_consumer_service(None).unwrap();
        assert_eq!(acs.location, "https://sp.example.org/acs/redirect");
        let acs = info
            .assertion_consumer_service(Some(Binding::HttpPost))
            .unwrap();
        assert_eq!(acs.location, "https://sp.example.org/acs/post");
    }

    #[test]
    fn test_default_endpoint_preferred() {
        let all: HashSet<Binding> = Binding::ALL.into_iter().collect();
        let map = parse_sp_metadata([SP], &all, Duration::from_secs(60)).unwrap();
        let info = &map["https://sp.example.org"];

        let acs = info.assertion_consumer_service(None).unwrap();
        assert_eq!(acs.location, "https://sp.example.org/acs/paos");
        assert!(info.single_logout_service(Binding::Soap).is_some());
    }

    #[test]
    fn test_entities_without_sso_role_skipped() {
        let map = parse_sp_metadata([SP, AUTHORITY_ONLY], &web_bindings(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key("https://aa.example.org"));
    }
}
