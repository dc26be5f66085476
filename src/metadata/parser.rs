use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use tracing::{debug, trace};

use super::duration::parse_xs_duration;
use super::entity::{
    Endpoint, EndpointKind, EntityRecord, KeyDescriptor, KeyUse, RoleDescriptor, RoleKind,
};
use super::{MetadataError, MetadataResult};
use crate::crypto::strip_whitespace;
use crate::xmldsig::ns;

const ROLE_DESCRIPTORS: [&str; 6] = [
    "IDPSSODescriptor",
    "SPSSODescriptor",
    "AttributeAuthorityDescriptor",
    "AuthnAuthorityDescriptor",
    "PDPDescriptor",
    "RoleDescriptor",
];

/// Parse a metadata document into one record per `EntityDescriptor`, nested
/// `EntitiesDescriptor` containers included.
///
/// Descriptors carrying neither `validUntil` nor `cacheDuration` get
/// `default_cache_duration`.
pub fn parse_document(
    xml: &str,
    default_cache_duration: Duration,
    indexed_at: DateTime<Utc>,
) -> MetadataResult<Vec<EntityRecord>> {
    let mut parser = Parser {
        xml,
        default_cache_duration,
        indexed_at,
        depth: 0,
        root_seen: false,
        entity: None,
        role: None,
        key: None,
        certificate: None,
        records: Vec::new(),
    };
    parser.run()?;
    Ok(parser.records)
}

/// Parse an `xs:dateTime`; values without a zone are taken as UTC.
pub fn parse_timestamp(value: &str) -> MetadataResult<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|timestamp| timestamp.and_utc())
        })
        .map_err(|source| MetadataError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

struct Element {
    namespace: Option<String>,
    local_name: String,
    attributes: Vec<(String, String)>,
}

impl Element {
    fn read(reader: &NsReader<&[u8]>, e: &BytesStart) -> MetadataResult<Self> {
        let (resolved, local_name) = reader.resolve_element(e.name());
        let namespace = match resolved {
            ResolveResult::Bound(Namespace(ns)) => Some(std::str::from_utf8(ns)?.to_string()),
            _ => None,
        };

        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(MetadataError::xml)?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value().map_err(MetadataError::xml)?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            namespace,
            local_name: std::str::from_utf8(local_name.as_ref())?.to_string(),
            attributes,
        })
    }

    fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name == local_name
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn bool_attr(&self, name: &str) -> Option<bool> {
        self.attr(name).map(|value| matches!(value.trim(), "true" | "1"))
    }
}

/// An element still being read, with the depth it was opened at.
struct Open<T> {
    depth: usize,
    start: usize,
    value: T,
}

struct PendingEntity {
    entity_id: String,
    valid_until: Option<DateTime<Utc>>,
    cache_duration: Option<Duration>,
    roles: Vec<RoleDescriptor>,
}

struct Parser<'a> {
    xml: &'a str,
    default_cache_duration: Duration,
    indexed_at: DateTime<Utc>,
    depth: usize,
    root_seen: bool,
    entity: Option<Open<PendingEntity>>,
    role: Option<Open<RoleDescriptor>>,
    key: Option<Open<KeyDescriptor>>,
    certificate: Option<Open<String>>,
    records: Vec<EntityRecord>,
}

impl Parser<'_> {
    fn run(&mut self) -> MetadataResult<()> {
        let mut reader = NsReader::from_str(self.xml);
        reader.config_mut().trim_text(true);

        loop {
            let start = reader.buffer_position() as usize;
            match reader.read_event().map_err(MetadataError::xml)? {
                Event::Start(e) => {
                    let element = Element::read(&reader, &e)?;
                    self.open(element, start)?;
                }
                Event::Empty(e) => {
                    let element = Element::read(&reader, &e)?;
                    self.open(element, start)?;
                    self.close(reader.buffer_position() as usize)?;
                }
                Event::End(_) => self.close(reader.buffer_position() as usize)?,
                Event::Text(text) => {
                    if let Some(certificate) = self.certificate.as_mut() {
                        certificate
                            .value
                            .push_str(&text.decode().map_err(MetadataError::xml)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !self.root_seen {
            return Err(MetadataError::NotMetadata(String::new()));
        }
        Ok(())
    }

    fn open(&mut self, element: Element, start: usize) -> MetadataResult<()> {
        self.depth += 1;
        let depth = self.depth;

        if !self.root_seen {
            self.root_seen = true;
            let is_metadata = element.is(ns::SAML_METADATA, "EntityDescriptor")
                || element.is(ns::SAML_METADATA, "EntitiesDescriptor");
            if !is_metadata {
                return Err(MetadataError::NotMetadata(element.local_name));
            }
        }

        if element.is(ns::DS, "X509Certificate") && self.key.is_some() {
            self.certificate = Some(Open {
                depth,
                start,
                value: String::new(),
            });
            return Ok(());
        }
        if element.namespace.as_deref() != Some(ns::SAML_METADATA) {
            return Ok(());
        }

        let in_entity = self.entity.as_ref().is_some_and(|e| e.depth + 1 == depth);
        let in_role = self.role.as_ref().is_some_and(|r| r.depth + 1 == depth);
        let name = element.local_name.as_str();

        if name == "EntityDescriptor" && self.entity.is_none() {
            let value = self.pending_entity(&element)?;
            self.entity = Some(Open {
                depth,
                start,
                value,
            });
        } else if in_entity && ROLE_DESCRIPTORS.contains(&name) {
            let mut role = RoleDescriptor::new(RoleKind::from_local_name(name));
            role.protocol_support = element
                .attr("protocolSupportEnumeration")
                .map(|value| value.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            role.want_authn_requests_signed = element.bool_attr("WantAuthnRequestsSigned");
            role.authn_requests_signed = element.bool_attr("AuthnRequestsSigned");
            role.want_assertions_signed = element.bool_attr("WantAssertionsSigned");
            self.role = Some(Open {
                depth,
                start,
                value: role,
            });
        } else if in_role && name == "KeyDescriptor" {
            self.key = Some(Open {
                depth,
                start,
                value: KeyDescriptor {
                    key_use: KeyUse::from_attribute(element.attr("use")),
                    certificates: Vec::new(),
                },
            });
        } else if let Some(kind) = EndpointKind::from_local_name(name).filter(|_| in_role) {
            let endpoint = Endpoint {
                kind,
                binding: element.attr("Binding").unwrap_or_default().to_string(),
                location: element.attr("Location").unwrap_or_default().to_string(),
                response_location: element.attr("ResponseLocation").map(str::to_string),
                index: element.attr("index").and_then(|value| value.parse().ok()),
                is_default: element.bool_attr("isDefault"),
            };
            if let Some(role) = self.role.as_mut() {
                role.value.endpoints.push(endpoint);
            }
        }
        Ok(())
    }

    fn close(&mut self, end: usize) -> MetadataResult<()> {
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        if let Some(certificate) = take_if_at(&mut self.certificate, depth) {
            if let Some(key) = self.key.as_mut() {
                key.value
                    .certificates
                    .push(strip_whitespace(&certificate.value));
            }
        } else if let Some(key) = take_if_at(&mut self.key, depth) {
            if let Some(role) = self.role.as_mut() {
                role.value.keys.push(key.value);
            }
        } else if let Some(role) = take_if_at(&mut self.role, depth) {
            if let Some(entity) = self.entity.as_mut() {
                entity.value.roles.push(role.value);
            }
        } else if let Some(entity) = take_if_at(&mut self.entity, depth) {
            self.finish_entity(entity, end);
        }
        Ok(())
    }

    fn pending_entity(&self, element: &Element) -> MetadataResult<PendingEntity> {
        let entity_id = element
            .attr("entityID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(MetadataError::MissingEntityId)?
            .to_string();

        Ok(PendingEntity {
            entity_id,
            valid_until: element.attr("validUntil").map(parse_timestamp).transpose()?,
            cache_duration: element
                .attr("cacheDuration")
                .map(parse_xs_duration)
                .transpose()?,
            roles: Vec::new(),
        })
    }

    fn finish_entity(&mut self, entity: Open<PendingEntity>, end: usize) {
        let PendingEntity {
            entity_id,
            valid_until,
            mut cache_duration,
            roles,
        } = entity.value;

        let defaulted = valid_until.is_none() && cache_duration.is_none();
        if defaulted {
            trace!(
                %entity_id,
                default = %humantime::format_duration(self.default_cache_duration),
                "descriptor has neither cacheDuration nor validUntil, using the default cache duration"
            );
            cache_duration = Some(self.default_cache_duration);
        }
        debug!(%entity_id, roles = roles.len(), "parsed entity descriptor");

        self.records.push(EntityRecord {
            entity_id,
            xml: self.xml[entity.start..end].trim().to_string(),
            valid_until,
            cache_duration,
            cache_duration_defaulted: defaulted,
            roles,
            indexed_at: self.indexed_at,
        });
    }
}

/// Take the open element if it was opened at `depth`.
fn take_if_at<T>(slot: &mut Option<Open<T>>, depth: usize) -> Option<Open<T>> {
    if slot.as_ref().is_some_and(|open| open.depth == depth) {
        slot.take()
    } else {
        None
    }
}
