use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::x509::X509;
use tracing::debug;

use super::{Result, SignError, SignatureAlgorithm, SignatureEngine, SignatureService, profile};
use super::trust::TrustedCredentialSource;
use crate::crypto::{DigestAlgorithm, strip_whitespace};
use crate::xmldsig::{
    AlgorithmElement, CanonicalizationAlgorithm, InclusiveNamespaces, KeyInfo, Reference,
    SamlObject, SamlObjectKind, Signature, SignatureValue, SignedInfo, Span, Transform,
    Transforms, X509Data, XmlError, algorithms, insert_at, ns, remove_span,
};

/// Algorithm choices for an enveloped signature.
#[derive(Debug, Clone, Default)]
pub struct XmlSignatureOptions {
    pub canonicalization: CanonicalizationAlgorithm,
    pub digest: DigestAlgorithm,
    /// `InclusiveNamespaces` PrefixList, only emitted for exclusive canonicalization
    pub inclusive_prefixes: Vec<String>,
}

impl SignatureService {
    /// Sign `object` in place with exclusive canonicalization and SHA-1.
    pub fn sign_saml_object(&self, object: &mut SamlObject) -> Result<()> {
        self.sign_saml_object_with(object, &XmlSignatureOptions::default())
    }

    /// Sign `object` in place.
    ///
    /// Assertions of a Response that already carry a signature are re-signed with the same
    /// credential first, so the Response digest covers their final form.
    pub fn sign_saml_object_with(
        &self,
        object: &mut SamlObject,
        options: &XmlSignatureOptions,
    ) -> Result<()> {
        let identity = self.credentials.signing_identity();
        let algorithm = SignatureAlgorithm::for_identity(identity)?;
        let certificate = identity.certificate_base64()?;
        debug!(kind = %object.kind(), %algorithm, "signing SAML object");

        if object.kind() == SamlObjectKind::Response {
            for id in object.signed_assertion_ids() {
                debug!(assertion = %id, "re-signing assertion");
                self.sign_element(object, &id, algorithm, &certificate, options)?;
            }
        }

        let id = object.id().map(str::to_string).ok_or_else(|| {
            SignError::ProfileViolation(format!("<{}> has no ID attribute", object.root().name))
        })?;
        self.sign_element(object, &id, algorithm, &certificate, options)
    }

    fn sign_element(
        &self,
        object: &mut SamlObject,
        id: &str,
        algorithm: SignatureAlgorithm,
        certificate: &str,
        options: &XmlSignatureOptions,
    ) -> Result<()> {
        let index = object.element_by_id(id)?;
        if let Some(existing) = object.signature_of(index) {
            let xml = remove_span(object.as_xml(), object.span_of(existing)?);
            object.replace_xml(xml)?;
        }

        let index = object.element_by_id(id)?;
        let canonical = self.engine.canonicalize(
            object.as_xml(),
            Some(object.span_of(index)?),
            None,
            options.canonicalization,
            &options.inclusive_prefixes,
        )?;
        let digest = self.engine.digest(options.digest, canonical.as_bytes())?;

        let mut signature = Signature {
            xmlns: Some(ns::DS.to_string()),
            signed_info: signed_info(id, algorithm, &digest, options),
            signature_value: SignatureValue {
                value: String::new(),
            },
            key_info: Some(KeyInfo {
                x509_data: vec![X509Data {
                    certificates: vec![certificate.to_string()],
                }],
            }),
        };

        // SignedInfo is canonicalized in place, with the namespaces it inherits there
        let xml = quick_xml::se::to_string_with_root("Signature", &signature)?;
        let at = object.signature_insertion_point(index)?;
        object.replace_xml(insert_at(object.as_xml(), at, &xml))?;

        let (signature_span, signed_info_span) =
            signature_spans(object, object.element_by_id(id)?)?;
        let canonical = self.engine.canonicalize(
            object.as_xml(),
            Some(signed_info_span),
            None,
            options.canonicalization,
            &[],
        )?;
        let identity = self.credentials.signing_identity();
        let value = self
            .engine
            .sign(algorithm, identity.private_key(), canonical.as_bytes())?;
        signature.signature_value.value = BASE64.encode(value);

        let xml = quick_xml::se::to_string_with_root("Signature", &signature)?;
        let without = remove_span(object.as_xml(), signature_span);
        object.replace_xml(insert_at(&without, signature_span.start, &xml))?;
        debug!(%id, "element signed");
        Ok(())
    }

    /// Validate the enveloped signature of the document element of `object`.
    pub fn validate_xml_signature(
        &self,
        object: &SamlObject,
        trust: &dyn TrustedCredentialSource,
        engine: &dyn SignatureEngine,
    ) -> Result<()> {
        validate_element(object, 0, trust, engine)
    }

    /// Validate the enveloped signature of the element carrying `element_id`, such as an
    /// Assertion inside a Response.
    pub fn validate_xml_signature_at(
        &self,
        object: &SamlObject,
        element_id: &str,
        trust: &dyn TrustedCredentialSource,
        engine: &dyn SignatureEngine,
    ) -> Result<()> {
        let index = object.element_by_id(element_id)?;
        validate_element(object, index, trust, engine)
    }
}

fn signed_info(
    id: &str,
    algorithm: SignatureAlgorithm,
    digest: &[u8],
    options: &XmlSignatureOptions,
) -> SignedInfo {
    let c14n = options.canonicalization;
    let inclusive_namespaces = (c14n.is_exclusive() && !options.inclusive_prefixes.is_empty())
        .then(|| InclusiveNamespaces {
            xmlns: Some(ns::EXC_C14N.to_string()),
            prefix_list: options.inclusive_prefixes.join(" "),
        });

    SignedInfo {
        xmlns: None,
        canonicalization_method: AlgorithmElement::new(c14n.uri()),
        signature_method: AlgorithmElement::new(algorithm.uri()),
        references: vec![Reference {
            uri: Some(format!("#{id}")),
            transforms: Some(Transforms {
                transforms: vec![
                    Transform {
                        algorithm: algorithms::ENVELOPED_SIGNATURE.to_string(),
                        inclusive_namespaces: None,
                    },
                    Transform {
                        algorithm: c14n.uri().to_string(),
                        inclusive_namespaces,
                    },
                ],
            }),
            digest_method: AlgorithmElement::new(options.digest.uri()),
            digest_value: BASE64.encode(digest),
        }],
    }
}

/// Spans of the enveloped signature of the element at `index` and of its `SignedInfo`.
fn signature_spans(object: &SamlObject, index: usize) -> Result<(Span, Span)> {
    let signature = object
        .signature_of(index)
        .ok_or(SignError::SignatureNotProvided)?;
    let signed_info = object
        .children(signature)
        .find(|&child| {
            object
                .element(child)
                .is_some_and(|node| node.is(ns::DS, "SignedInfo"))
        })
        .ok_or_else(|| XmlError::NotFound("SignedInfo".to_string()))?;
    Ok((object.span_of(signature)?, object.span_of(signed_info)?))
}

fn decode_base64(value: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(strip_whitespace(value))?)
}

fn validate_element(
    object: &SamlObject,
    index: usize,
    trust: &dyn TrustedCredentialSource,
    engine: &dyn SignatureEngine,
) -> Result<()> {
    let node = object
        .element(index)
        .ok_or_else(|| XmlError::NotFound(format!("element #{index}")))?;
    let xml = object.as_xml();

    if object.signature_of(index).is_none() {
        debug!(element = %node.name, "no enveloped signature");
        return Err(SignError::SignatureNotProvided);
    }
    let (signature_span, signed_info_span) = signature_spans(object, index)?;
    let signature: Signature = quick_xml::de::from_str(signature_span.slice(xml))?;

    let chain = signature
        .key_info
        .as_ref()
        .map(|key_info| {
            key_info
                .certificates()
                .map(decode_base64)
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_else(Vec::new);
    let Some(leaf) = chain.first() else {
        return Err(SignError::MissingKeyInfo);
    };
    let leaf = X509::from_der(leaf).map_err(|e| SignError::InvalidCertificate(e.to_string()))?;

    if !trust.is_trusted(&chain)? {
        let subject = format!("{:?}", leaf.subject_name());
        debug!(%subject, "signing certificate is not trusted");
        return Err(SignError::UntrustedCredential(subject));
    }

    profile::validate(object, index, &signature)?;

    let reference = &signature.signed_info.references[0];
    let (c14n, prefixes) = reference_canonicalization(reference)?;
    let digest_algorithm = DigestAlgorithm::from_uri(&reference.digest_method.algorithm)
        .ok_or_else(|| SignError::InvalidUri(reference.digest_method.algorithm.clone()))?;
    let canonical = engine.canonicalize(
        xml,
        Some(object.span_of(index)?),
        Some(signature_span),
        c14n,
        &prefixes,
    )?;
    let digest = engine.digest(digest_algorithm, canonical.as_bytes())?;
    if digest != decode_base64(&reference.digest_value)? {
        let uri = reference.uri.clone().unwrap_or_default();
        debug!(%uri, "reference digest does not match");
        return Err(SignError::DigestMismatch(uri));
    }

    let method = &signature.signed_info.canonicalization_method.algorithm;
    let c14n = CanonicalizationAlgorithm::from_uri(method)
        .ok_or_else(|| SignError::InvalidUri(method.clone()))?;
    let algorithm = SignatureAlgorithm::from_uri(&signature.signed_info.signature_method.algorithm)?;
    let canonical = engine.canonicalize(xml, Some(signed_info_span), None, c14n, &[])?;
    let value = decode_base64(&signature.signature_value.value)?;

    let key = leaf.public_key()?;
    if !engine.verify(algorithm, &key, canonical.as_bytes(), &value)? {
        debug!(element = %node.name, "signature value does not verify");
        return Err(SignError::SignatureMismatch);
    }
    debug!(element = %node.name, %algorithm, "XML signature valid");
    Ok(())
}

/// Canonicalization named by the reference transforms; inclusive C14N when none is.
fn reference_canonicalization(
    reference: &Reference,
) -> Result<(CanonicalizationAlgorithm, Vec<String>)> {
    let Some(transform) = reference
        .transforms()
        .iter()
        .find(|transform| transform.algorithm != algorithms::ENVELOPED_SIGNATURE)
    else {
        return Ok((CanonicalizationAlgorithm::Inclusive, Vec::new()));
    };
    let algorithm = CanonicalizationAlgorithm::from_uri(&transform.algorithm)
        .ok_or_else(|| SignError::InvalidUri(transform.algorithm.clone()))?;
    let prefixes = transform
        .inclusive_namespaces
        .as_ref()
        .map(InclusiveNamespaces::prefixes)
        .unwrap_or_default();
    Ok((algorithm, prefixes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sign::{DefaultSignatureEngine, MockTrustedCredentialSource};
    use crate::test_utils::{credential_store, dsa_key, rsa_key};

    const AUTHN_REQUEST: &str = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_req1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"><saml:Issuer>https://sp.example.org</saml:Issuer><samlp:NameIDPolicy AllowCreate="true"/></samlp:AuthnRequest>"#;

    const RESPONSE: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp" Version="2.0"><saml:Issuer>https://idp.example.org</saml:Issuer><saml:Assertion ID="_a1" Version="2.0"><saml:Issuer>https://idp.example.org</saml:Issuer><Signature xmlns="http://www.w3.org/2000/09/xmldsig#"/><saml:Subject><saml:NameID>alice</saml:NameID></saml:Subject></saml:Assertion></samlp:Response>"#;

    fn service(key: openssl::pkey::PKey<openssl::pkey::Private>) -> SignatureService {
        SignatureService::new(Arc::new(credential_store(key)))
    }

    #[test]
    fn test_sign_and_validate_authn_request() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        assert!(object.is_signed());
        let xml = object.as_xml();
        assert!(xml.contains(
            r#"<SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#rsa-sha1""#
        ));
        assert!(xml.contains(r##"<Reference URI="#_req1">"##));
        let issuer_end = xml.find("</saml:Issuer>").unwrap();
        assert!(xml[issuer_end..].starts_with("</saml:Issuer><Signature"));

        service
            .validate_xml_signature(&object, service.credentials(), &DefaultSignatureEngine)
            .unwrap();
    }

    #[test]
    fn test_dsa_signed_object_validates() {
        let service = service(dsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        assert!(object.as_xml().contains("xmldsig#dsa-sha1"));
        service
            .validate_xml_signature(&object, service.credentials(), &DefaultSignatureEngine)
            .unwrap();
    }

    #[test]
    fn test_tampered_content_fails_digest() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        let tampered = object
            .as_xml()
            .replace("https://sp.example.org", "https://evil.example.org");
        let tampered = SamlObject::parse(tampered).unwrap();
        let result =
            service.validate_xml_signature(&tampered, service.credentials(), &DefaultSignatureEngine);
        assert!(matches!(result, Err(SignError::DigestMismatch(uri)) if uri == "#_req1"));
    }

    #[test]
    fn test_untrusted_credential() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        let mut trust = MockTrustedCredentialSource::new();
        trust
            .expect_is_trusted()
            .withf(|chain| chain.len() == 1)
            .times(1)
            .returning(|_| Ok(false));

        let result = service.validate_xml_signature(&object, &trust, &DefaultSignatureEngine);
        assert!(matches!(result, Err(SignError::UntrustedCredential(_))));
    }

    #[test]
    fn test_unsigned_object() {
        let service = service(rsa_key());
        let object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        let result =
            service.validate_xml_signature(&object, service.credentials(), &DefaultSignatureEngine);
        assert!(matches!(result, Err(SignError::SignatureNotProvided)));
    }

    #[test]
    fn test_missing_key_info() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        let start = object.as_xml().find("<KeyInfo>").unwrap();
        let end = object.as_xml().find("</KeyInfo>").unwrap() + "</KeyInfo>".len();
        let stripped = remove_span(object.as_xml(), Span { start, end });
        let stripped = SamlObject::parse(stripped).unwrap();

        let result =
            service.validate_xml_signature(&stripped, service.credentials(), &DefaultSignatureEngine);
        assert!(matches!(result, Err(SignError::MissingKeyInfo)));
    }

    #[test]
    fn test_response_resigns_signed_assertions() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(RESPONSE).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        assert_eq!(object.as_xml().matches("<Signature ").count(), 2);
        assert!(object.as_xml().contains(r##"<Reference URI="#_a1">"##));
        service
            .validate_xml_signature_at(&object, "_a1", service.credentials(), &DefaultSignatureEngine)
            .unwrap();
        service
            .validate_xml_signature(&object, service.credentials(), &DefaultSignatureEngine)
            .unwrap();
    }

    #[test]
    fn test_empty_root_element_signed() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r9" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"/>"#,
        )
        .unwrap();
        service.sign_saml_object(&mut object).unwrap();

        assert!(object.is_signed());
        assert!(object.as_xml().ends_with("</Signature></samlp:AuthnRequest>"));
        service
            .validate_xml_signature(&object, service.credentials(), &DefaultSignatureEngine)
            .unwrap();
    }

    #[test]
    fn test_attribute_line_breaks_digest_as_spaces() {
        let service = service(rsa_key());
        let request = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0" ProviderName="Example SP"><saml:Issuer>https://sp.example.org</saml:Issuer></samlp:AuthnRequest>"#;
        let mut object = SamlObject::parse(request).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        // A literal line break in an attribute value is normalized to a space
        let wrapped = object
            .as_xml()
            .replace(r#"ProviderName="Example SP""#, "ProviderName=\"Example\nSP\"");
        let wrapped = SamlObject::parse(wrapped).unwrap();
        service
            .validate_xml_signature(&wrapped, service.credentials(), &DefaultSignatureEngine)
            .unwrap();

        // A character reference is not
        let escaped = object
            .as_xml()
            .replace(r#"ProviderName="Example SP""#, r#"ProviderName="Example&#xA;SP""#);
        let escaped = SamlObject::parse(escaped).unwrap();
        let result =
            service.validate_xml_signature(&escaped, service.credentials(), &DefaultSignatureEngine);
        assert!(matches!(result, Err(SignError::DigestMismatch(uri)) if uri == "#_r1"));
    }

    #[test]
    fn test_second_document_element_rejected() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        service.sign_saml_object(&mut object).unwrap();

        let appended = format!(
            r#"{}<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_evil"/>"#,
            object.as_xml()
        );
        assert!(SamlObject::parse(appended).is_err());
    }

    #[test]
    fn test_inclusive_prefixes_emitted() {
        let service = service(rsa_key());
        let mut object = SamlObject::parse(AUTHN_REQUEST).unwrap();
        let options = XmlSignatureOptions {
            digest: DigestAlgorithm::Sha256,
            inclusive_prefixes: vec!["saml".to_string()],
            ..Default::default()
        };
        service.sign_saml_object_with(&mut object, &options).unwrap();

        assert!(object.as_xml().contains(r#"PrefixList="saml""#));
        assert!(object.as_xml().contains(DigestAlgorithm::Sha256.uri()));
        service
            .validate_xml_signature(&object, service.credentials(), &DefaultSignatureEngine)
            .unwrap();
    }
}
