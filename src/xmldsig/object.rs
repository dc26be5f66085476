use std::fmt;

use super::utils::{ElementNode, Span, scan_elements};
use super::{Result, XmlError, ns};

/// The SAML message types that carry enveloped signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlObjectKind {
    AuthnRequest,
    Response,
    Assertion,
    LogoutRequest,
    LogoutResponse,
    ArtifactResolve,
    ArtifactResponse,
    Other,
}

impl fmt::Display for SamlObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A SAML protocol message or assertion held as its serialized XML.
///
/// The element layout (spans, IDs, namespaces) is derived from the text at construction
/// and rebuilt on every mutation, so it never goes stale.
#[derive(Debug, Clone)]
pub struct SamlObject {
    xml: String,
    nodes: Vec<ElementNode>,
}

impl SamlObject {
    pub fn parse(xml: impl Into<String>) -> Result<Self> {
        let xml = xml.into();
        let nodes = scan_elements(&xml)?;
        Ok(Self { xml, nodes })
    }

    pub fn as_xml(&self) -> &str {
        &self.xml
    }

    pub fn into_xml(self) -> String {
        self.xml
    }

    /// The document element; `scan_elements` never yields an empty layout.
    pub fn root(&self) -> &ElementNode {
        &self.nodes[0]
    }

    pub fn kind(&self) -> SamlObjectKind {
        let root = self.root();
        match (root.namespace.as_deref(), root.local_name.as_str()) {
            (Some(ns::SAML_PROTOCOL), "AuthnRequest") => SamlObjectKind::AuthnRequest,
            (Some(ns::SAML_PROTOCOL), "Response") => SamlObjectKind::Response,
            (Some(ns::SAML_PROTOCOL), "LogoutRequest") => SamlObjectKind::LogoutRequest,
            (Some(ns::SAML_PROTOCOL), "LogoutResponse") => SamlObjectKind::LogoutResponse,
            (Some(ns::SAML_PROTOCOL), "ArtifactResolve") => SamlObjectKind::ArtifactResolve,
            (Some(ns::SAML_PROTOCOL), "ArtifactResponse") => SamlObjectKind::ArtifactResponse,
            (Some(ns::SAML_ASSERTION), "Assertion") => SamlObjectKind::Assertion,
            _ => SamlObjectKind::Other,
        }
    }

    /// `ID` of the document element
    pub fn id(&self) -> Option<&str> {
        self.root().id.as_deref()
    }

    pub fn element(&self, index: usize) -> Option<&ElementNode> {
        self.nodes.get(index)
    }

    /// Indices of every element whose `ID` equals `id`.
    pub fn find_by_id(&self, id: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.id.as_deref() == Some(id))
            .map(|(index, _)| index)
            .collect()
    }

    /// Index of the only element carrying `id`.
    pub fn element_by_id(&self, id: &str) -> Result<usize> {
        match self.find_by_id(id).as_slice() {
            [index] => Ok(*index),
            [] => Err(XmlError::NotFound(format!("element with ID '{id}'"))),
            _ => Err(XmlError::Malformed(format!("duplicate ID '{id}'"))),
        }
    }

    pub fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.parent == Some(parent))
            .map(|(index, _)| index)
    }

    fn child(&self, parent: usize, namespace: &str, local_name: &str) -> Option<usize> {
        self.children(parent)
            .find(|&index| self.nodes[index].is(namespace, local_name))
    }

    /// The enveloped `ds:Signature` directly under the element at `index`.
    pub fn signature_of(&self, index: usize) -> Option<usize> {
        self.child(index, ns::DS, "Signature")
    }

    pub fn is_signed(&self) -> bool {
        self.signature_of(0).is_some()
    }

    /// `saml:Assertion` children of the document element
    pub fn assertions(&self) -> Vec<usize> {
        self.children(0)
            .filter(|&index| self.nodes[index].is(ns::SAML_ASSERTION, "Assertion"))
            .collect()
    }

    /// IDs of the assertions directly under the document element that carry a signature.
    pub fn signed_assertion_ids(&self) -> Vec<String> {
        self.assertions()
            .into_iter()
            .filter(|&index| self.signature_of(index).is_some())
            .filter_map(|index| self.nodes[index].id.clone())
            .collect()
    }

    /// Byte offset where an enveloped signature of the element at `index` goes: right
    /// after its `Issuer` child, or first in its content.
    ///
    /// An empty-element tag is rewritten as a start and end tag pair first.
    pub(crate) fn signature_insertion_point(&mut self, index: usize) -> Result<usize> {
        let node = self
            .nodes
            .get(index)
            .ok_or_else(|| XmlError::NotFound(format!("element #{index}")))?;
        if let Some(issuer) = self.child(index, ns::SAML_ASSERTION, "Issuer") {
            return Ok(self.nodes[issuer].span.end);
        }
        if let Some(content_start) = node.content_start {
            return Ok(content_start);
        }

        let span = node.span;
        let start_tag = span
            .slice(&self.xml)
            .strip_suffix("/>")
            .ok_or_else(|| XmlError::Malformed(format!("<{}> is not closed", node.name)))?;
        let content_start = span.start + start_tag.len() + 1;
        let expanded = format!(
            "{}{start_tag}></{}>{}",
            &self.xml[..span.start],
            node.name,
            &self.xml[span.end..]
        );
        self.replace_xml(expanded)?;
        Ok(content_start)
    }

    pub(crate) fn span_of(&self, index: usize) -> Result<Span> {
        self.nodes
            .get(index)
            .map(|node| node.span)
            .ok_or_else(|| XmlError::NotFound(format!("element #{index}")))
    }

    /// Swap in new document text and rebuild the layout.
    pub(crate) fn replace_xml(&mut self, xml: String) -> Result<()> {
        self.nodes = scan_elements(&xml)?;
        self.xml = xml;
        Ok(())
    }
}

impl fmt::Display for SamlObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xml)
    }
}
