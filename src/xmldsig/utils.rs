use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};

use super::{Result, XmlError};

/// Byte range of an element inside the document text, `<` of the start tag up to and
/// including the `>` of the end tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn slice<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.start..self.end]
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// One element of a scanned document.
#[derive(Debug, Clone)]
pub struct ElementNode {
    /// Qualified name as written
    pub name: String,
    pub local_name: String,
    pub namespace: Option<String>,
    /// Value of the SAML `ID` attribute
    pub id: Option<String>,
    pub span: Span,
    /// Offset just past the start tag; `None` for an empty-element tag
    pub content_start: Option<usize>,
    pub parent: Option<usize>,
}

impl ElementNode {
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }
}

/// Scan every element of `xml` in document order.
///
/// The first node is the document element. Fails on malformed XML or an empty document.
pub fn scan_elements(xml: &str) -> Result<Vec<ElementNode>> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut nodes: Vec<ElementNode> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        let top_level = open.is_empty();
        match reader.read_event().map_err(XmlError::parse)? {
            Event::Start(e) => {
                if top_level && !nodes.is_empty() {
                    return Err(second_root());
                }
                let mut node = element_node(&reader, &e, start, open.last().copied())?;
                node.content_start = Some(reader.buffer_position() as usize);
                open.push(nodes.len());
                nodes.push(node);
            }
            Event::Empty(e) => {
                if top_level && !nodes.is_empty() {
                    return Err(second_root());
                }
                let mut node = element_node(&reader, &e, start, open.last().copied())?;
                node.span.end = reader.buffer_position() as usize;
                nodes.push(node);
            }
            Event::End(_) => {
                let index = open
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced end tag".to_string()))?;
                nodes[index].span.end = reader.buffer_position() as usize;
            }
            Event::Text(e) if top_level => {
                if !e.iter().all(u8::is_ascii_whitespace) {
                    return Err(XmlError::Malformed(
                        "character data outside the document element".to_string(),
                    ));
                }
            }
            Event::CData(_) | Event::GeneralRef(_) if top_level => {
                return Err(XmlError::Malformed(
                    "character data outside the document element".to_string(),
                ));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(XmlError::Malformed("unclosed element".to_string()));
    }
    if nodes.is_empty() {
        return Err(XmlError::NotFound("document element".to_string()));
    }
    Ok(nodes)
}

fn second_root() -> XmlError {
    XmlError::Malformed("content after the document element".to_string())
}

fn element_node(
    reader: &NsReader<&[u8]>,
    e: &BytesStart,
    start: usize,
    parent: Option<usize>,
) -> Result<ElementNode> {
    let (resolved, local_name) = reader.resolve_element(e.name());
    let namespace = match resolved {
        ResolveResult::Bound(Namespace(ns)) => Some(std::str::from_utf8(ns)?.to_string()),
        _ => None,
    };

    let mut id = None;
    for attr in e.attributes() {
        let attr = attr.map_err(XmlError::parse)?;
        if attr.key.as_ref() == b"ID" {
            id = Some(attr.unescape_value().map_err(XmlError::parse)?.into_owned());
        }
    }

    Ok(ElementNode {
        name: std::str::from_utf8(e.name().as_ref())?.to_string(),
        local_name: std::str::from_utf8(local_name.as_ref())?.to_string(),
        namespace,
        id,
        span: Span { start, end: start },
        content_start: None,
        parent,
    })
}

/// Insert `fragment` at byte offset `at`
pub fn insert_at(xml: &str, at: usize, fragment: &str) -> String {
    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..at]);
    out.push_str(fragment);
    out.push_str(&xml[at..]);
    out
}

/// Remove the bytes covered by `span`
pub fn remove_span(xml: &str, span: Span) -> String {
    let mut out = String::with_capacity(xml.len() - (span.end - span.start));
    out.push_str(&xml[..span.start]);
    out.push_str(&xml[span.end..]);
    out
}
