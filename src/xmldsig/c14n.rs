use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, BTreeSet};
use std::str;

use super::utils::Span;
use super::{CanonicalizationAlgorithm, Result, XmlError};

type NsMap = BTreeMap<String, String>;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalize the document element of `xml`.
///
/// `inclusive_prefixes` is the `InclusiveNamespaces` PrefixList of exclusive
/// canonicalization (`#default` names the default namespace); it is ignored by the
/// inclusive algorithms.
pub fn canonicalize(
    xml: &str,
    algorithm: CanonicalizationAlgorithm,
    inclusive_prefixes: &[String],
) -> Result<String> {
    canonicalize_subtree(xml, None, None, algorithm, inclusive_prefixes)
}

/// Canonicalize the element at `target` (the document element when `None`) in the context
/// of the whole document, leaving out the subtree at `exclude`.
///
/// Namespace declarations of ancestors outside `target` stay in scope, which is what makes
/// the output of a nested element identical to canonicalizing it after extraction with
/// its in-scope namespaces.
pub fn canonicalize_subtree(
    xml: &str,
    target: Option<Span>,
    exclude: Option<Span>,
    algorithm: CanonicalizationAlgorithm,
    inclusive_prefixes: &[String],
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    // Stack of declared namespace maps
    let mut ns_declared_stack: Vec<NsMap> = vec![NsMap::new()];
    // Stack of rendered namespace maps
    let mut ns_rendered_stack: Vec<NsMap> = vec![NsMap::new()];

    let mut out = String::new();
    let mut emit_depth = 0usize;
    let mut skip_depth = 0usize;
    let mut found = false;

    loop {
        let position = reader.buffer_position() as usize;
        let emitting = emit_depth > 0 && skip_depth == 0;

        match reader.read_event().map_err(XmlError::parse)? {
            Event::Start(e) => {
                let parent_declared = ns_declared_stack.last().cloned().unwrap_or_default();
                let declared = declare_namespaces(&e, parent_declared)?;

                let excluded = emitting && exclude.is_some_and(|span| span.start == position);
                let entering =
                    emit_depth == 0 && !found && target.is_none_or(|span| span.start == position);

                if skip_depth > 0 || excluded {
                    skip_depth += 1;
                    ns_declared_stack.push(declared);
                    ns_rendered_stack.push(NsMap::new());
                } else if emit_depth > 0 || entering {
                    // Output starts with nothing rendered, whatever the ancestors declared
                    let rendered_parent = if entering {
                        found = true;
                        NsMap::new()
                    } else {
                        ns_rendered_stack.last().cloned().unwrap_or_default()
                    };
                    let rendered = write_start_tag(
                        &mut out,
                        &e,
                        &declared,
                        &rendered_parent,
                        algorithm,
                        inclusive_prefixes,
                    )?;
                    emit_depth += 1;
                    ns_declared_stack.push(declared);
                    ns_rendered_stack.push(rendered);
                } else {
                    ns_declared_stack.push(declared);
                    ns_rendered_stack.push(NsMap::new());
                }
            }
            Event::End(e) => {
                ns_declared_stack.pop();
                ns_rendered_stack.pop();
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else if emit_depth > 0 {
                    out.push_str("</");
                    out.push_str(str::from_utf8(e.name().as_ref())?);
                    out.push('>');
                    emit_depth -= 1;
                    if emit_depth == 0 {
                        break;
                    }
                }
            }
            Event::Text(e) if emitting => {
                let text = e.xml_content().map_err(XmlError::parse)?;
                escape_text_into(&mut out, &text);
            }
            Event::CData(e) if emitting => {
                // CDATA is normalized to text content
                let raw = e.into_inner();
                let text = normalize_line_endings(str::from_utf8(&raw)?);
                escape_text_into(&mut out, &text);
            }
            Event::GeneralRef(e) if emitting => {
                let resolved = match e.resolve_char_ref().map_err(XmlError::parse)? {
                    Some(ch) => ch.to_string(),
                    None => {
                        let name = e.decode().map_err(XmlError::parse)?;
                        resolve_predefined_entity(&name)
                            .ok_or_else(|| XmlError::Parse(format!("undeclared entity: {name}")))?
                            .to_string()
                    }
                };
                escape_text_into(&mut out, &resolved);
            }
            Event::Comment(e) if emitting && algorithm.with_comments() => {
                let comment = e.decode().map_err(XmlError::parse)?;
                out.push_str("<!--");
                out.push_str(&normalize_line_endings(&comment));
                out.push_str("-->");
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Err(XmlError::NotFound("element to canonicalize".to_string()));
    }
    if emit_depth > 0 {
        return Err(XmlError::Malformed("element is not closed".to_string()));
    }
    Ok(out)
}

/// Namespace scope of `e`: the parent scope plus the element's own declarations.
fn declare_namespaces(e: &BytesStart, mut declared: NsMap) -> Result<NsMap> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(XmlError::parse)?;
        let key = str::from_utf8(attr.key.as_ref())?;
        let prefix = if key == "xmlns" {
            ""
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            prefix
        } else {
            continue;
        };

        let uri = normalized_value(&attr)?;
        if uri.is_empty() {
            declared.remove(prefix);
        } else {
            declared.insert(prefix.to_string(), uri);
        }
    }
    Ok(declared)
}

/// Write the canonical start tag of `e` and return the namespace map in effect for its
/// children's output.
fn write_start_tag(
    out: &mut String,
    e: &BytesStart,
    declared: &NsMap,
    rendered_parent: &NsMap,
    algorithm: CanonicalizationAlgorithm,
    inclusive_prefixes: &[String],
) -> Result<NsMap> {
    let qname = e.name();
    let name = str::from_utf8(qname.as_ref())?;

    // (namespace URI, local name, qualified name, value)
    let mut attributes = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(XmlError::parse)?;
        let key = str::from_utf8(attr.key.as_ref())?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }

        let value = normalized_value(&attr)?;
        let (uri, local) = match key.split_once(':') {
            Some(("xml", local)) => (XML_NAMESPACE.to_string(), local),
            Some((prefix, local)) => (declared.get(prefix).cloned().unwrap_or_default(), local),
            None => (String::new(), key),
        };
        attributes.push((uri, local.to_string(), key.to_string(), value));
    }

    let candidates: BTreeSet<String> = if algorithm.is_exclusive() {
        // Visibly utilized prefixes plus the PrefixList
        let mut set = BTreeSet::new();
        set.insert(name.split_once(':').map_or("", |(p, _)| p).to_string());
        for (_, _, key, _) in &attributes {
            if let Some((prefix, _)) = key.split_once(':') {
                set.insert(prefix.to_string());
            }
        }
        for prefix in inclusive_prefixes {
            if prefix == "#default" {
                set.insert(String::new());
            } else {
                set.insert(prefix.clone());
            }
        }
        set
    } else {
        declared.keys().chain(rendered_parent.keys()).cloned().collect()
    };

    let mut render_ns = Vec::new();
    for prefix in candidates {
        if prefix == "xml" {
            continue;
        }
        let current = declared.get(&prefix).map_or("", String::as_str);
        let rendered = rendered_parent.get(&prefix).map_or("", String::as_str);
        if current == rendered {
            continue;
        }
        // Only the default namespace can be undeclared
        if current.is_empty() && !prefix.is_empty() {
            continue;
        }
        render_ns.push((prefix, current.to_string()));
    }

    out.push('<');
    out.push_str(name);
    for (prefix, uri) in &render_ns {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attr_into(out, uri);
        out.push('"');
    }

    attributes.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    for (_, _, key, value) in &attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr_into(out, value);
        out.push('"');
    }
    out.push('>');

    let mut rendered = rendered_parent.clone();
    for (prefix, uri) in render_ns {
        rendered.insert(prefix, uri);
    }
    Ok(rendered)
}

/// Attribute-value normalization of CDATA attributes: literal whitespace becomes a space
/// before references are resolved, so `&#xA;` survives as a line feed.
fn normalized_value(attr: &Attribute) -> Result<String> {
    let raw = normalize_line_endings(str::from_utf8(&attr.value)?).replace(['\t', '\n'], " ");
    Ok(unescape(&raw).map_err(XmlError::parse)?.into_owned())
}

/// Normalize line endings to LF
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Escape attribute value per C14N rules.
fn escape_attr_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

/// Escape text node value per C14N rules.
fn escape_text_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}
