//! XML canonicalization (W3C Canonical XML 1.0 and Exclusive XML
//! Canonicalization 1.0, both without comments).
//!
//! The canonicalizer streams quick-xml events over a single element's
//! source text. Namespace bindings made by the element's ancestors are
//! supplied by the caller, so a subtree is canonicalized exactly as it
//! would be in the context of its document.

use crate::saml::constants::transform_algorithms;
use crate::xml::{NamespaceDecl, XmlError, XML_NS};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

/// Canonicalization algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
    Inclusive,
    /// `http://www.w3.org/2001/10/xml-exc-c14n#`
    Exclusive,
}

impl C14nMode {
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            transform_algorithms::INCLUSIVE_C14N => Some(Self::Inclusive),
            transform_algorithms::EXCLUSIVE_C14N => Some(Self::Exclusive),
            _ => None,
        }
    }
}

/// Canonicalization parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C14nOptions {
    pub mode: C14nMode,
    /// Prefixes handled with inclusive rules in exclusive mode.
    /// The default namespace is the empty string.
    inclusive_prefixes: Vec<String>,
}

impl C14nOptions {
    pub fn exclusive() -> Self {
        Self {
            mode: C14nMode::Exclusive,
            inclusive_prefixes: Vec::new(),
        }
    }

    pub fn inclusive() -> Self {
        Self {
            mode: C14nMode::Inclusive,
            inclusive_prefixes: Vec::new(),
        }
    }

    /// Apply an `InclusiveNamespaces/@PrefixList` value.
    pub fn with_prefix_list(mut self, prefix_list: &str) -> Self {
        self.inclusive_prefixes = prefix_list
            .split_ascii_whitespace()
            .map(|p| if p == "#default" { String::new() } else { p.to_string() })
            .collect();
        self
    }

    fn renders_in_scope(&self, prefix: &str) -> bool {
        match self.mode {
            C14nMode::Inclusive => true,
            C14nMode::Exclusive => self.inclusive_prefixes.iter().any(|p| p == prefix),
        }
    }
}

/// Namespace state of one open element.
/// Keys are prefixes, with the default namespace under the empty string.
#[derive(Clone, Default)]
struct Scope {
    in_scope: BTreeMap<String, String>,
    rendered: BTreeMap<String, String>,
}

/// Canonicalize a standalone document (or fragment with every prefix declared).
pub fn canonicalize(xml: &str, options: &C14nOptions) -> Result<String, XmlError> {
    canonicalize_in_context(xml, &[], options)
}

/// Canonicalize `fragment`, whose first element is the apex of the node set.
///
/// `inherited` holds the namespace declarations of the apex's ancestors,
/// outermost first.
pub fn canonicalize_in_context(
    fragment: &str,
    inherited: &[NamespaceDecl],
    options: &C14nOptions,
) -> Result<String, XmlError> {
    let mut context = Scope::default();
    for decl in inherited {
        context.in_scope.insert(
            decl.prefix.clone().unwrap_or_default(),
            decl.uri.clone(),
        );
    }

    let mut reader = Reader::from_str(fragment);
    reader.config_mut().trim_text(false);

    let mut out = String::with_capacity(fragment.len());
    let mut stack: Vec<Scope> = Vec::new();
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Syntax(e.to_string()))?;
        match event {
            Event::Start(e) => {
                let parent = stack.last().unwrap_or(&context);
                let scope = write_start_tag(&mut out, &e, parent, options)?;
                stack.push(scope);
                seen_root = true;
            }
            Event::Empty(e) => {
                let parent = stack.last().unwrap_or(&context);
                write_start_tag(&mut out, &e, parent, options)?;
                out.push_str("</");
                out.push_str(utf8(e.name().as_ref())?);
                out.push('>');
                seen_root = true;
            }
            Event::End(e) => {
                stack
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected end tag".to_string()))?;
                out.push_str("</");
                out.push_str(utf8(e.name().as_ref())?);
                out.push('>');
            }
            Event::Text(text) if !stack.is_empty() => {
                let raw = normalize_line_endings(utf8(&text)?);
                let value = unescape(&raw).map_err(|e| XmlError::Syntax(e.to_string()))?;
                escape_text(&mut out, &value);
            }
            Event::CData(data) if !stack.is_empty() => {
                escape_text(&mut out, &normalize_line_endings(utf8(&data)?));
            }
            Event::PI(pi) => {
                if stack.is_empty() && seen_root {
                    out.push('\n');
                }
                out.push_str("<?");
                let content = normalize_line_endings(utf8(&pi)?);
                match content.split_once(|c: char| c.is_ascii_whitespace()) {
                    Some((target, data)) if !data.trim_start().is_empty() => {
                        out.push_str(target);
                        out.push(' ');
                        out.push_str(data.trim_start());
                    }
                    Some((target, _)) => out.push_str(target),
                    None => out.push_str(&content),
                }
                out.push_str("?>");
                if stack.is_empty() && !seen_root {
                    out.push('\n');
                }
            }
            Event::DocType(_) => return Err(XmlError::DoctypeForbidden),
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Syntax("unclosed element".to_string()));
    }
    Ok(out)
}

fn write_start_tag(
    out: &mut String,
    e: &BytesStart<'_>,
    parent: &Scope,
    options: &C14nOptions,
) -> Result<Scope, XmlError> {
    let mut scope = parent.clone();
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        let value = normalize_attribute(utf8(&attr.value)?)?;
        if key == "xmlns" {
            scope.in_scope.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.in_scope.insert(prefix.to_string(), value);
        } else {
            attributes.push((key.to_string(), value));
        }
    }

    let name = e.name();
    let qname = utf8(name.as_ref())?;
    let element_prefix = qname.split_once(':').map(|(p, _)| p).unwrap_or_default();

    // Resolve attribute namespaces and note the prefixes they use
    let mut utilized = vec![element_prefix.to_string()];
    let mut sorted = Vec::with_capacity(attributes.len());
    for (key, value) in attributes {
        let namespace = match key.split_once(':') {
            Some(("xml", _)) => XML_NS.to_string(),
            Some((prefix, _)) => {
                utilized.push(prefix.to_string());
                scope
                    .in_scope
                    .get(prefix)
                    .cloned()
                    .ok_or_else(|| XmlError::UnboundPrefix(prefix.to_string()))?
            }
            None => String::new(),
        };
        let local = key.split_once(':').map(|(_, l)| l.to_string());
        sorted.push((namespace, local.unwrap_or_else(|| key.clone()), key, value));
    }
    sorted.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    if !element_prefix.is_empty() && !scope.in_scope.contains_key(element_prefix) {
        return Err(XmlError::UnboundPrefix(element_prefix.to_string()));
    }

    // Namespace axis, ordered by prefix with the default namespace first
    let mut declarations = BTreeMap::new();
    for (prefix, uri) in &scope.in_scope {
        if prefix == "xml" {
            continue;
        }
        if options.renders_in_scope(prefix) || utilized.iter().any(|u| u == prefix) {
            declarations.insert(prefix.clone(), uri.clone());
        }
    }
    if utilized.iter().any(String::is_empty) {
        declarations
            .entry(String::new())
            .or_insert_with(String::new);
    }

    out.push('<');
    out.push_str(qname);
    for (prefix, uri) in declarations {
        let rendered = scope.rendered.get(&prefix).map(String::as_str).unwrap_or_default();
        let already = if prefix.is_empty() {
            rendered == uri
        } else {
            scope.rendered.get(&prefix) == Some(&uri)
        };
        if already {
            continue;
        }
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(&prefix);
            out.push_str("=\"");
        }
        escape_attribute(out, &uri);
        out.push('"');
        scope.rendered.insert(prefix, uri);
    }
    for (_, _, key, value) in sorted {
        out.push(' ');
        out.push_str(&key);
        out.push_str("=\"");
        escape_attribute(out, &value);
        out.push('"');
    }
    out.push('>');

    Ok(scope)
}

fn utf8(bytes: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|e| XmlError::Syntax(e.to_string()))
}

fn normalize_line_endings(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Attribute-value normalization for CDATA attributes, then reference expansion.
fn normalize_attribute(raw: &str) -> Result<String, XmlError> {
    let spaced: String = raw
        .replace("\r\n", " ")
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect();
    unescape(&spaced)
        .map(|v| v.into_owned())
        .map_err(|e| XmlError::Syntax(e.to_string()))
}

fn escape_text(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
