//! Namespace-aware XML element tree built on quick-xml.
//!
//! Every element remembers its byte span in the source document so that
//! signed content can be re-extracted verbatim for canonicalization.

use crate::c14n::{canonicalize_in_context, C14nOptions};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::ops::Range;
use thiserror::Error;

/// Maximum element nesting accepted by the parser
pub const MAX_DEPTH: usize = 64;

/// Namespace implicitly bound to the `xml` prefix
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Low-level XML errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("XML is not well-formed: {0}")]
    Syntax(String),

    #[error("Unsupported XML encoding: {0}")]
    Encoding(String),

    #[error("DOCTYPE declarations are not allowed")]
    DoctypeForbidden,

    #[error("Undeclared namespace prefix: {0}")]
    UnboundPrefix(String),

    #[error("XML nesting exceeds maximum depth of {MAX_DEPTH}")]
    TooDeep,

    #[error("XML document has no root element")]
    NoRoot,
}

/// A namespace declaration (`xmlns` or `xmlns:prefix`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

/// A non-namespace-declaration attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
    pub value: String,
}

/// An element and its subtree
#[derive(Debug, Clone)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
    pub attributes: Vec<XmlAttribute>,
    pub namespace_decls: Vec<NamespaceDecl>,
    pub children: Vec<XmlElement>,
    /// Concatenated direct text and CDATA content
    pub text: String,
    /// Byte range of the whole element in the source
    pub span: Range<usize>,
    /// Byte range of the start tag (or the empty-element tag)
    pub start_tag: Range<usize>,
    pub self_closing: bool,
}

impl XmlElement {
    /// True if the element has the given expanded name.
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// `prefix:local` as written in the document.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Value of an unqualified attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespace-qualified attribute.
    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// First child with the given expanded name.
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, local_name))
    }

    /// All children with the given expanded name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children
            .iter()
            .filter(move |c| c.is(namespace, local_name))
    }

    /// Trimmed direct text content.
    pub fn text_content(&self) -> &str {
        self.text.trim()
    }

    /// True if the element carries non-whitespace character data.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

/// Depth-first iterator over an element's descendants
pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// A parsed document together with its source text
#[derive(Debug, Clone)]
pub struct XmlDocument {
    source: String,
    root: XmlElement,
}

impl XmlDocument {
    /// Parse a UTF-8 XML document.
    ///
    /// DOCTYPE declarations, non-UTF-8 encoding declarations, unbound
    /// prefixes and nesting deeper than [`MAX_DEPTH`] are rejected.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut scopes: Vec<Vec<NamespaceDecl>> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader
                .read_event()
                .map_err(|e| XmlError::Syntax(e.to_string()))?;
            let end = reader.buffer_position() as usize;

            match event {
                Event::Decl(decl) => {
                    if let Some(encoding) = decl.encoding() {
                        let encoding = encoding.map_err(|e| XmlError::Syntax(e.to_string()))?;
                        let name = String::from_utf8_lossy(&encoding);
                        if !name.eq_ignore_ascii_case("utf-8") && !name.eq_ignore_ascii_case("utf8")
                        {
                            return Err(XmlError::Encoding(name.into_owned()));
                        }
                    }
                }
                Event::DocType(_) => return Err(XmlError::DoctypeForbidden),
                Event::Start(e) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(XmlError::TooDeep);
                    }
                    let element = open_element(&e, &scopes, start..end, false)?;
                    scopes.push(element.namespace_decls.clone());
                    stack.push(element);
                }
                Event::Empty(e) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(XmlError::TooDeep);
                    }
                    let element = open_element(&e, &scopes, start..end, true)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Syntax("unexpected end tag".to_string()))?;
                    scopes.pop();
                    element.span.end = end;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| XmlError::Syntax(e.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Event::CData(data) => {
                    let text =
                        std::str::from_utf8(&data).map_err(|e| XmlError::Syntax(e.to_string()))?;
                    push_text(&mut stack, text)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Syntax(format!(
                "unclosed element <{}>",
                open.qualified_name()
            )));
        }

        let root = root.ok_or(XmlError::NoRoot)?;
        Ok(Self {
            source: xml.to_string(),
            root,
        })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The element's exact source text.
    pub fn raw(&self, element: &XmlElement) -> &str {
        self.source.get(element.span.clone()).unwrap_or_default()
    }

    /// Number of elements in the document carrying `id` as an identifier
    /// attribute (`ID`, `Id`, `id` or `xml:id`).
    pub fn count_id(&self, id: &str) -> usize {
        std::iter::once(&self.root)
            .chain(self.root.descendants())
            .map(|el| {
                el.attributes
                    .iter()
                    .filter(|a| a.value == id && is_id_attribute(a))
                    .count()
            })
            .sum()
    }

    /// Canonicalize `element` in the context of this document.
    ///
    /// When `exclude` names a descendant, its markup is removed first
    /// (the enveloped-signature transform).
    pub fn canonicalize_element(
        &self,
        element: &XmlElement,
        exclude: Option<&XmlElement>,
        options: &C14nOptions,
    ) -> Result<String, XmlError> {
        let mut fragment = String::with_capacity(element.span.len());
        match exclude.filter(|e| {
            e.span.start >= element.start_tag.end && e.span.end <= element.span.end
        }) {
            Some(excluded) => {
                fragment.push_str(self.slice(element.span.start..excluded.span.start));
                fragment.push_str(self.slice(excluded.span.end..element.span.end));
            }
            None => fragment.push_str(self.slice(element.span.clone())),
        }
        canonicalize_in_context(&fragment, &self.inherited_namespaces(element), options)
    }

    fn slice(&self, range: Range<usize>) -> &str {
        self.source.get(range).unwrap_or_default()
    }

    /// Namespace declarations made by the ancestors of `target`, outermost first.
    fn inherited_namespaces(&self, target: &XmlElement) -> Vec<NamespaceDecl> {
        let mut scope = Vec::new();
        let mut current = &self.root;
        while current.span != target.span {
            scope.extend(current.namespace_decls.iter().cloned());
            match current.children.iter().find(|c| {
                c.span.start <= target.span.start && target.span.end <= c.span.end
            }) {
                Some(child) => current = child,
                None => break,
            }
        }
        scope
    }
}

/// True if `value` is a valid `xs:NCName` (and therefore usable as `xs:ID`).
pub fn is_ncname(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_id_attribute(attr: &XmlAttribute) -> bool {
    match attr.namespace.as_deref() {
        None => matches!(attr.local_name.as_str(), "ID" | "Id" | "id"),
        Some(ns) => ns == XML_NS && attr.local_name == "id",
    }
}

fn open_element(
    e: &BytesStart<'_>,
    scopes: &[Vec<NamespaceDecl>],
    start_tag: Range<usize>,
    self_closing: bool,
) -> Result<XmlElement, XmlError> {
    let mut namespace_decls = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Syntax(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax(e.to_string()))?
            .into_owned();

        if key == "xmlns" {
            namespace_decls.push(NamespaceDecl {
                prefix: None,
                uri: value,
            });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespace_decls.push(NamespaceDecl {
                prefix: Some(prefix.to_string()),
                uri: value,
            });
        } else {
            raw_attributes.push((key, value));
        }
    }

    let qname = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| XmlError::Syntax(e.to_string()))?
        .to_string();
    let (prefix, local_name) = split_qname(&qname);

    let namespace = match prefix {
        Some(p) => Some(
            resolve(Some(p), &namespace_decls, scopes)
                .ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?,
        ),
        None => resolve(None, &namespace_decls, scopes).filter(|uri| !uri.is_empty()),
    };

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_namespace = match attr_prefix {
            Some(p) => Some(
                resolve(Some(p), &namespace_decls, scopes)
                    .ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?,
            ),
            None => None,
        };
        attributes.push(XmlAttribute {
            namespace: attr_namespace,
            prefix: attr_prefix.map(str::to_string),
            local_name: attr_local.to_string(),
            value,
        });
    }

    Ok(XmlElement {
        namespace,
        prefix: prefix.map(str::to_string),
        local_name: local_name.to_string(),
        attributes,
        namespace_decls,
        children: Vec::new(),
        text: String::new(),
        span: start_tag.clone(),
        start_tag,
        self_closing,
    })
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn resolve(
    prefix: Option<&str>,
    own: &[NamespaceDecl],
    scopes: &[Vec<NamespaceDecl>],
) -> Option<String> {
    if prefix == Some("xml") {
        return Some(XML_NS.to_string());
    }
    own.iter()
        .chain(scopes.iter().rev().flatten())
        .find(|d| d.prefix.as_deref() == prefix)
        .map(|d| d.uri.clone())
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(XmlError::Syntax("multiple root elements".to_string()))
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(element) => element.text.push_str(text),
        None if !text.trim().is_empty() => {
            return Err(XmlError::Syntax("text outside the root element".to_string()))
        }
        None => {}
    }
    Ok(())
}
