//! Owned XML tree with namespace resolution.
//!
//! The tree keeps everything needed to write a manifest back out the way it
//! came in: prefixes as written, attribute order, comments, processing
//! instructions, and whitespace text. Each element and attribute also
//! carries its resolved namespace URI so edit code can match on
//! `(namespace, local name)` without caring which prefix a document uses.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of `xmlns` and `xmlns:*` attributes.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Errors produced while reading or writing a manifest document.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Syntax(String),

    #[error("Unsupported encoding: {0}")]
    Encoding(String),

    #[error("Namespace prefix '{0}' is not declared")]
    UnboundPrefix(String),

    #[error("The document has no root element")]
    MissingRoot,

    #[error("The document has more than one root element")]
    MultipleRoots,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn syntax(err: impl std::fmt::Display) -> XmlError {
    XmlError::Syntax(err.to_string())
}

fn utf8(bytes: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|e| XmlError::Encoding(e.to_string()))
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn join_qname<'a>(prefix: Option<&str>, local: &'a str) -> Cow<'a, str> {
    match prefix {
        Some(prefix) => Cow::Owned(format!("{prefix}:{local}")),
        None => Cow::Borrowed(local),
    }
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, unescaped.
    Text(String),
    CData(String),
    Comment(String),
    /// Raw content between `<?` and `?>`.
    ProcessingInstruction(String),
    /// Raw content of the `<?xml ...?>` declaration.
    Declaration(String),
    DocType(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    value: String,
}

impl Attribute {
    /// An unprefixed attribute (no namespace).
    pub fn new(local_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_name: local_name.into(),
            namespace: None,
            value: value.into(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn qualified_name(&self) -> Cow<'_, str> {
        join_qname(self.prefix(), &self.local_name)
    }

    /// For `xmlns="..."` returns `""`, for `xmlns:p="..."` returns `"p"`.
    fn declared_prefix(&self) -> Option<&str> {
        match (self.prefix(), self.local_name.as_str()) {
            (None, "xmlns") => Some(""),
            (Some("xmlns"), prefix) => Some(prefix),
            _ => None,
        }
    }

    fn is_plain(&self, name: &str) -> bool {
        self.prefix.is_none() && self.local_name == name
    }
}

/// An element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    /// An unprefixed element outside any namespace.
    pub fn new(local_name: impl Into<String>) -> Self {
        Self::new_in(None, None, local_name)
    }

    /// An element in `namespace`, written with `prefix`.
    ///
    /// The caller is responsible for the prefix being declared on an
    /// ancestor; an unprefixed element relies on the in-scope default
    /// namespace.
    pub fn new_in(namespace: Option<&str>, prefix: Option<&str>, local_name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            local_name: local_name.into(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`Element::set_attribute`].
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn qualified_name(&self) -> Cow<'_, str> {
        join_qname(self.prefix(), &self.local_name)
    }

    /// Whether this element has the given namespace and local name.
    pub fn is(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace() == namespace
    }

    /// Value of an unprefixed attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.is_plain(name))
            .map(Attribute::value)
    }

    /// Value of a namespaced attribute.
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name && a.namespace() == Some(namespace))
            .map(Attribute::value)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Set an unprefixed attribute, appending it if absent. Returns the
    /// previous value.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.is_plain(name)) {
            Some(existing) => Some(std::mem::replace(&mut existing.value, value)),
            None => {
                self.attributes.push(Attribute::new(name, value));
                None
            }
        }
    }

    /// Remove an unprefixed attribute, returning its value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|a| a.is_plain(name))?;
        Some(self.attributes.remove(index).value)
    }

    /// Namespace declarations made on this element, as `(prefix, uri)`.
    /// The default namespace is reported with an empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter_map(|a| a.declared_prefix().map(|p| (p, a.value())))
    }

    /// The default namespace declared on this element, if any.
    pub fn default_namespace(&self) -> Option<&str> {
        self.namespace_declarations()
            .find(|(prefix, _)| prefix.is_empty())
            .map(|(_, uri)| uri)
            .filter(|uri| !uri.is_empty())
    }

    /// The prefix this element declares for `uri`, if any.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespace_declarations()
            .find(|(prefix, declared)| !prefix.is_empty() && *declared == uri)
            .map(|(prefix, _)| prefix)
    }

    /// Declare `xmlns:prefix="uri"` on this element.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.attributes.push(Attribute {
            prefix: Some("xmlns".to_string()),
            local_name: prefix.to_string(),
            namespace: Some(XMLNS_NAMESPACE.to_string()),
            value: uri.to_string(),
        });
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, skipping text and other nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// First child element with the given namespace and local name.
    pub fn child(&self, namespace: Option<&str>, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(namespace, local_name))
    }

    pub fn child_mut(&mut self, namespace: Option<&str>, local_name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(namespace, local_name))
    }

    /// First child element with the given local name, in any namespace.
    pub fn child_by_local_name(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name == local_name)
    }

    /// Concatenated text and CDATA content of this element's direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Append a child element and return it.
    pub fn push_element(&mut self, element: Element) -> &mut Element {
        self.children.push(Node::Element(element));
        let index = self.children.len() - 1;
        self.element_at_mut(index)
    }

    /// Insert a child element at node `index` (0 is the first child).
    pub fn insert_element(&mut self, index: usize, element: Element) -> &mut Element {
        let index = index.min(self.children.len());
        self.children.insert(index, Node::Element(element));
        self.element_at_mut(index)
    }

    pub fn push_node(&mut self, node: Node) {
        self.children.push(node);
    }

    /// First child element matching `predicate`, or a new one from `make`
    /// appended as the last child.
    pub fn get_or_insert_with<P, F>(&mut self, predicate: P, make: F) -> &mut Element
    where
        P: Fn(&Element) -> bool,
        F: FnOnce() -> Element,
    {
        let found = self
            .children
            .iter()
            .position(|node| node.as_element().is_some_and(&predicate));
        let index = match found {
            Some(index) => index,
            None => {
                self.children.push(Node::Element(make()));
                self.children.len() - 1
            }
        };
        self.element_at_mut(index)
    }

    fn element_at_mut(&mut self, index: usize) -> &mut Element {
        match &mut self.children[index] {
            Node::Element(element) => element,
            _ => unreachable!("node {index} holds an element"),
        }
    }
}

/// Parsed pieces of a document: nodes before the root, the root, nodes after.
pub(crate) struct ParsedDocument {
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

#[derive(Default)]
struct Scopes(Vec<Vec<(String, String)>>);

impl Scopes {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.0
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(declared, _)| declared == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn resolve_prefixed(&self, prefix: &str) -> Result<String, XmlError> {
        self.resolve(prefix)
            .map(str::to_string)
            .ok_or_else(|| XmlError::UnboundPrefix(prefix.to_string()))
    }
}

fn open_element(start: &BytesStart<'_>, scopes: &mut Scopes) -> Result<Element, XmlError> {
    let mut attributes = Vec::new();
    let mut declared = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(syntax)?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(syntax)?.into_owned();
        let (prefix, local) = split_qname(key);
        let attribute = Attribute {
            prefix: prefix.map(str::to_string),
            local_name: local.to_string(),
            namespace: None,
            value,
        };
        if let Some(declared_prefix) = attribute.declared_prefix() {
            declared.push((declared_prefix.to_string(), attribute.value.clone()));
        }
        attributes.push(attribute);
    }
    scopes.0.push(declared);

    for attribute in &mut attributes {
        attribute.namespace = if attribute.declared_prefix().is_some() {
            Some(XMLNS_NAMESPACE.to_string())
        } else {
            match attribute.prefix.as_deref() {
                Some(prefix) => Some(scopes.resolve_prefixed(prefix)?),
                None => None,
            }
        };
    }

    let qname = utf8(start.name().as_ref())?.to_string();
    let (prefix, local) = split_qname(&qname);
    let namespace = match prefix {
        Some(prefix) => Some(scopes.resolve_prefixed(prefix)?),
        None => scopes
            .resolve("")
            .filter(|uri| !uri.is_empty())
            .map(str::to_string),
    };

    Ok(Element {
        prefix: prefix.map(str::to_string),
        local_name: local.to_string(),
        namespace,
        attributes,
        children: Vec::new(),
    })
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
}

impl TreeBuilder {
    fn close(&mut self, element: Element) -> Result<(), XmlError> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(Node::Element(element));
        } else if self.root.is_some() {
            return Err(XmlError::MultipleRoots);
        } else {
            self.root = Some(element);
        }
        Ok(())
    }

    fn node(&mut self, node: Node) -> Result<(), XmlError> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        if let Node::Text(text) = &node {
            if !text.trim().is_empty() {
                return Err(XmlError::Syntax(
                    "text is not allowed outside the root element".to_string(),
                ));
            }
        }
        if self.root.is_none() {
            self.prolog.push(node);
        } else {
            self.epilog.push(node);
        }
        Ok(())
    }
}

/// Parse a complete document from text.
pub(crate) fn parse(text: &str) -> Result<ParsedDocument, XmlError> {
    let mut reader = Reader::from_str(text);
    let mut scopes = Scopes::default();
    let mut tree = TreeBuilder::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Syntax(format!("{e} (at byte {})", reader.buffer_position())))?;

        match event {
            Event::Start(start) => {
                let element = open_element(&start, &mut scopes)?;
                tree.stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&start, &mut scopes)?;
                scopes.0.pop();
                tree.close(element)?;
            }
            Event::End(_) => {
                let element = tree
                    .stack
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected closing tag".to_string()))?;
                scopes.0.pop();
                tree.close(element)?;
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(syntax)?.into_owned();
                tree.node(Node::Text(value))?;
            }
            Event::CData(data) => tree.node(Node::CData(utf8(&data)?.to_string()))?,
            Event::Comment(comment) => tree.node(Node::Comment(utf8(&comment)?.to_string()))?,
            Event::Decl(decl) => tree.node(Node::Declaration(utf8(&decl)?.to_string()))?,
            Event::PI(pi) => tree.node(Node::ProcessingInstruction(utf8(&pi)?.to_string()))?,
            Event::DocType(doctype) => {
                tree.node(Node::DocType(utf8(&doctype)?.trim().to_string()))?;
            }
            Event::Eof => break,
        }
    }

    if let Some(open) = tree.stack.last() {
        return Err(XmlError::Syntax(format!(
            "element <{}> is never closed",
            open.qualified_name()
        )));
    }
    let root = tree.root.ok_or(XmlError::MissingRoot)?;

    Ok(ParsedDocument {
        prolog: tree.prolog,
        root,
        epilog: tree.epilog,
    })
}

/// Append the serialized form of `node` to `out`.
pub(crate) fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(element) => write_element(out, element),
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Node::CData(data) => {
            out.push_str("<![CDATA[");
            out.push_str(data);
            out.push_str("]]>");
        }
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::ProcessingInstruction(content) | Node::Declaration(content) => {
            out.push_str("<?");
            out.push_str(content);
            out.push_str("?>");
        }
        Node::DocType(doctype) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(doctype);
            out.push('>');
        }
    }
}

pub(crate) fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.qualified_name());
    for attribute in &element.attributes {
        out.push(' ');
        out.push_str(&attribute.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape(attribute.value.as_str()));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in &element.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&element.qualified_name());
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOUNDATION: &str = "http://schemas.microsoft.com/appx/manifest/foundation/windows10";
    const UAP: &str = "http://schemas.microsoft.com/appx/manifest/uap/windows10";

    fn render(element: &Element) -> String {
        let mut out = String::new();
        write_element(&mut out, element);
        out
    }

    #[test]
    fn test_resolves_default_and_prefixed_namespaces() {
        let doc = parse(&format!(
            r#"<Package xmlns="{FOUNDATION}" xmlns:uap="{UAP}"><uap:VisualElements Name="x"/><Identity/></Package>"#
        ))
        .unwrap();

        assert!(doc.root.is(Some(FOUNDATION), "Package"));
        assert!(doc.root.child(Some(UAP), "VisualElements").is_some());
        assert!(doc.root.child(Some(FOUNDATION), "Identity").is_some());
        assert_eq!(doc.root.default_namespace(), Some(FOUNDATION));
        assert_eq!(doc.root.prefix_for(UAP), Some("uap"));
    }

    #[test]
    fn test_unbound_prefix() {
        let err = parse("<Package><foo:Bar/></Package>").err().unwrap();
        assert!(matches!(err, XmlError::UnboundPrefix(p) if p == "foo"));
    }

    #[test]
    fn test_root_errors() {
        assert!(matches!(parse("<!-- nothing -->").err().unwrap(), XmlError::MissingRoot));
        assert!(matches!(parse("<a/><b/>").err().unwrap(), XmlError::MultipleRoots));
        assert!(matches!(parse("hello <a/>").err().unwrap(), XmlError::Syntax(_)));
        assert!(matches!(parse("<a><b></a>").err().unwrap(), XmlError::Syntax(_)));
    }

    #[test]
    fn test_round_trip_preserves_layout() {
        let text = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!-- head -->\n<Package xmlns=\"urn:x\" b=\"2\" a=\"1\">\n  <Identity Name=\"A &amp; B\"/>\n  <Text>x &lt; y</Text>\n</Package>\n";
        let doc = parse(text).unwrap();
        let mut out = String::new();
        for node in &doc.prolog {
            write_node(&mut out, node);
        }
        write_element(&mut out, &doc.root);
        for node in &doc.epilog {
            write_node(&mut out, node);
        }
        assert_eq!(out, text);
    }

    #[test]
    fn test_set_attribute_returns_previous() {
        let mut element = Element::new("Identity");
        assert_eq!(element.set_attribute("Name", "A"), None);
        assert_eq!(element.set_attribute("Name", "B"), Some("A".to_string()));
        assert_eq!(element.attribute("Name"), Some("B"));
        assert_eq!(element.remove_attribute("Name"), Some("B".to_string()));
        assert_eq!(render(&element), "<Identity/>");
    }

    #[test]
    fn test_insert_and_get_or_insert() {
        let mut parent = Element::new("Capabilities");
        parent.push_element(Element::new("Capability").with_attribute("Name", "a"));
        parent.insert_element(0, Element::new("Capability").with_attribute("Name", "b"));
        let names: Vec<_> = parent.elements().filter_map(|e| e.attribute("Name")).collect();
        assert_eq!(names, ["b", "a"]);

        parent
            .get_or_insert_with(|e| e.local_name() == "Extra", || Element::new("Extra"))
            .set_attribute("k", "v");
        parent
            .get_or_insert_with(|e| e.local_name() == "Extra", || Element::new("Extra"))
            .set_attribute("k", "w");
        assert_eq!(parent.elements().count(), 3);
        assert_eq!(parent.child(None, "Extra").and_then(|e| e.attribute("k")), Some("w"));
    }

    #[test]
    fn test_text_content() {
        let doc = parse("<a><b>Hello <![CDATA[<world>]]></b></a>").unwrap();
        assert_eq!(doc.root.child(None, "b").unwrap().text(), "Hello <world>");
    }
}
