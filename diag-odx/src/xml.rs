//! Namespace-agnostic XML tree and null-safe accessors.
//!
//! ODX files in the wild mix default namespaces, prefixed namespaces and no
//! namespace at all, so every lookup here compares local names only. The
//! free functions take `Option<&Element>` and degrade to empty values, which
//! keeps optional-element chains in the resolvers flat.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity, unescape_with, EscapeError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("invalid escape: {0}")]
    Escape(#[from] EscapeError),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("NUL character in document")]
    NulCharacter,
    #[error("closing tag without matching opening tag")]
    Unbalanced,
    #[error("{0} element(s) still open at end of input")]
    Unclosed(usize),
    #[error("more than one root element")]
    MultipleRoots,
    #[error("no root element")]
    NoRoot,
}

/// How entity references are resolved while building the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityMode {
    /// XML predefined entities and character references only.
    Strict,
    /// Additionally HTML5 named entities; unknown ones become U+FFFD and
    /// malformed escapes are kept verbatim.
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    local: String,
    attributes: Vec<(String, String)>,
    nodes: Vec<Node>,
}

/// Strip a `prefix:` or `{uri}` namespace qualifier.
pub fn local_name(tag: &str) -> &str {
    if let Some((_, local)) = tag.rsplit_once('}') {
        return local;
    }
    tag.rsplit_once(':').map_or(tag, |(_, local)| local)
}

impl Element {
    pub fn new(tag: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        let tag = tag.into();
        let local = local_name(&tag).to_string();
        Self {
            tag,
            local,
            attributes,
            nodes: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn is(&self, name: &str) -> bool {
        self.local == name
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First non-empty attribute among `names`, compared case-insensitively.
    pub fn attr_ci(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| {
            self.attributes
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(n) && !v.is_empty())
                .map(|(_, v)| v.as_str())
        })
    }

    /// Direct element children.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children().find(|c| c.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children().filter(move |c| c.is(name))
    }

    /// Trimmed text of the first direct child called `name`.
    pub fn child_text(&self, name: &str) -> String {
        self.child(name).map(Element::text).unwrap_or_default()
    }

    /// Trimmed concatenation of all text below this element.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// This element and everything below it called `name`, in document order.
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(el) = stack.pop() {
            if el.is(name) {
                out.push(el);
            }
            stack.extend(el.children().rev());
        }
        out
    }

    /// First descendant called `name` with non-empty text.
    pub fn first_descendant_text(&self, name: &str) -> Option<String> {
        self.descendants(name)
            .into_iter()
            .map(Element::text)
            .find(|t| !t.is_empty())
    }

    fn push_node(&mut self, node: Node) {
        self.nodes.push(node);
    }
}

// --- Null-safe accessors ---

pub fn attr<'a>(el: Option<&'a Element>, name: &str, default: &'a str) -> &'a str {
    el.and_then(|e| e.attr(name)).unwrap_or(default)
}

pub fn attr_ci<'a>(el: Option<&'a Element>, names: &[&str]) -> &'a str {
    el.and_then(|e| e.attr_ci(names)).unwrap_or_default()
}

pub fn child<'a>(el: Option<&'a Element>, name: &str) -> Option<&'a Element> {
    el.and_then(|e| e.child(name))
}

pub fn child_text(el: Option<&Element>, name: &str) -> String {
    el.map(|e| e.child_text(name)).unwrap_or_default()
}

pub fn children<'a>(el: Option<&'a Element>, name: &str) -> Vec<&'a Element> {
    el.map(|e| e.children().filter(|c| c.is(name)).collect())
        .unwrap_or_default()
}

pub fn descendants<'a>(el: Option<&'a Element>, name: &str) -> Vec<&'a Element> {
    el.map(|e| e.descendants(name)).unwrap_or_default()
}

/// `ID-REF` of the first direct child called `name`.
pub fn ref_id<'a>(el: Option<&'a Element>, name: &str) -> &'a str {
    attr(child(el, name), "ID-REF", "")
}

// --- Tree building ---

/// Build a tree from a complete document.
pub fn parse_str(text: &str, entities: EntityMode) -> Result<Element, XmlError> {
    // Mis-decoded UTF-16 shows up as interleaved NULs, which XML forbids
    if text.contains('\0') {
        return Err(XmlError::NulCharacter);
    }
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(open_element(&e, entities)?),
            Event::Empty(e) => {
                let el = open_element(&e, entities)?;
                close_element(el, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or(XmlError::Unbalanced)?;
                close_element(el, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let raw = std::str::from_utf8(&t)?;
                    top.push_node(Node::Text(unescape(raw, entities)?.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.push_node(Node::Text(std::str::from_utf8(&c)?.to_string()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Unclosed(stack.len()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn open_element(start: &BytesStart<'_>, entities: EntityMode) -> Result<Element, XmlError> {
    let tag = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let raw = std::str::from_utf8(&attr.value)?;
        attributes.push((
            local_name(key).to_string(),
            unescape(raw, entities)?.into_owned(),
        ));
    }
    Ok(Element::new(tag, attributes))
}

fn close_element(
    el: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.push_node(Node::Element(el));
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(XmlError::MultipleRoots)
    }
}

fn unescape(raw: &str, entities: EntityMode) -> Result<Cow<'_, str>, EscapeError> {
    match entities {
        EntityMode::Strict => unescape_with(raw, resolve_predefined_entity),
        EntityMode::Html => Ok(unescape_with(raw, |entity| {
            resolve_predefined_entity(entity)
                .or_else(|| resolve_html5_entity(entity))
                .or(Some("\u{FFFD}"))
        })
        .unwrap_or(Cow::Borrowed(raw))),
    }
}
