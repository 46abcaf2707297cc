//! Minimal XML element tree built on `quick-xml`.
//!
//! Only what KML extraction needs is kept: element local names, child order,
//! and text. Attributes are checked for well-formedness and then dropped, as are
//! comments and processing instructions.
//! Namespace prefixes are stripped, so `kml:Placemark` and `Placemark` are the
//! same tag.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ConvertError, Result};

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A child element.
    Element(Element),
    /// Character data (text or CDATA), already unescaped.
    Text(String),
}

/// An XML element with its children in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    children: Vec<Node>,
}

/// A parsed XML document with exactly one root element.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse XML text into a tree.
    ///
    /// Any well-formedness problem (mismatched or unclosed tags, bad escapes,
    /// invalid names, unquoted or repeated attributes, missing or duplicate
    /// root, stray text outside the root) is reported as
    /// [`ConvertError::MalformedXml`].
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(Element::new(open_tag(&e)?)),
                Ok(Event::Empty(e)) => {
                    let element = Element::new(open_tag(&e)?);
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ConvertError::malformed("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| ConvertError::malformed(err.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e);
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(ConvertError::malformed(format!(
                        "at byte {}: {err}",
                        reader.buffer_position()
                    )));
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(ConvertError::malformed(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.map(|root| Self { root })
            .ok_or_else(|| ConvertError::malformed("no root element"))
    }

    /// The root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// All elements named `name` in document order, the root included.
    pub fn elements_by_name<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        if self.root.name == name {
            out.push(&self.root);
        }
        self.root.collect_descendants(name, &mut out);
        out
    }
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    /// Local tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Child nodes in document order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Descendant elements named `name` in document order, excluding `self`.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    /// First descendant element named `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.child_elements().find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }

    /// Descendants matching a descendant-combinator path.
    ///
    /// `select(&["Polygon", "outerBoundaryIs", "coordinates"])` returns every
    /// `coordinates` element that has an `outerBoundaryIs` ancestor, which in
    /// turn has a `Polygon` ancestor, all strictly below `self`.
    pub fn select<'a>(&'a self, path: &[&str]) -> Vec<&'a Element> {
        let mut out = Vec::new();
        if let Some((target, ancestors)) = path.split_last() {
            let mut trail = Vec::new();
            self.collect_selected(target, ancestors, &mut trail, &mut out);
        }
        out
    }

    /// First match of [`Element::select`].
    pub fn select_first<'a>(&'a self, path: &[&str]) -> Option<&'a Element> {
        self.select(path).into_iter().next()
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name == name {
                out.push(child);
            }
            child.collect_descendants(name, out);
        }
    }

    fn collect_selected<'a>(
        &'a self,
        target: &str,
        ancestors: &[&str],
        trail: &mut Vec<&'a str>,
        out: &mut Vec<&'a Element>,
    ) {
        for child in self.child_elements() {
            if child.name == target && trail_matches(trail, ancestors) {
                out.push(child);
            }
            trail.push(child.name.as_str());
            child.collect_selected(target, ancestors, trail, out);
            trail.pop();
        }
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

/// Greedy match of `path` against the ancestor trail, nearest ancestor first.
fn trail_matches(trail: &[&str], path: &[&str]) -> bool {
    let mut remaining = path.iter().rev().peekable();
    for name in trail.iter().rev() {
        match remaining.peek() {
            Some(wanted) if *wanted == name => {
                remaining.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    remaining.peek().is_none()
}

/// Validate a start tag and its attributes, returning the local name.
fn open_tag(start: &BytesStart<'_>) -> Result<String> {
    let qname_bytes = start.name();
    let qname = utf8(qname_bytes.as_ref())?;
    if !is_xml_name(qname) {
        return Err(ConvertError::malformed(format!("invalid element name {qname:?}")));
    }

    for attr in start.attributes() {
        let attr = attr.map_err(|err| {
            ConvertError::malformed(format!("bad attribute in <{qname}>: {err}"))
        })?;
        let key = utf8(attr.key.as_ref())?;
        if !is_xml_name(key) {
            return Err(ConvertError::malformed(format!(
                "invalid attribute name {key:?} in <{qname}>"
            )));
        }
        attr.unescape_value()
            .map_err(|err| ConvertError::malformed(err.to_string()))?;
    }

    utf8(start.local_name().as_ref()).map(str::to_owned)
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|err| ConvertError::malformed(err.to_string()))
}

/// XML 1.0 `Name` production; any non-ASCII character is accepted.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let start = |c: char| c.is_ascii_alphabetic() || c == '_' || c == ':' || !c.is_ascii();
    start(first) && chars.all(|c| start(c) || c.is_ascii_digit() || c == '-' || c == '.')
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(ConvertError::malformed("multiple root elements"));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text.to_owned()));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(ConvertError::malformed("text outside root element")),
    }
}
