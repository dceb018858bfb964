use crate::error::{Error, Result};
use crate::event::{Event, EventReader};
use crate::writer::{Escape, IndentWriter};
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

/// A node of a [`ReplacementTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(ElementNode),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    /// Text, or an element without any children.
    pub fn is_leaf(&self) -> bool {
        match self {
            Node::Element(element) => element.children.is_empty(),
            Node::Text(_) => true,
        }
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Node>) {
        if self.is_leaf() {
            leaves.push(self);
        } else if let Node::Element(element) = self {
            for child in &element.children {
                child.collect_leaves(leaves);
            }
        }
    }

    fn collect_events(&self, events: &mut Vec<Event>) {
        match self {
            Node::Element(element) => {
                events.push(Event::start(
                    element.name.clone(),
                    element.attributes.clone(),
                ));
                for child in &element.children {
                    child.collect_events(events);
                }
                events.push(Event::end(element.name.clone()));
            }
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    events.push(Event::text(text));
                }
            }
        }
    }
}

/// An element, exclusively owning its ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl ElementNode {
    pub fn new<S: Into<String>>(name: S) -> ElementNode {
        ElementNode {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> ElementNode {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn child(mut self, element: ElementNode) -> ElementNode {
        self.children.push(Node::Element(element));
        self
    }

    pub fn text<S: Into<String>>(mut self, text: S) -> ElementNode {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn has_element_children(&self) -> bool {
        self.children
            .iter()
            .any(|node| matches!(node, Node::Element(_)))
    }
}

/// Small document that is loaded whole, flattened, and spliced into the stream.
///
/// # Examples
/// ```
/// use xml_splice::ReplacementTree;
/// use std::str::FromStr;
///
/// let mut tree = ReplacementTree::from_str(r#"<country>
///     <region><city>Barcelona</city></region>
/// </country>"#).unwrap();
/// tree.normalize();
/// let city = tree.root().children()[0].as_element().unwrap();
/// assert_eq!(city.name(), "city");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementTree {
    root: ElementNode,
}

impl ReplacementTree {
    pub fn new(root: ElementNode) -> ReplacementTree {
        ReplacementTree { root }
    }

    /// Parses the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`]: The file can't be read.
    /// - [`Error::CannotDecode`]: Could not decode XML.
    /// - [`Error::MalformedXML`], [`Error::Unbalanced`]: The document isn't well-formed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ReplacementTree> {
        let path = path.as_ref();
        let tree = ReplacementTree::from_events(EventReader::from_file(path)?)?;
        tracing::info!(
            path = %path.display(),
            root = tree.root.name(),
            "loaded replacement document"
        );
        Ok(tree)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<ReplacementTree> {
        ReplacementTree::from_events(EventReader::from_reader(reader)?)
    }

    /// Builds the tree from a complete, balanced event sequence.
    /// Whitespace-only text is dropped.
    pub fn from_events<I>(events: I) -> Result<ReplacementTree>
    where
        I: IntoIterator<Item = Result<Event>>,
    {
        let mut stack: Vec<ElementNode> = Vec::new();
        let mut root: Option<ElementNode> = None;
        for event in events {
            match event? {
                Event::Start { name, attributes } => {
                    if root.is_some() {
                        return Err(Error::MalformedXML(format!(
                            "Second root element <{}>",
                            name
                        )));
                    }
                    stack.push(ElementNode {
                        name,
                        attributes,
                        children: Vec::new(),
                    });
                }
                Event::End { name } => {
                    let element = stack.pop().ok_or_else(|| {
                        Error::Unbalanced(format!("Closing tag {} has no opening tag", name))
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text { content } => {
                    if content.trim().is_empty() {
                        continue;
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(content)),
                        None => {
                            return Err(Error::MalformedXML(
                                "Text outside of the root element".to_string(),
                            ))
                        }
                    }
                }
            }
        }
        if let Some(open) = stack.last() {
            return Err(Error::Unbalanced(format!(
                "Document ended with <{}> open",
                open.name
            )));
        }
        root.map(ReplacementTree::new)
            .ok_or_else(|| Error::MalformedXML("Document has no root element".to_string()))
    }

    pub fn root(&self) -> &ElementNode {
        &self.root
    }

    /// Removes every wrapper: an element below the root with at least one element child.
    /// The wrapper's children take its place in its parent, in order.
    ///
    /// Children are flattened before their parent is looked at, so afterwards
    /// every child of the root is text or an element holding only text.
    /// Returns the number of removed wrappers.
    pub fn normalize(&mut self) -> usize {
        let mut unwrapped = 0;
        let children = std::mem::take(&mut self.root.children);
        self.root.children = flatten(children, &mut unwrapped);
        tracing::debug!(unwrapped, root = self.root.name(), "normalized replacement");
        unwrapped
    }

    pub fn normalized(mut self) -> ReplacementTree {
        self.normalize();
        self
    }

    /// Text nodes and childless elements below the root, in document order.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut leaves = Vec::new();
        for child in &self.root.children {
            child.collect_leaves(&mut leaves);
        }
        leaves
    }

    /// The root's children (not the root itself) as events, in document order.
    /// Text is trimmed, and whitespace-only text is left out.
    pub fn events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for child in &self.root.children {
            child.collect_events(&mut events);
        }
        events
    }

    /// Writes the root's children at the writer's current depth, escaping
    /// quotes and apostrophes in attribute values too.
    pub fn write_children<W: Write>(&self, writer: &mut IndentWriter<W>) -> Result<()> {
        for event in self.events() {
            writer.write_event(&event, Escape::Full)?;
        }
        Ok(())
    }
}

fn flatten(children: Vec<Node>, unwrapped: &mut usize) -> Vec<Node> {
    let mut flat = Vec::with_capacity(children.len());
    for node in children {
        match node {
            Node::Element(mut element) => {
                let grandchildren = std::mem::take(&mut element.children);
                element.children = flatten(grandchildren, unwrapped);
                if element.has_element_children() {
                    *unwrapped += 1;
                    flat.append(&mut element.children);
                } else {
                    flat.push(Node::Element(element));
                }
            }
            text => flat.push(text),
        }
    }
    flat
}

impl FromStr for ReplacementTree {
    type Err = Error;

    fn from_str(s: &str) -> Result<ReplacementTree> {
        ReplacementTree::from_events(EventReader::from_str(s))
    }
}
