use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Attrs = BTreeMap<String, Value>;
pub type ElementKind = String;
pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    /// A document holding a single empty paragraph.
    pub fn empty() -> Self {
        Self {
            children: vec![Node::paragraph("")],
        }
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_at_path(self, path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
    Opaque(OpaqueNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Element(ElementNode {
            kind: "paragraph".to_string(),
            attrs: Attrs::default(),
            children: vec![Node::text(text)],
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode::new(text))
    }

    pub fn element(kind: impl Into<String>, attrs: Attrs, children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind: kind.into(),
            attrs,
            children,
        })
    }

    pub fn void(kind: impl Into<String>, attrs: Attrs) -> Self {
        Node::Void(VoidNode {
            kind: kind.into(),
            attrs,
        })
    }

    pub fn divider() -> Self {
        Node::void("divider", Attrs::default())
    }

    /// The registered type name, `"text"` for text runs and `"opaque"` for
    /// unknown-block placeholders.
    pub fn kind(&self) -> &str {
        match self {
            Node::Element(el) => &el.kind,
            Node::Void(v) => &v.kind,
            Node::Text(_) => "text",
            Node::Opaque(_) => "opaque",
        }
    }

    pub fn attrs(&self) -> Option<&Attrs> {
        match self {
            Node::Element(el) => Some(&el.attrs),
            Node::Void(v) => Some(&v.attrs),
            Node::Text(_) | Node::Opaque(_) => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(el) => &el.children,
            Node::Text(_) | Node::Void(_) | Node::Opaque(_) => &[],
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Concatenated text of every run below this node.
    pub fn text_content(&self) -> String {
        fn walk(node: &Node, out: &mut String) {
            match node {
                Node::Text(t) => out.push_str(&t.text),
                Node::Element(el) => el.children.iter().for_each(|child| walk(child, out)),
                Node::Void(_) | Node::Opaque(_) => {}
            }
        }

        let mut out = String::new();
        walk(self, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
}

/// Stand-in for a block whose type this build does not know. The original
/// markup is kept verbatim and emitted unchanged on encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub markup: String,
}

impl OpaqueNode {
    pub fn label(&self) -> &str {
        self.data_type.as_deref().unwrap_or(&self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }
}

/// The set of marks carried by a text run, keyed by mark name. Adding a mark
/// that is already present replaces its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Marks(BTreeMap<String, Attrs>);

impl Marks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, attrs: Attrs) -> Self {
        self.add(name, attrs);
        self
    }

    pub fn add(&mut self, name: impl Into<String>, attrs: Attrs) {
        self.0.insert(name.into(), attrs);
    }

    pub fn remove(&mut self, name: &str) -> Option<Attrs> {
        self.0.remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Attrs> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attrs)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError(pub String);

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn node_at_path<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = doc.children.get(*first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Void(_) | Node::Text(_) | Node::Opaque(_) => return None,
        };
    }
    Some(node)
}

/// Children of the node at `parent_path`; the empty path yields the
/// document's top-level blocks.
pub fn children_at<'a>(doc: &'a Document, parent_path: &[usize]) -> Option<&'a [Node]> {
    if parent_path.is_empty() {
        return Some(&doc.children);
    }
    match node_at_path(doc, parent_path)? {
        Node::Element(el) => Some(&el.children),
        Node::Void(_) | Node::Text(_) | Node::Opaque(_) => None,
    }
}

pub(crate) fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    let mut children = &mut doc.children;
    for (depth, &ix) in parent_path.iter().enumerate() {
        let len = children.len();
        let node = children.get_mut(ix).ok_or_else(|| {
            PathError(format!("Path out of bounds at depth {depth}: {ix} >= {len}"))
        })?;
        children = match node {
            Node::Element(el) => &mut el.children,
            Node::Void(_) | Node::Text(_) | Node::Opaque(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }
    Ok(children)
}

pub(crate) fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((ix, parent_path)) = path.split_last() else {
        return Err(PathError("Empty path".into()));
    };
    let children = children_mut(doc, parent_path)?;
    let len = children.len();
    children
        .get_mut(*ix)
        .ok_or_else(|| PathError(format!("Path out of bounds: {ix} >= {len}")))
}

pub(crate) fn node_text_mut<'a>(
    doc: &'a mut Document,
    path: &[usize],
) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

pub(crate) fn element_mut<'a>(
    doc: &'a mut Document,
    path: &[usize],
) -> Result<&'a mut ElementNode, PathError> {
    match node_mut(doc, path)? {
        Node::Element(el) => Ok(el),
        _ => Err(PathError("Expected Element node".into())),
    }
}

/// Path of the closest element at or above `path` whose kind is `kind`.
pub fn ancestor_element_path(doc: &Document, path: &[usize], kind: &str) -> Option<Path> {
    (1..=path.len()).rev().find_map(|len| {
        let candidate = &path[..len];
        match node_at_path(doc, candidate) {
            Some(Node::Element(el)) if el.kind == kind => Some(candidate.to_vec()),
            _ => None,
        }
    })
}
