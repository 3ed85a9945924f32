use crate::inline::coalesce_runs;
use crate::model::{Attrs, Document, Marks, Node, OpaqueNode, TextNode};
use crate::registry::{NodeType, PluginRegistry};
use crate::schema::AttrSpec;

use super::parser::{MarkupElement, MarkupNode, parse};
use super::{DecodeError, DecodeWarning};

/// Table sections carry no meaning in the document tree.
const TRANSPARENT_TAGS: &[&str] = &["thead", "tbody", "tfoot"];

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub document: Document,
    pub warnings: Vec<DecodeWarning>,
}

pub fn decode(input: &str, registry: &PluginRegistry) -> Result<Document, DecodeError> {
    decode_with_report(input, registry).map(|decoded| decoded.document)
}

/// Decodes `input` and reports every recoverable loss along the way. Either
/// the whole document decodes or an error is returned.
pub fn decode_with_report(input: &str, registry: &PluginRegistry) -> Result<Decoded, DecodeError> {
    let tree = parse(input)?;
    let mut decoder = Decoder {
        input,
        registry,
        warnings: Vec::new(),
    };

    let mut children = decoder.blocks(&tree);
    if children.is_empty() {
        children = Document::empty().children;
    }
    let document = Document { children };
    registry.validate_document(&document)?;

    Ok(Decoded {
        document,
        warnings: decoder.warnings,
    })
}

struct Decoder<'a> {
    input: &'a str,
    registry: &'a PluginRegistry,
    warnings: Vec<DecodeWarning>,
}

impl Decoder<'_> {
    fn blocks(&mut self, nodes: &[MarkupNode]) -> Vec<Node> {
        let registry = self.registry;
        let mut out = Vec::new();
        let mut stray: Vec<&MarkupNode> = Vec::new();

        for node in nodes {
            let el = match node {
                MarkupNode::Text(_) => {
                    stray.push(node);
                    continue;
                }
                MarkupNode::Element(el) => el,
            };

            if TRANSPARENT_TAGS.contains(&el.tag.as_str()) {
                self.flush_stray(&mut stray, &mut out);
                out.extend(self.blocks(&el.children));
                continue;
            }

            if let Some(node_type) = registry.resolve_markup(&el.tag, el.attr("data-type")) {
                self.flush_stray(&mut stray, &mut out);
                out.push(self.typed(el, node_type));
                continue;
            }

            if el.tag == "br" || self.mark_for(el).is_some() {
                stray.push(node);
                continue;
            }

            self.flush_stray(&mut stray, &mut out);
            out.push(self.opaque(el));
        }

        self.flush_stray(&mut stray, &mut out);
        out
    }

    /// Wraps inline material found among blocks into a paragraph.
    fn flush_stray(&mut self, stray: &mut Vec<&MarkupNode>, out: &mut Vec<Node>) {
        let only_whitespace = stray
            .iter()
            .all(|node| matches!(node, MarkupNode::Text(t) if t.trim().is_empty()));
        if !only_whitespace {
            let mut runs = Vec::new();
            for node in stray.iter() {
                self.inline(node, &Marks::new(), false, &mut runs);
            }
            out.push(Node::element("paragraph", Attrs::new(), coalesce_runs(runs)));
        }
        stray.clear();
    }

    fn typed(&mut self, el: &MarkupElement, node_type: &NodeType) -> Node {
        let attrs = self.attrs(&node_type.name, &node_type.attrs, el);
        if node_type.atomic {
            return Node::void(node_type.name.clone(), attrs);
        }

        let children = match &node_type.markup.inner_wrapper {
            Some(wrapper) => unwrap_inner(el, wrapper),
            None => &el.children,
        };

        let registry = self.registry;
        let rule = registry.content_rule(&node_type.name);
        let decoded = match rule {
            Some(rule) if rule.is_inline() => {
                let mut runs = Vec::new();
                for child in children {
                    self.inline(child, &Marks::new(), node_type.markup.preserve_newlines, &mut runs);
                }
                coalesce_runs(runs)
            }
            Some(rule) if rule.is_leaf() => Vec::new(),
            _ => self.blocks(children),
        };

        // Unknown children can break a narrow rule (`list_item+`); the whole
        // container then stays opaque so the rest of the document loads.
        if let Some(rule) = rule {
            if decoded.iter().any(|child| matches!(child, Node::Opaque(_))) {
                if let Err(err) = rule.check(&node_type.name, &decoded, registry) {
                    tracing::warn!(
                        kind = %node_type.name,
                        %err,
                        "container with unknown content kept as an opaque placeholder"
                    );
                    self.warnings.push(DecodeWarning::UnfitContent {
                        kind: node_type.name.clone(),
                        reason: err.to_string(),
                    });
                    return self.placeholder(el);
                }
            }
        }

        Node::element(node_type.name.clone(), attrs, decoded)
    }

    fn inline(&mut self, node: &MarkupNode, marks: &Marks, preserve_newlines: bool, out: &mut Vec<Node>) {
        let el = match node {
            MarkupNode::Text(text) => {
                out.push(Node::Text(TextNode::marked(text.clone(), marks.clone())));
                return;
            }
            MarkupNode::Element(el) => el,
        };

        if el.tag == "br" {
            out.push(Node::Text(TextNode::marked("\n", marks.clone())));
            return;
        }

        let inner = match self.mark_for(el) {
            Some((name, specs)) => {
                let attrs = self.attrs(&name, &specs, el);
                marks.clone().with(name, attrs)
            }
            None => {
                tracing::warn!(tag = %el.tag, "unknown inline element unwrapped");
                self.warnings.push(DecodeWarning::UnknownInline {
                    tag: el.tag.clone(),
                });
                marks.clone()
            }
        };

        for child in &el.children {
            self.inline(child, &inner, preserve_newlines, out);
        }
    }

    fn mark_for(&self, el: &MarkupElement) -> Option<(String, Vec<AttrSpec>)> {
        self.registry
            .resolve_mark_markup(&el.tag, el.attr("data-mark"))
            .map(|mark| (mark.name.clone(), mark.attrs.clone()))
    }

    fn attrs(&mut self, kind: &str, specs: &[AttrSpec], el: &MarkupElement) -> Attrs {
        let mut attrs = Attrs::new();
        for spec in specs {
            let outcome = spec.deserialize(el);
            if let Some(raw) = outcome.malformed {
                tracing::warn!(
                    kind,
                    attr = %spec.name,
                    raw = %raw,
                    "malformed attribute replaced by its default"
                );
                self.warnings.push(DecodeWarning::MalformedAttr {
                    kind: kind.to_string(),
                    attr: spec.name.clone(),
                    raw,
                });
            }
            attrs.insert(spec.name.clone(), outcome.value);
        }
        attrs
    }

    fn opaque(&mut self, el: &MarkupElement) -> Node {
        let data_type = el.attr("data-type").map(str::to_string);
        tracing::warn!(
            tag = %el.tag,
            data_type = ?data_type,
            "unknown block kept as an opaque placeholder"
        );
        self.warnings.push(DecodeWarning::UnknownBlock {
            tag: el.tag.clone(),
            data_type,
        });
        self.placeholder(el)
    }

    /// `el` verbatim, as written in the input.
    fn placeholder(&self, el: &MarkupElement) -> Node {
        Node::Opaque(OpaqueNode {
            tag: el.tag.clone(),
            data_type: el.attr("data-type").map(str::to_string),
            markup: self.input[el.span.clone()].to_string(),
        })
    }
}

/// Children of the single `wrapper` element inside `el`, or `el`'s own
/// children when it has no such wrapper.
fn unwrap_inner<'a>(el: &'a MarkupElement, wrapper: &str) -> &'a [MarkupNode] {
    let mut elements = el.children.iter().filter(|child| match child {
        MarkupNode::Text(t) => !t.trim().is_empty(),
        MarkupNode::Element(_) => true,
    });
    match (elements.next(), elements.next()) {
        (Some(MarkupNode::Element(inner)), None) if inner.tag == wrapper => &inner.children,
        _ => &el.children,
    }
}
