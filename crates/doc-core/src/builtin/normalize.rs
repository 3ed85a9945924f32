use crate::inline::is_text_block;
use crate::model::{Attrs, Document, Node, Path};
use crate::ops::{AttrPatch, Op};
use crate::registry::{EditorPlugin, NormalizePass, PluginRegistry};

use super::child_path;

pub(crate) struct CoreNormalizePlugin;

impl EditorPlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(FillDefaultAttrs),
            Box::new(EnsureTextBlocksHaveTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

/// Calls `visit` for every element and atomic node, depth first.
fn walk_nodes(doc: &Document, mut visit: impl FnMut(&Path, &Node)) {
    fn walk(nodes: &[Node], path: &mut Path, visit: &mut dyn FnMut(&Path, &Node)) {
        for (ix, node) in nodes.iter().enumerate() {
            path.push(ix);
            visit(path, node);
            if let Node::Element(el) = node {
                walk(&el.children, path, visit);
            }
            path.pop();
        }
    }

    walk(&doc.children, &mut Vec::new(), &mut visit);
}

/// Attributes a node type declares are always present.
struct FillDefaultAttrs;

impl NormalizePass for FillDefaultAttrs {
    fn id(&self) -> &'static str {
        "core.fill_default_attrs"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_nodes(doc, |path, node| {
            let Some(attrs) = node.attrs() else {
                return;
            };
            let Some(node_type) = registry.get(node.kind()) else {
                return;
            };
            let missing: Attrs = node_type
                .attrs
                .iter()
                .filter(|spec| !attrs.contains_key(&spec.name))
                .map(|spec| (spec.name.clone(), spec.default.clone()))
                .collect();
            if !missing.is_empty() {
                ops.push(Op::SetNodeAttrs {
                    path: path.clone(),
                    patch: AttrPatch::set(missing),
                });
            }
        });
        ops
    }
}

struct EnsureTextBlocksHaveTextLeaf;

impl NormalizePass for EnsureTextBlocksHaveTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_nodes(doc, |path, node| {
            let Node::Element(el) = node else {
                return;
            };
            if is_text_block(el, registry) && !el.children.iter().any(|n| matches!(n, Node::Text(_)))
            {
                ops.push(Op::InsertNode {
                    path: child_path(path, 0),
                    node: Node::text(""),
                });
            }
        });
        ops
    }
}

/// Adjacent runs with equal marks become one run and empty runs disappear,
/// leaving a single unmarked empty run in an otherwise empty block.
struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_nodes(doc, |path, node| {
            let Node::Element(el) = node else {
                return;
            };
            if !is_text_block(el, registry) {
                return;
            }

            if let [Node::Text(only)] = el.children.as_slice() {
                if only.text.is_empty() && !only.marks.is_empty() {
                    ops.push(Op::ReplaceInlines {
                        path: path.clone(),
                        children: vec![Node::text("")],
                    });
                }
                return;
            }

            for ix in (1..el.children.len()).rev() {
                let Node::Text(run) = &el.children[ix] else {
                    continue;
                };
                if run.text.is_empty() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, ix),
                    });
                    continue;
                }
                // An empty neighbour is removed first; merging into it would
                // lose the merged text.
                if let Node::Text(prev) = &el.children[ix - 1]
                    && prev.marks == run.marks
                    && !prev.text.is_empty()
                {
                    ops.push(Op::MergeNode {
                        path: child_path(path, ix),
                        position: prev.text.len(),
                        attrs: Attrs::new(),
                    });
                }
            }

            let first_is_empty = matches!(el.children.first(), Some(Node::Text(t)) if t.text.is_empty());
            let has_other_text = el
                .children
                .iter()
                .skip(1)
                .any(|n| matches!(n, Node::Text(t) if !t.text.is_empty()));
            if first_is_empty && has_other_text {
                ops.push(Op::RemoveNode {
                    path: child_path(path, 0),
                });
            }
        });
        ops
    }
}
