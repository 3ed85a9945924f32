use serde_json::Value;

use crate::editor::Editor;
use crate::model::{Attrs, Document, Node, Path, ancestor_element_path};
use crate::ops::{Op, TxBuilder};
use crate::registry::{
    CommandError, CommandSpec, EditorPlugin, NodeType, NormalizePass, PlainTextRule,
    PluginRegistry, QuerySpec,
};
use crate::schema::AttrSpec;

use super::{
    child_path, focus_block_path, relocate_selection, selected_sibling_range, wrap_siblings,
};

const BULLETED: &str = "bulleted_list";
const ORDERED: &str = "ordered_list";

pub(crate) struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "block.list"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block(BULLETED, "list_item+")
                .tag("ul")
                .plain_text(PlainTextRule::BulletedList),
            NodeType::block(ORDERED, "list_item+")
                .tag("ol")
                .attr(AttrSpec::integer("start", 1, 0, 999_999).html("start"))
                .plain_text(PlainTextRule::OrderedList),
            NodeType::element("list_item", "paragraph block*")
                .tag("li")
                .plain_text(PlainTextRule::ListItem),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(MergeAdjacentLists)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle_bulleted", "Bulleted list", |editor, _args| {
                toggle_list(editor, BULLETED)
            })
            .keywords(["list", "bullet", "ul", "unordered"]),
            CommandSpec::new("list.toggle_ordered", "Numbered list", |editor, _args| {
                toggle_list(editor, ORDERED)
            })
            .keywords(["list", "numbered", "ol", "ordered"]),
            CommandSpec::new("list.unwrap", "Lift out of list", |editor, _args| {
                unwrap_list_item(editor)
            })
            .description("Move the current list item's content out of the list."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("list.active_type", |editor, _args| {
            let kind = focus_block_path(editor)
                .and_then(|path| nearest_list(editor.doc(), &path))
                .and_then(|path| editor.doc().node(&path).map(|n| n.kind().to_string()));
            Ok(match kind.as_deref() {
                Some(BULLETED) => Value::from("bulleted"),
                Some(ORDERED) => Value::from("ordered"),
                _ => Value::Null,
            })
        })]
    }
}

fn nearest_list(doc: &Document, path: &[usize]) -> Option<Path> {
    let bulleted = ancestor_element_path(doc, path, BULLETED);
    let ordered = ancestor_element_path(doc, path, ORDERED);
    match (bulleted, ordered) {
        (Some(a), Some(b)) => Some(if a.len() > b.len() { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn toggle_list(editor: &mut Editor, kind: &'static str) -> Result<(), CommandError> {
    let source = format!("command:list.toggle_{}", kind.trim_end_matches("_list"));
    let block = focus_block_path(editor)
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a block"))?;

    if let Some(list_path) = nearest_list(editor.doc(), &block) {
        let Some(Node::Element(list)) = editor.doc().node(&list_path).cloned() else {
            return Err(CommandError::not_applicable("The caret is not in a list"));
        };
        if list.kind == kind {
            return unwrap_list_item(editor);
        }

        let registry = editor.shared_registry();
        let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
        tx.push(Op::RemoveNode {
            path: list_path.clone(),
        })?;
        tx.push(Op::InsertNode {
            path: list_path,
            node: Node::element(kind, Attrs::new(), list.children),
        })?;
        let tx = tx.finish_with(editor.selection().clone());
        editor.apply(tx.source(source))?;
        return Ok(());
    }

    let (parent, first, last) = selected_sibling_range(editor)
        .ok_or_else(|| CommandError::not_applicable("Nothing to turn into a list"))?;
    wrap_siblings(
        editor,
        &parent,
        (first, last),
        (kind, Attrs::new()),
        |node| {
            let node = match node {
                Node::Element(el) if el.kind == "heading" => {
                    Node::element("paragraph", Attrs::new(), el.children)
                }
                other => other,
            };
            Node::element("list_item", Attrs::new(), vec![node])
        },
        &[0],
        &source,
    )
}

/// Lifts the item under the caret out of its list. Items before and after
/// it stay in lists of their own.
fn unwrap_list_item(editor: &mut Editor) -> Result<(), CommandError> {
    let doc = editor.doc();
    let item_path = focus_block_path(editor)
        .and_then(|block| ancestor_element_path(doc, &block, "list_item"))
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a list"))?;
    let Some((&item_ix, list_path)) = item_path.split_last() else {
        return Err(CommandError::not_applicable("The caret is not in a list"));
    };
    let Some(Node::Element(list)) = doc.node(list_path) else {
        return Err(CommandError::not_applicable("The caret is not in a list"));
    };
    let Some((&list_ix, parent)) = list_path.split_last() else {
        return Err(CommandError::not_applicable("The caret is not in a list"));
    };
    let item_count = list.children.len();
    let list_attrs = list.attrs.clone();
    let item_children = list.children[item_ix].children().to_vec();

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(doc, editor.selection(), &registry);
    if item_ix + 1 < item_count {
        tx.push(Op::SplitNode {
            path: list_path.to_vec(),
            position: item_ix + 1,
            attrs: list_attrs.clone(),
        })?;
    }
    let lone_ix = if item_ix > 0 {
        tx.push(Op::SplitNode {
            path: list_path.to_vec(),
            position: item_ix,
            attrs: list_attrs,
        })?;
        list_ix + 1
    } else {
        list_ix
    };
    tx.push(Op::RemoveNode {
        path: child_path(parent, lone_ix),
    })?;
    for (offset, child) in item_children.into_iter().enumerate() {
        tx.push(Op::InsertNode {
            path: child_path(parent, lone_ix + offset),
            node: child,
        })?;
    }

    let selection = relocate_selection(editor.selection(), tx.selection(), |path| {
        if path.len() <= item_path.len() || !path.starts_with(&item_path) {
            return None;
        }
        let mut out = child_path(parent, lone_ix + path[item_path.len()]);
        out.extend_from_slice(&path[item_path.len() + 1..]);
        Some(out)
    });
    let tx = tx.finish_with(selection).source("command:list.unwrap");
    editor.apply(tx)?;
    Ok(())
}

/// Lists of one kind that end up next to each other become one list.
struct MergeAdjacentLists;

impl NormalizePass for MergeAdjacentLists {
    fn id(&self) -> &'static str {
        "list.merge_adjacent"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Path, out: &mut Vec<Op>) {
            // Deeper merges first: they never move this level's paths.
            for (ix, child) in children.iter().enumerate() {
                if let Node::Element(el) = child {
                    path.push(ix);
                    walk(&el.children, path, out);
                    path.pop();
                }
            }
            for ix in (1..children.len()).rev() {
                if let (Node::Element(prev), Node::Element(next)) = (&children[ix - 1], &children[ix])
                    && prev.kind == next.kind
                    && (next.kind == BULLETED || next.kind == ORDERED)
                {
                    out.push(Op::MergeNode {
                        path: child_path(path, ix),
                        position: prev.children.len(),
                        attrs: next.attrs.clone(),
                    });
                }
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}
