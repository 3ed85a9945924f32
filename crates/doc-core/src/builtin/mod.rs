//! Built-in node types, marks, normalization and commands. Everything here
//! goes through the same plugin protocol extension crates use.

mod blocks;
mod image;
mod list;
mod marks;
mod normalize;
mod table;
mod text;

use crate::editor::{ApplyError, Editor};
use crate::inline::{is_text_block, point_global_offset};
use crate::model::{Attrs, Document, ElementNode, Node, Path, children_at};
use crate::ops::{Op, Transaction, TxBuilder};
use crate::registry::{CommandError, EditorPlugin, PluginRegistry};
use crate::selection::{Point, Selection, first_point_in};

pub use image::insert_uploaded_image;

/// Paragraphs, dividers, normalization and text editing.
pub fn core_plugins() -> Vec<Box<dyn EditorPlugin>> {
    vec![
        Box::new(text::CoreSchemaPlugin),
        Box::new(normalize::CoreNormalizePlugin),
        Box::new(text::CoreCommandsPlugin),
    ]
}

/// The core set plus every built-in block type and mark.
pub fn richtext_plugins() -> Vec<Box<dyn EditorPlugin>> {
    let mut plugins = core_plugins();
    plugins.extend([
        Box::new(marks::MarksPlugin) as Box<dyn EditorPlugin>,
        Box::new(blocks::HeadingPlugin),
        Box::new(blocks::BlockquotePlugin),
        Box::new(blocks::CodeBlockPlugin),
        Box::new(list::ListPlugin),
        Box::new(table::TablePlugin),
        Box::new(image::ImagePlugin),
    ]);
    plugins
}

pub(crate) fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

/// Path of the block a point sits in: the parent of a text run, or the
/// atomic node itself.
pub fn block_path_of(doc: &Document, point: &Point) -> Option<Path> {
    match doc.node(&point.path)? {
        Node::Text(_) => Some(point.block_path().to_vec()),
        Node::Void(_) | Node::Opaque(_) => Some(point.path.clone()),
        Node::Element(_) => None,
    }
}

pub fn focus_block_path(editor: &Editor) -> Option<Path> {
    block_path_of(editor.doc(), &editor.selection().focus)
}

/// The text block holding `point`, with the point's offset into the block's
/// whole text.
pub(crate) fn text_block_of<'a>(
    doc: &'a Document,
    registry: &PluginRegistry,
    point: &Point,
) -> Option<(Path, &'a ElementNode, usize)> {
    if !matches!(doc.node(&point.path)?, Node::Text(_)) {
        return None;
    }
    let block_path = point.block_path().to_vec();
    let Some(Node::Element(el)) = doc.node(&block_path) else {
        return None;
    };
    if !is_text_block(el, registry) {
        return None;
    }
    let global = point_global_offset(&el.children, point.inline_index(), point.offset);
    Some((block_path, el, global))
}

pub(crate) fn is_empty_paragraph(node: &Node) -> bool {
    match node {
        Node::Element(el) => {
            el.kind == "paragraph"
                && el
                    .children
                    .iter()
                    .all(|child| matches!(child, Node::Text(t) if t.text.is_empty()))
        }
        _ => false,
    }
}

/// Every text block and atomic node in document order.
pub(crate) fn leaf_blocks(doc: &Document, registry: &PluginRegistry) -> Vec<Path> {
    fn walk(nodes: &[Node], path: &mut Path, registry: &PluginRegistry, out: &mut Vec<Path>) {
        for (ix, node) in nodes.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Element(el) if is_text_block(el, registry) => out.push(path.clone()),
                Node::Element(el) => walk(&el.children, path, registry, out),
                Node::Void(_) | Node::Opaque(_) => out.push(path.clone()),
                Node::Text(_) => {}
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), registry, &mut out);
    out
}

/// Leaf blocks touched by the selection, in document order.
pub(crate) fn selected_leaf_blocks(editor: &Editor) -> Vec<Path> {
    let doc = editor.doc();
    let (start, end) = editor.selection().ordered();
    let (Some(first), Some(last)) = (block_path_of(doc, &start), block_path_of(doc, &end)) else {
        return Vec::new();
    };
    leaf_blocks(doc, editor.registry())
        .into_iter()
        .filter(|path| *path >= first && *path <= last)
        .collect()
}

/// The sibling range covering the selection: the parent path and the first
/// and last child index under it.
pub(crate) fn selected_sibling_range(editor: &Editor) -> Option<(Path, usize, usize)> {
    let doc = editor.doc();
    let (start, end) = editor.selection().ordered();
    let first = block_path_of(doc, &start)?;
    let last = block_path_of(doc, &end)?;
    let common = first.iter().zip(&last).take_while(|(a, b)| a == b).count();
    let depth = common.min(first.len() - 1).min(last.len() - 1);
    Some((first[..depth].to_vec(), first[depth], last[depth]))
}

/// Selection after a restructuring. Points `relocate` claims move to the
/// path it returns and keep their offset; the rest keep the builder's
/// remapping.
pub(crate) fn relocate_selection(
    before: &Selection,
    remapped: &Selection,
    relocate: impl Fn(&[usize]) -> Option<Path>,
) -> Selection {
    let pick = |orig: &Point, fallback: &Point| match relocate(&orig.path) {
        Some(path) => Point::new(path, orig.offset),
        None => fallback.clone(),
    };
    Selection::new(
        pick(&before.anchor, &remapped.anchor),
        pick(&before.focus, &remapped.focus),
    )
}

/// Replaces the children `first..=last` of `parent` with one `wrapper`
/// holding them, each passed through `wrap_child`. `inner` is the extra path
/// `wrap_child` puts between the wrapper slot and the original child.
pub(crate) fn wrap_siblings(
    editor: &mut Editor,
    parent: &[usize],
    range: (usize, usize),
    wrapper: (&str, Attrs),
    wrap_child: impl Fn(Node) -> Node,
    inner: &[usize],
    source: &str,
) -> Result<(), CommandError> {
    let (first, last) = range;
    let Some(siblings) = children_at(editor.doc(), parent) else {
        return Err(CommandError::not_applicable("Nothing to wrap"));
    };
    let moved: Vec<Node> = siblings
        .get(first..=last)
        .ok_or_else(|| CommandError::not_applicable("Nothing to wrap"))?
        .iter()
        .cloned()
        .map(wrap_child)
        .collect();

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    for ix in (first..=last).rev() {
        tx.push(Op::RemoveNode {
            path: child_path(parent, ix),
        })?;
    }
    tx.push(Op::InsertNode {
        path: child_path(parent, first),
        node: Node::element(wrapper.0, wrapper.1, moved),
    })?;

    let depth = parent.len();
    let selection = relocate_selection(editor.selection(), tx.selection(), |path| {
        let ix = *path.get(depth)?;
        if !path.starts_with(parent) || ix < first || ix > last {
            return None;
        }
        let mut out = child_path(parent, first);
        out.push(ix - first);
        out.extend_from_slice(inner);
        out.extend_from_slice(&path[depth + 1..]);
        Some(out)
    });
    editor.apply(tx.finish_with(selection).source(source))?;
    Ok(())
}

/// Replaces the container at `container` with its own children.
pub(crate) fn unwrap_container(
    editor: &mut Editor,
    container: &[usize],
    source: &str,
) -> Result<(), CommandError> {
    let Some(Node::Element(el)) = editor.doc().node(container).cloned() else {
        return Err(CommandError::not_applicable("Nothing to unwrap"));
    };
    let Some((&ix, parent)) = container.split_last() else {
        return Err(CommandError::not_applicable("Nothing to unwrap"));
    };

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    tx.push(Op::RemoveNode {
        path: container.to_vec(),
    })?;
    for (offset, child) in el.children.into_iter().enumerate() {
        tx.push(Op::InsertNode {
            path: child_path(parent, ix + offset),
            node: child,
        })?;
    }

    let selection = relocate_selection(editor.selection(), tx.selection(), |path| {
        if path.len() <= container.len() || !path.starts_with(container) {
            return None;
        }
        let mut out = child_path(parent, ix + path[container.len()]);
        out.extend_from_slice(&path[container.len() + 1..]);
        Some(out)
    });
    editor.apply(tx.finish_with(selection).source(source))?;
    Ok(())
}

/// Closest ancestor of `path` whose content rule accepts `node` as a child.
fn insertion_anchor(doc: &Document, registry: &PluginRegistry, block: &[usize], node: &Node) -> Path {
    let kind = node.kind();
    let group = registry.get(kind).and_then(|t| t.group.as_deref());
    let mut anchor = block.to_vec();
    while anchor.len() > 1 {
        let parent = &anchor[..anchor.len() - 1];
        let accepts = match doc.node(parent) {
            Some(Node::Element(el)) => registry
                .content_rule(&el.kind)
                .is_some_and(|rule| rule.mentions(kind, group)),
            _ => false,
        };
        if accepts {
            break;
        }
        anchor.pop();
    }
    anchor
}

fn build_insert(
    editor: &Editor,
    anchor: &[usize],
    node: Node,
    replace: bool,
) -> Result<Transaction, ApplyError> {
    let Some((&anchor_ix, parent)) = anchor.split_last() else {
        return Err(ApplyError::InvalidPath("Empty insertion anchor".into()));
    };
    let target = if replace {
        anchor.to_vec()
    } else {
        child_path(parent, anchor_ix + 1)
    };
    let target_ix = target.last().copied().unwrap_or_default();
    let atomic = matches!(node, Node::Void(_));

    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), editor.registry());
    if replace {
        tx.push(Op::RemoveNode {
            path: anchor.to_vec(),
        })?;
    }
    tx.push(Op::InsertNode {
        path: target.clone(),
        node,
    })?;

    let caret = if atomic {
        let next = child_path(parent, target_ix + 1);
        if tx.doc().node(&next).is_none() {
            tx.push(Op::InsertNode {
                path: next.clone(),
                node: Node::paragraph(""),
            })?;
        }
        first_point_in(tx.doc(), &next)
    } else {
        first_point_in(tx.doc(), &target)
    };

    Ok(match caret {
        Some(point) => tx.finish_with(Selection::collapsed(point)),
        None => tx.finish(),
    })
}

/// Inserts `node` at the caret: it replaces the active block when that is an
/// empty paragraph and goes after it otherwise. Atomic nodes get a trailing
/// paragraph when nothing follows them.
pub fn insert_block(editor: &mut Editor, node: Node, source: &str) -> Result<(), CommandError> {
    let doc = editor.doc();
    let block = focus_block_path(editor)
        .unwrap_or_else(|| vec![doc.children.len().saturating_sub(1)]);
    let anchor = insertion_anchor(doc, editor.registry(), &block, &node);
    let replace = doc.node(&anchor).is_some_and(is_empty_paragraph);

    let mut tx = build_insert(editor, &anchor, node.clone(), replace)?;
    if replace && editor.preview_transaction(&tx).is_err() {
        tx = build_insert(editor, &anchor, node, false)?;
    }
    editor.apply(tx.source(source))?;
    Ok(())
}
