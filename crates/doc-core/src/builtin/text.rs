use serde::Deserialize;

use crate::editor::{ApplyError, Editor};
use crate::inline::{
    coalesce_runs, inline_text_len, point_for_global_offset, prev_char_boundary, split_inlines,
};
use crate::model::{Attrs, ElementNode, Node, Path, children_at};
use crate::ops::{AttrPatch, Op, Transaction, TxBuilder};
use crate::registry::{
    CommandError, CommandSpec, EditorPlugin, NodeType, PlainTextRule, command_args,
};
use crate::selection::{Selection, document_end, document_start, first_point_in, last_point_in};

use super::{block_path_of, child_path, focus_block_path, insert_block, leaf_blocks, text_block_of};

pub(crate) struct CoreSchemaPlugin;

impl EditorPlugin for CoreSchemaPlugin {
    fn id(&self) -> &'static str {
        "core.schema"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("paragraph", "inline*")
                .tag("p")
                .plain_text(PlainTextRule::Paragraph),
            NodeType::atomic("divider")
                .tag("hr")
                .plain_text(PlainTextRule::Divider),
        ]
    }
}

#[derive(Deserialize)]
struct InsertTextArgs {
    text: String,
}

#[derive(Deserialize)]
struct InsertParagraphArgs {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct SetNodeAttrsArgs {
    path: Path,
    attrs: Attrs,
}

pub(crate) struct CoreCommandsPlugin;

impl EditorPlugin for CoreCommandsPlugin {
    fn id(&self) -> &'static str {
        "core.commands"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("core.insert_text", "Insert text", |editor, args| {
                let args: InsertTextArgs = command_args("core.insert_text", args)?;
                insert_text(editor, &args.text)
            })
            .description("Insert text at the caret, replacing the selection.")
            .args_example(serde_json::json!({ "text": "Hello" }))
            .hidden(true),
            CommandSpec::new("core.delete_backward", "Delete backward", |editor, _args| {
                delete_backward(editor)
            })
            .hidden(true),
            CommandSpec::new("core.delete_selection", "Delete selection", |editor, _args| {
                delete_selection(editor)
            })
            .hidden(true),
            CommandSpec::new("core.split_block", "Split block", |editor, _args| {
                split_block(editor)
            })
            .description("Split the current block at the caret.")
            .hidden(true),
            CommandSpec::new("core.insert_paragraph", "Insert paragraph", |editor, args| {
                let args: InsertParagraphArgs = command_args("core.insert_paragraph", args)?;
                insert_paragraph(editor, &args.text)
            })
            .description("Insert a paragraph after the current block.")
            .keywords(["paragraph", "text"])
            .args_example(serde_json::json!({ "text": "" })),
            CommandSpec::new("core.insert_divider", "Insert divider", |editor, _args| {
                insert_block(editor, Node::divider(), "command:core.insert_divider")
            })
            .description("Insert a divider block and a trailing paragraph.")
            .keywords(["divider", "separator", "hr", "horizontal rule"]),
            CommandSpec::new("core.set_node_attrs", "Set node attributes", |editor, args| {
                let args: SetNodeAttrsArgs = command_args("core.set_node_attrs", args)?;
                let tx = Transaction::new(vec![Op::SetNodeAttrs {
                    path: args.path,
                    patch: AttrPatch::set(args.attrs),
                }])
                .source("command:core.set_node_attrs");
                editor.apply(tx).map_err(|err| match err {
                    ApplyError::InvalidPath(_) | ApplyError::Content(_) => {
                        CommandError::invalid_args("core.set_node_attrs", err.to_string())
                    }
                    other => other.into(),
                })
            })
            .args_example(serde_json::json!({ "path": [0], "attrs": {} }))
            .hidden(true),
            CommandSpec::new("core.select_all", "Select all", |editor, _args| {
                let doc = editor.doc();
                let (Some(start), Some(end)) = (document_start(doc), document_end(doc)) else {
                    return Err(CommandError::not_applicable("The document has no content"));
                };
                editor.set_selection(Selection::new(start, end));
                Ok(())
            })
            .keywords(["select", "all"]),
        ]
    }
}

fn insert_text(editor: &mut Editor, text: &str) -> Result<(), CommandError> {
    if text.is_empty() {
        return Ok(());
    }
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    delete_range(&mut tx)?;

    let focus = tx.selection().focus.clone();
    if !matches!(tx.doc().node(&focus.path), Some(Node::Text(_))) {
        return Err(CommandError::not_applicable("The caret is not in text"));
    }
    tx.push(Op::InsertText {
        path: focus.path,
        offset: focus.offset,
        text: text.to_string(),
    })?;
    editor.apply(tx.finish().source("command:core.insert_text"))?;
    Ok(())
}

fn delete_selection(editor: &mut Editor) -> Result<(), CommandError> {
    if editor.selection().is_collapsed() {
        return Err(CommandError::not_applicable("Nothing is selected"));
    }
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    delete_range(&mut tx)?;
    editor.apply(tx.finish().source("command:core.delete_selection"))?;
    Ok(())
}

fn join_runs(left: &[Node], at: usize, right: &[Node], from: usize) -> Vec<Node> {
    let (mut out, _) = split_inlines(left, at);
    out.extend(split_inlines(right, from).1);
    coalesce_runs(out)
}

/// Removes an atomic block. A container left without children gets an
/// empty paragraph in its place.
fn remove_leaf(tx: &mut TxBuilder<'_>, path: &[usize]) -> Result<(), ApplyError> {
    let Some((_, parent)) = path.split_last() else {
        return Err(ApplyError::InvalidPath("Cannot remove the document".into()));
    };
    let siblings = children_at(tx.doc(), parent).map_or(0, <[Node]>::len);
    tx.push(Op::RemoveNode {
        path: path.to_vec(),
    })?;
    if siblings == 1 && !parent.is_empty() {
        tx.push(Op::InsertNode {
            path: path.to_vec(),
            node: Node::paragraph(""),
        })?;
    }
    Ok(())
}

/// Deletes the selected range and collapses the selection where it started.
/// Text blocks strictly inside the range are emptied, atomic blocks removed.
fn delete_range(tx: &mut TxBuilder<'_>) -> Result<(), CommandError> {
    let (start, end) = tx.selection().ordered();
    if start == end {
        return Ok(());
    }
    let registry = tx.registry();
    let (Some(first), Some(last)) = (block_path_of(tx.doc(), &start), block_path_of(tx.doc(), &end))
    else {
        return Err(CommandError::not_applicable("The selection does not resolve to blocks"));
    };
    let start_text =
        text_block_of(tx.doc(), registry, &start).map(|(_, el, global)| (el.children.clone(), global));
    let end_text =
        text_block_of(tx.doc(), registry, &end).map(|(_, el, global)| (el.children.clone(), global));

    let same_parent = first.len() == last.len() && first[..first.len() - 1] == last[..last.len() - 1];
    if let (Some((left, gs)), Some((right, ge))) = (&start_text, &end_text)
        && same_parent
    {
        let merged = join_runs(left, *gs, right, *ge);
        tx.push(Op::ReplaceInlines {
            path: first.clone(),
            children: merged.clone(),
        })?;
        if let (Some((&first_ix, parent)), Some(&last_ix)) = (first.split_last(), last.last()) {
            for ix in (first_ix + 1..=last_ix).rev() {
                tx.push(Op::RemoveNode {
                    path: child_path(parent, ix),
                })?;
            }
        }
        tx.set_selection(Selection::collapsed(point_for_global_offset(&first, &merged, *gs)));
        return Ok(());
    }

    let leaves: Vec<Path> = leaf_blocks(tx.doc(), registry)
        .into_iter()
        .filter(|path| *path >= first && *path <= last)
        .collect();
    for leaf in leaves.iter().rev() {
        if !matches!(tx.doc().node(leaf), Some(Node::Element(_))) {
            remove_leaf(tx, leaf)?;
            continue;
        }
        let children = match (&start_text, &end_text) {
            (_, Some((right, ge))) if *leaf == last => split_inlines(right, *ge).1,
            (Some((left, gs)), _) if *leaf == first => split_inlines(left, *gs).0,
            _ => vec![Node::text("")],
        };
        tx.push(Op::ReplaceInlines {
            path: leaf.clone(),
            children,
        })?;
    }

    let caret = match (&start_text, tx.doc().node(&first)) {
        (Some((_, gs)), Some(Node::Element(el))) => point_for_global_offset(&first, &el.children, *gs),
        _ => tx.selection().ordered().0,
    };
    tx.set_selection(Selection::collapsed(caret));
    Ok(())
}

fn delete_backward(editor: &mut Editor) -> Result<(), CommandError> {
    if !editor.selection().is_collapsed() {
        return delete_selection(editor);
    }
    let focus = editor.selection().focus.clone();
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);

    match editor.doc().node(&focus.path).cloned() {
        Some(Node::Void(_) | Node::Opaque(_)) => remove_leaf(&mut tx, &focus.path)?,
        Some(Node::Text(run)) if focus.offset > 0 => {
            let start = prev_char_boundary(&run.text, focus.offset);
            tx.push(Op::RemoveText {
                path: focus.path.clone(),
                range: start..focus.offset,
            })?;
        }
        Some(Node::Text(_)) if focus.inline_index() > 0 => {
            let prev_path = child_path(focus.block_path(), focus.inline_index() - 1);
            let Some(Node::Text(prev)) = editor.doc().node(&prev_path) else {
                return Err(CommandError::not_applicable("No text before the caret"));
            };
            let len = prev.text.len();
            tx.push(Op::RemoveText {
                range: prev_char_boundary(&prev.text, len)..len,
                path: prev_path,
            })?;
        }
        Some(Node::Text(_)) => return join_backward(editor, focus.block_path().to_vec()),
        _ => return Err(CommandError::not_applicable("The caret is not in editable content")),
    }

    editor.apply(tx.finish().source("command:core.delete_backward"))?;
    Ok(())
}

/// Backspace at the start of a text block: merge into whatever precedes it,
/// or lift the block out of its container when it comes first.
fn join_backward(editor: &mut Editor, block: Path) -> Result<(), CommandError> {
    let Some(Node::Element(current)) = editor.doc().node(&block).cloned() else {
        return Err(CommandError::not_applicable("The caret is not in a text block"));
    };
    let Some((&ix, parent)) = block.split_last() else {
        return Err(CommandError::not_applicable("The caret is not in a text block"));
    };
    if ix == 0 {
        return lift_first_block(editor, &block, current);
    }

    let prev_path = child_path(parent, ix - 1);
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    match editor.doc().node(&prev_path) {
        Some(Node::Void(_) | Node::Opaque(_)) => remove_leaf(&mut tx, &prev_path)?,
        Some(Node::Element(_)) => {
            let target = last_point_in(editor.doc(), &prev_path)
                .and_then(|point| text_block_of(editor.doc(), &registry, &point));
            let Some((target_block, target_el, _)) = target else {
                return Err(CommandError::not_applicable("Nothing to merge into"));
            };
            let len = inline_text_len(&target_el.children);
            let mut merged = target_el.children.clone();
            merged.extend(current.children);
            let merged = coalesce_runs(merged);

            tx.push(Op::ReplaceInlines {
                path: target_block.clone(),
                children: merged.clone(),
            })?;
            tx.push(Op::RemoveNode {
                path: block.clone(),
            })?;
            tx.set_selection(Selection::collapsed(point_for_global_offset(
                &target_block,
                &merged,
                len,
            )));
        }
        _ => return Err(CommandError::not_applicable("Nothing before the caret")),
    }

    editor.apply(tx.finish().source("command:core.delete_backward"))?;
    Ok(())
}

fn lift_first_block(
    editor: &mut Editor,
    block: &[usize],
    current: ElementNode,
) -> Result<(), CommandError> {
    if current.kind != "paragraph" {
        let registry = editor.shared_registry();
        let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
        tx.push(Op::RemoveNode {
            path: block.to_vec(),
        })?;
        tx.push(Op::InsertNode {
            path: block.to_vec(),
            node: Node::element("paragraph", Attrs::new(), current.children),
        })?;
        let tx = tx.finish_with(editor.selection().clone());
        editor.apply(tx.source("command:core.delete_backward"))?;
        return Ok(());
    }

    let parent = &block[..block.len() - 1];
    let container = match editor.doc().node(parent) {
        Some(Node::Element(el)) => el.kind.clone(),
        _ => return Err(CommandError::not_applicable("Already at the start of the document")),
    };
    match container.as_str() {
        "list_item" => editor.run_command("list.unwrap", None),
        "blockquote" => editor.run_command("blockquote.unwrap", None),
        other => Err(CommandError::not_applicable(format!(
            "Cannot lift a block out of `{other}`"
        ))),
    }
}

/// Enter in an empty list item that is alone in its item leaves the list.
fn exits_list(editor: &Editor) -> bool {
    let focus = &editor.selection().focus;
    let Some((block, el, _)) = text_block_of(editor.doc(), editor.registry(), focus) else {
        return false;
    };
    if inline_text_len(&el.children) > 0 || editor.registry().command("list.unwrap").is_none() {
        return false;
    }
    let parent = &block[..block.len().saturating_sub(1)];
    matches!(
        editor.doc().node(parent),
        Some(Node::Element(item)) if item.kind == "list_item" && item.children.len() == 1
    )
}

fn split_block(editor: &mut Editor) -> Result<(), CommandError> {
    if editor.selection().is_collapsed() && exits_list(editor) {
        return editor.run_command("list.unwrap", None);
    }

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    delete_range(&mut tx)?;
    let focus = tx.selection().focus.clone();

    if matches!(tx.doc().node(&focus.path), Some(Node::Void(_) | Node::Opaque(_))) {
        let (&ix, parent) = focus
            .path
            .split_last()
            .ok_or_else(|| CommandError::not_applicable("The caret is not in a block"))?;
        let next = child_path(parent, ix + 1);
        tx.push(Op::InsertNode {
            path: next.clone(),
            node: Node::paragraph(""),
        })?;
        let caret = first_point_in(tx.doc(), &next);
        let tx = match caret {
            Some(point) => tx.finish_with(Selection::collapsed(point)),
            None => tx.finish(),
        };
        editor.apply(tx.source("command:core.split_block"))?;
        return Ok(());
    }

    let Some((block, el, global)) = text_block_of(tx.doc(), &registry, &focus) else {
        return Err(CommandError::not_applicable("The caret is not in a text block"));
    };
    let el = el.clone();

    if el.kind == "code_block" {
        tx.push(Op::InsertText {
            path: focus.path,
            offset: focus.offset,
            text: "\n".to_string(),
        })?;
        editor.apply(tx.finish().source("command:core.split_block"))?;
        return Ok(());
    }

    let (left, right) = split_inlines(&el.children, global);
    let (kind, attrs) = if el.kind == "heading" && inline_text_len(&right) == 0 {
        ("paragraph".to_string(), Attrs::new())
    } else {
        (el.kind.clone(), el.attrs.clone())
    };
    let (&ix, parent) = block
        .split_last()
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a block"))?;
    let item = match tx.doc().node(parent) {
        Some(Node::Element(item)) if item.kind == "list_item" && ix == 0 => {
            Some((parent.to_vec(), item.attrs.clone()))
        }
        _ => None,
    };

    tx.push(Op::ReplaceInlines {
        path: block.clone(),
        children: left,
    })?;
    tx.push(Op::InsertNode {
        path: child_path(parent, ix + 1),
        node: Node::element(kind, attrs, right),
    })?;
    let new_block = match item {
        Some((item_path, item_attrs)) => {
            tx.push(Op::SplitNode {
                path: item_path.clone(),
                position: 1,
                attrs: item_attrs,
            })?;
            let mut next_item = item_path;
            if let Some(last) = next_item.last_mut() {
                *last += 1;
            }
            child_path(&next_item, 0)
        }
        None => child_path(parent, ix + 1),
    };

    let tx = match first_point_in(tx.doc(), &new_block) {
        Some(point) => tx.finish_with(Selection::collapsed(point)),
        None => tx.finish(),
    };
    editor.apply(tx.source("command:core.split_block"))?;
    Ok(())
}

fn insert_paragraph(editor: &mut Editor, text: &str) -> Result<(), CommandError> {
    let block = focus_block_path(editor)
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a block"))?;
    let (&ix, parent) = block
        .split_last()
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a block"))?;
    let target = child_path(parent, ix + 1);

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    tx.push(Op::InsertNode {
        path: target.clone(),
        node: Node::paragraph(text),
    })?;
    let tx = match last_point_in(tx.doc(), &target) {
        Some(point) => tx.finish_with(Selection::collapsed(point)),
        None => tx.finish(),
    };
    editor.apply(tx.source("command:core.insert_paragraph"))?;
    Ok(())
}
