use serde::Deserialize;
use serde_json::Value;

use crate::editor::Editor;
use crate::inline::{coalesce_runs, point_global_offset, point_for_global_offset};
use crate::markup::MarkupElement;
use crate::model::{Attrs, Node, Path, TextNode, ancestor_element_path};
use crate::ops::{AttrPatch, Op, TxBuilder};
use crate::registry::{
    CommandError, CommandSpec, EditorPlugin, NodeType, PlainTextRule, QuerySpec, command_args,
};
use crate::schema::AttrSpec;
use crate::selection::{Point, Selection};

use super::{
    focus_block_path, insert_block, selected_leaf_blocks, selected_sibling_range,
    unwrap_container, wrap_siblings,
};

pub(crate) struct HeadingPlugin;

fn level_from_tag(el: &MarkupElement) -> Option<String> {
    el.tag
        .strip_prefix('h')
        .filter(|digit| digit.len() == 1)
        .map(str::to_string)
}

/// The level travels in the tag name.
fn no_attrs(_: &Value) -> Vec<(String, String)> {
    Vec::new()
}

fn heading_tag(attrs: &Attrs) -> String {
    let level = attrs
        .get("level")
        .and_then(Value::as_i64)
        .unwrap_or(1)
        .clamp(1, 6);
    format!("h{level}")
}

fn heading_attrs(level: i64) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("level".to_string(), Value::from(level));
    attrs
}

#[derive(Deserialize)]
struct LevelArgs {
    level: i64,
}

#[derive(Deserialize)]
struct InsertHeadingArgs {
    level: i64,
    #[serde(default)]
    text: String,
}

fn check_level(command: &str, level: i64) -> Result<(), CommandError> {
    if (1..=6).contains(&level) {
        Ok(())
    } else {
        Err(CommandError::invalid_args(
            command,
            format!("heading level must be 1-6, got {level}"),
        ))
    }
}

impl EditorPlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "block.heading"
    }

    fn node_types(&self) -> Vec<NodeType> {
        let mut heading = NodeType::block("heading", "inline*")
            .tag("h1")
            .render_tag(heading_tag)
            .attr(AttrSpec::integer("level", 1, 1, 6).custom(level_from_tag, no_attrs))
            .plain_text(PlainTextRule::Heading);
        for level in 2..=6 {
            heading = heading.tag_alias(format!("h{level}"));
        }
        vec![heading]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_heading", "Set heading", |editor, args| {
                let args: LevelArgs = command_args("block.set_heading", args)?;
                check_level("block.set_heading", args.level)?;
                set_heading(editor, Some(args.level))
            })
            .description("Turn the selected paragraphs into headings.")
            .keywords(["heading", "title", "h1", "h2", "h3"])
            .args_example(serde_json::json!({ "level": 2 })),
            CommandSpec::new("block.unset_heading", "Normal text", |editor, _args| {
                set_heading(editor, None)
            })
            .keywords(["paragraph", "normal", "body"]),
            CommandSpec::new("block.insert_heading", "Insert heading", |editor, args| {
                let args: InsertHeadingArgs = command_args("block.insert_heading", args)?;
                check_level("block.insert_heading", args.level)?;
                let node = Node::element(
                    "heading",
                    heading_attrs(args.level),
                    vec![Node::text(args.text)],
                );
                insert_block(editor, node, "command:block.insert_heading")
            })
            .keywords(["heading", "title"])
            .args_example(serde_json::json!({ "level": 2, "text": "Intro" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.heading_level", |editor, _args| {
            let level = focus_block_path(editor)
                .and_then(|path| editor.doc().node(&path))
                .and_then(Node::as_element)
                .filter(|el| el.kind == "heading")
                .and_then(|el| el.attrs.get("level").cloned());
            Ok(level.unwrap_or(Value::Null))
        })]
    }
}

/// `Some(level)` turns paragraphs and headings into headings of that level,
/// `None` turns headings back into paragraphs. Table cells keep plain text.
fn set_heading(editor: &mut Editor, level: Option<i64>) -> Result<(), CommandError> {
    let doc = editor.doc();
    let targets: Vec<Path> = selected_leaf_blocks(editor)
        .into_iter()
        .filter(|path| ancestor_element_path(doc, path, "table_cell").is_none())
        .filter(|path| match (doc.node(path), level) {
            (Some(Node::Element(el)), Some(level)) => {
                el.kind == "paragraph"
                    || (el.kind == "heading"
                        && el.attrs.get("level").and_then(Value::as_i64) != Some(level))
            }
            (Some(Node::Element(el)), None) => el.kind == "heading",
            _ => false,
        })
        .collect();
    if targets.is_empty() {
        return Err(CommandError::not_applicable(match level {
            Some(_) => "No paragraph to turn into a heading",
            None => "No heading selected",
        }));
    }

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    for path in targets {
        let Some(Node::Element(el)) = tx.doc().node(&path).cloned() else {
            continue;
        };
        match level {
            Some(level) if el.kind == "heading" => tx.push(Op::SetNodeAttrs {
                path,
                patch: AttrPatch::one("level", Value::from(level)),
            })?,
            _ => {
                let (kind, attrs) = match level {
                    Some(level) => ("heading", heading_attrs(level)),
                    None => ("paragraph", Attrs::new()),
                };
                tx.push(Op::RemoveNode { path: path.clone() })?;
                tx.push(Op::InsertNode {
                    path,
                    node: Node::element(kind, attrs, el.children),
                })?;
            }
        }
    }

    let tx = tx.finish_with(editor.selection().clone());
    editor.apply(tx.source("command:block.set_heading"))?;
    Ok(())
}

pub(crate) struct BlockquotePlugin;

impl EditorPlugin for BlockquotePlugin {
    fn id(&self) -> &'static str {
        "block.blockquote"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("blockquote", "block+")
                .tag("blockquote")
                .plain_text(PlainTextRule::Blockquote),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("blockquote.wrap", "Quote", |editor, _args| {
                let (parent, first, last) = selected_sibling_range(editor)
                    .ok_or_else(|| CommandError::not_applicable("Nothing to quote"))?;
                wrap_siblings(
                    editor,
                    &parent,
                    (first, last),
                    ("blockquote", Attrs::new()),
                    |node| node,
                    &[],
                    "command:blockquote.wrap",
                )
            })
            .description("Wrap the selected blocks in a quote.")
            .keywords(["quote", "blockquote", "citation"]),
            CommandSpec::new("blockquote.unwrap", "Remove quote", |editor, _args| {
                let quote = focus_block_path(editor)
                    .and_then(|path| ancestor_element_path(editor.doc(), &path, "blockquote"))
                    .ok_or_else(|| CommandError::not_applicable("The caret is not in a quote"))?;
                unwrap_container(editor, &quote, "command:blockquote.unwrap")
            })
            .keywords(["quote", "unquote"]),
        ]
    }
}

pub(crate) struct CodeBlockPlugin;

impl EditorPlugin for CodeBlockPlugin {
    fn id(&self) -> &'static str {
        "block.code_block"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("code_block", "text*")
                .tag("pre")
                .inner_wrapper("code")
                .preserve_newlines()
                .attr(AttrSpec::string("language", ""))
                .plain_text(PlainTextRule::CodeBlock),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("code_block.toggle", "Code block", |editor, _args| {
                toggle_code_block(editor)
            })
            .description("Turn the current block into a code block, or back into text.")
            .keywords(["code", "pre", "snippet"]),
        ]
    }
}

fn toggle_code_block(editor: &mut Editor) -> Result<(), CommandError> {
    let block = focus_block_path(editor)
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a block"))?;
    let Some(Node::Element(el)) = editor.doc().node(&block).cloned() else {
        return Err(CommandError::not_applicable("The caret is not in a text block"));
    };

    let text: String = el
        .children
        .iter()
        .filter_map(Node::as_text)
        .map(|run| run.text.as_str())
        .collect();
    let (kind, attrs, children) = match el.kind.as_str() {
        "code_block" => ("paragraph", Attrs::new(), coalesce_runs(el.children.clone())),
        "paragraph" | "heading" => (
            "code_block",
            Attrs::new(),
            vec![Node::Text(TextNode::new(text))],
        ),
        other => {
            return Err(CommandError::not_applicable(format!(
                "`{other}` cannot become a code block"
            )));
        }
    };

    // Points inside the block keep their offset into its text.
    let remap = |point: &Point| {
        if point.block_path() != block.as_slice() {
            return point.clone();
        }
        let global = point_global_offset(&el.children, point.inline_index(), point.offset);
        point_for_global_offset(&block, &children, global)
    };
    let selection = editor.selection();
    let selection = Selection::new(remap(&selection.anchor), remap(&selection.focus));

    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    tx.push(Op::RemoveNode {
        path: block.clone(),
    })?;
    tx.push(Op::InsertNode {
        path: block.clone(),
        node: Node::element(kind, attrs, children.clone()),
    })?;
    editor.apply(tx.finish_with(selection).source("command:code_block.toggle"))?;
    Ok(())
}
