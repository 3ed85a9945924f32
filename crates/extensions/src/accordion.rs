use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    AttrSpec, CommandSpec, EditorPlugin, Node, NodeType, QuerySpec, command_args,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::common::{attrs_of, focused, require_focused, set_attrs};

/// A titled, collapsible container of blocks.
pub(crate) struct AccordionPlugin;

#[derive(Deserialize)]
struct InsertArgs {
    #[serde(default)]
    title: String,
    #[serde(default = "default_open")]
    open: bool,
}

fn default_open() -> bool {
    true
}

#[derive(Deserialize)]
struct TitleArgs {
    title: String,
}

impl EditorPlugin for AccordionPlugin {
    fn id(&self) -> &'static str {
        "ext.accordion"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("accordion", "block+")
                .attr(AttrSpec::string("title", ""))
                .attr(AttrSpec::bool("open", true)),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("accordion.insert", "Insert accordion", |editor, args| {
                let args: InsertArgs = command_args("accordion.insert", args)?;
                let node = Node::element(
                    "accordion",
                    attrs_of([("title", json!(args.title)), ("open", json!(args.open))]),
                    vec![Node::paragraph("")],
                );
                insert_block(editor, node, "command:accordion.insert")
            })
            .description("Insert a collapsible section with a title.")
            .keywords(["accordion", "faq", "collapsible", "details"])
            .args_example(json!({ "title": "FAQ" })),
            CommandSpec::new("accordion.set_title", "Rename accordion", |editor, args| {
                let args: TitleArgs = command_args("accordion.set_title", args)?;
                let path = require_focused(editor, "accordion")?;
                set_attrs(
                    editor,
                    path,
                    attrs_of([("title", json!(args.title))]),
                    "command:accordion.set_title",
                )
            })
            .args_example(json!({ "title": "Questions" })),
            CommandSpec::new("accordion.toggle_open", "Expand or collapse", |editor, _args| {
                let path = require_focused(editor, "accordion")?;
                let open = editor
                    .doc()
                    .node(&path)
                    .and_then(|node| node.attrs())
                    .and_then(|attrs| attrs.get("open"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                set_attrs(
                    editor,
                    path,
                    attrs_of([("open", json!(!open))]),
                    "command:accordion.toggle_open",
                )
            })
            .keywords(["collapse", "expand"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("accordion.is_open", |editor, _args| {
            let open = focused(editor, "accordion")
                .and_then(|path| editor.doc().node(&path))
                .and_then(|node| node.attrs())
                .and_then(|attrs| attrs.get("open").cloned());
            Ok(open.unwrap_or(Value::Null))
        })]
    }
}
