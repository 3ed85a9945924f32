use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    AttrSpec, CommandError, CommandSpec, EditorPlugin, Node, NodeType, command_args,
};
use serde::Deserialize;
use serde_json::json;

use crate::common::{attrs_of, require_focused, set_attrs};

/// Two images stacked under a slider; `position` is the slider in percent.
pub(crate) struct ImageComparePlugin;

#[derive(Deserialize)]
struct InsertArgs {
    before: String,
    after: String,
    #[serde(default)]
    before_alt: String,
    #[serde(default)]
    after_alt: String,
}

#[derive(Deserialize)]
struct PositionArgs {
    position: i64,
}

impl EditorPlugin for ImageComparePlugin {
    fn id(&self) -> &'static str {
        "ext.image_compare"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::atomic("image_compare")
                .attr(AttrSpec::string("before", ""))
                .attr(AttrSpec::string("after", ""))
                .attr(AttrSpec::string("before_alt", ""))
                .attr(AttrSpec::string("after_alt", ""))
                .attr(AttrSpec::integer("position", 50, 0, 100)),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("image_compare.insert", "Insert before/after", |editor, args| {
                let args: InsertArgs = command_args("image_compare.insert", args)?;
                let (before, after) = (args.before.trim(), args.after.trim());
                if before.is_empty() || after.is_empty() {
                    return Err(CommandError::invalid_args(
                        "image_compare.insert",
                        "both images need a URL",
                    ));
                }
                let node = Node::void(
                    "image_compare",
                    attrs_of([
                        ("before", json!(before)),
                        ("after", json!(after)),
                        ("before_alt", json!(args.before_alt)),
                        ("after_alt", json!(args.after_alt)),
                    ]),
                );
                insert_block(editor, node, "command:image_compare.insert")
            })
            .description("Compare two images with a slider.")
            .keywords(["compare", "before", "after", "slider"])
            .args_example(json!({ "before": "https://example.com/a.png", "after": "https://example.com/b.png" })),
            CommandSpec::new("image_compare.set_position", "Move slider", |editor, args| {
                let args: PositionArgs = command_args("image_compare.set_position", args)?;
                if !(0..=100).contains(&args.position) {
                    return Err(CommandError::invalid_args(
                        "image_compare.set_position",
                        format!("position must be 0-100, got {}", args.position),
                    ));
                }
                let path = require_focused(editor, "image_compare")?;
                set_attrs(
                    editor,
                    path,
                    attrs_of([("position", json!(args.position))]),
                    "command:image_compare.set_position",
                )
            })
            .hidden(true),
        ]
    }
}
