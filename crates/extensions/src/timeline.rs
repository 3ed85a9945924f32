use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    AttrSpec, CommandError, CommandSpec, EditorPlugin, Node, NodeType, Op, Selection, TxBuilder,
    command_args, first_point_in,
};
use serde::Deserialize;
use serde_json::json;

use crate::common::{attrs_of, child_path, focused, require_focused};

pub(crate) struct TimelinePlugin;

#[derive(Deserialize, Default)]
struct ItemArgs {
    #[serde(default)]
    date: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct InsertArgs {
    #[serde(default)]
    items: Vec<ItemArgs>,
}

fn item(args: &ItemArgs) -> Node {
    Node::element(
        "timeline_item",
        attrs_of([("date", json!(args.date)), ("title", json!(args.title))]),
        vec![Node::paragraph("")],
    )
}

impl EditorPlugin for TimelinePlugin {
    fn id(&self) -> &'static str {
        "ext.timeline"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("timeline", "timeline_item+"),
            NodeType::element("timeline_item", "block+")
                .attr(AttrSpec::string("date", ""))
                .attr(AttrSpec::string("title", "")),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("timeline.insert", "Insert timeline", |editor, args| {
                let mut args: InsertArgs = command_args("timeline.insert", args)?;
                if args.items.is_empty() {
                    args.items.push(ItemArgs::default());
                }
                let node = Node::element(
                    "timeline",
                    Default::default(),
                    args.items.iter().map(item).collect(),
                );
                insert_block(editor, node, "command:timeline.insert")
            })
            .description("Insert a sequence of dated entries.")
            .keywords(["timeline", "history", "milestones"])
            .args_example(json!({ "items": [{ "date": "2024", "title": "Launch" }] })),
            CommandSpec::new("timeline.add_item", "Add timeline entry", |editor, args| {
                let args: ItemArgs = command_args("timeline.add_item", args)?;
                // After the entry holding the caret, or at the end of the timeline.
                let target = match focused(editor, "timeline_item") {
                    Some(entry) => {
                        let (&ix, timeline) = entry
                            .split_last()
                            .ok_or_else(|| CommandError::not_applicable("No timeline entry"))?;
                        child_path(timeline, ix + 1)
                    }
                    None => {
                        let timeline = require_focused(editor, "timeline")?;
                        let len = editor.doc().node(&timeline).map_or(0, |n| n.children().len());
                        child_path(&timeline, len)
                    }
                };

                let registry = editor.shared_registry();
                let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
                tx.push(Op::InsertNode {
                    path: target.clone(),
                    node: item(&args),
                })?;
                let tx = match first_point_in(tx.doc(), &target) {
                    Some(point) => tx.finish_with(Selection::collapsed(point)),
                    None => tx.finish(),
                };
                editor.apply(tx.source("command:timeline.add_item"))?;
                Ok(())
            })
            .args_example(json!({ "date": "2025", "title": "Next" })),
        ]
    }
}
