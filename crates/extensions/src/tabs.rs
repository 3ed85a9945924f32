use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    AttrPatch, AttrSpec, CommandError, CommandSpec, Document, EditorPlugin, Node, NodeType,
    NormalizePass, Op, PluginRegistry, QuerySpec, Selection, TxBuilder, command_args,
    first_point_in,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::common::{attrs_of, child_path, elements_of_kind, focused, require_focused, set_attrs};

const MAX_PANELS: usize = 64;

/// A group of labelled panels; `active` names the one shown.
pub(crate) struct TabsPlugin;

#[derive(Deserialize)]
struct InsertArgs {
    #[serde(default = "default_labels")]
    labels: Vec<String>,
}

fn default_labels() -> Vec<String> {
    vec!["Tab 1".to_string(), "Tab 2".to_string()]
}

#[derive(Deserialize)]
struct SetActiveArgs {
    index: usize,
}

#[derive(Deserialize)]
struct AddPanelArgs {
    #[serde(default)]
    label: String,
}

fn panel(label: &str) -> Node {
    Node::element(
        "tab_panel",
        attrs_of([("label", json!(label))]),
        vec![Node::paragraph("")],
    )
}

fn panel_count(doc: &Document, tabs: &[usize]) -> usize {
    doc.node(tabs).map_or(0, |node| node.children().len())
}

impl EditorPlugin for TabsPlugin {
    fn id(&self) -> &'static str {
        "ext.tabs"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("tabs", "tab_panel+")
                .attr(AttrSpec::integer("active", 0, 0, MAX_PANELS as i64 - 1)),
            NodeType::element("tab_panel", "block+").attr(AttrSpec::string("label", "")),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(ClampActiveTab)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("tabs.insert", "Insert tabs", |editor, args| {
                let args: InsertArgs = command_args("tabs.insert", args)?;
                if args.labels.is_empty() || args.labels.len() > MAX_PANELS {
                    return Err(CommandError::invalid_args(
                        "tabs.insert",
                        format!("a tab group holds 1-{MAX_PANELS} panels"),
                    ));
                }
                let panels = args.labels.iter().map(|label| panel(label)).collect();
                let node = Node::element("tabs", attrs_of([("active", json!(0))]), panels);
                insert_block(editor, node, "command:tabs.insert")
            })
            .description("Insert a tabbed group of panels.")
            .keywords(["tabs", "panels", "tabbed"])
            .args_example(json!({ "labels": ["Overview", "Details"] })),
            CommandSpec::new("tabs.set_active", "Show tab", |editor, args| {
                let args: SetActiveArgs = command_args("tabs.set_active", args)?;
                let tabs = require_focused(editor, "tabs")?;
                let count = panel_count(editor.doc(), &tabs);
                if args.index >= count {
                    return Err(CommandError::invalid_args(
                        "tabs.set_active",
                        format!("tab {} does not exist, the group has {count}", args.index),
                    ));
                }
                set_attrs(
                    editor,
                    tabs,
                    attrs_of([("active", json!(args.index))]),
                    "command:tabs.set_active",
                )
            })
            .hidden(true),
            CommandSpec::new("tabs.add_panel", "Add tab", |editor, args| {
                let args: AddPanelArgs = command_args("tabs.add_panel", args)?;
                let tabs = require_focused(editor, "tabs")?;
                let count = panel_count(editor.doc(), &tabs);
                if count >= MAX_PANELS {
                    return Err(CommandError::not_applicable(format!(
                        "A tab group holds at most {MAX_PANELS} panels"
                    )));
                }

                let registry = editor.shared_registry();
                let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
                let new_panel = child_path(&tabs, count);
                tx.push(Op::InsertNode {
                    path: new_panel.clone(),
                    node: panel(&args.label),
                })?;
                tx.push(Op::SetNodeAttrs {
                    path: tabs,
                    patch: AttrPatch::one("active", json!(count)),
                })?;
                let tx = match first_point_in(tx.doc(), &new_panel) {
                    Some(point) => tx.finish_with(Selection::collapsed(point)),
                    None => tx.finish(),
                };
                editor.apply(tx.source("command:tabs.add_panel"))?;
                Ok(())
            })
            .args_example(json!({ "label": "More" })),
            CommandSpec::new("tabs.remove_panel", "Remove tab", |editor, _args| {
                let panel_path = require_focused(editor, "tab_panel")?;
                let Some((&ix, tabs)) = panel_path.split_last() else {
                    return Err(CommandError::not_applicable("The cursor is not in a tab_panel"));
                };
                let count = panel_count(editor.doc(), tabs);
                if count <= 1 {
                    return Err(CommandError::not_applicable(
                        "A tab group keeps at least one panel",
                    ));
                }

                let registry = editor.shared_registry();
                let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
                tx.push(Op::RemoveNode {
                    path: panel_path.clone(),
                })?;
                let shown = ix.min(count - 2);
                tx.push(Op::SetNodeAttrs {
                    path: tabs.to_vec(),
                    patch: AttrPatch::one("active", json!(shown)),
                })?;
                let tx = match first_point_in(tx.doc(), &child_path(tabs, shown)) {
                    Some(point) => tx.finish_with(Selection::collapsed(point)),
                    None => tx.finish(),
                };
                editor.apply(tx.source("command:tabs.remove_panel"))?;
                Ok(())
            }),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("tabs.active", |editor, _args| {
            let active = focused(editor, "tabs")
                .and_then(|path| editor.doc().node(&path))
                .and_then(|node| node.attrs())
                .and_then(|attrs| attrs.get("active").cloned());
            Ok(active.unwrap_or(Value::Null))
        })]
    }
}

/// `active` always names an existing panel.
struct ClampActiveTab;

impl NormalizePass for ClampActiveTab {
    fn id(&self) -> &'static str {
        "tabs.clamp_active"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        elements_of_kind(doc, "tabs")
            .into_iter()
            .filter_map(|(path, tabs)| {
                let last = tabs.children.len().checked_sub(1)?;
                let active = tabs.attrs.get("active").and_then(Value::as_u64)?;
                (active as usize > last).then(|| Op::SetNodeAttrs {
                    path,
                    patch: AttrPatch::one("active", json!(last)),
                })
            })
            .collect()
    }
}
