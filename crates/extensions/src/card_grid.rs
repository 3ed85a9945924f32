use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    AttrSpec, CommandError, CommandSpec, EditorPlugin, Node, NodeType, Op, Selection, TxBuilder,
    command_args, first_point_in,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::common::{attrs_of, child_path, require_focused, set_attrs};

const MAX_COLUMNS: i64 = 4;
const MAX_CARDS: usize = 24;

/// Cards laid out on a grid of 1-4 columns.
pub(crate) struct CardGridPlugin;

#[derive(Deserialize)]
struct InsertArgs {
    #[serde(default = "default_columns")]
    columns: i64,
    cards: Option<usize>,
}

fn default_columns() -> i64 {
    3
}

#[derive(Deserialize)]
struct ColumnsArgs {
    columns: i64,
}

#[derive(Deserialize)]
struct CardArgs {
    #[serde(default)]
    title: String,
    #[serde(default)]
    image: Option<String>,
}

fn check_columns(command: &str, columns: i64) -> Result<(), CommandError> {
    if (1..=MAX_COLUMNS).contains(&columns) {
        Ok(())
    } else {
        Err(CommandError::invalid_args(
            command,
            format!("columns must be 1-{MAX_COLUMNS}, got {columns}"),
        ))
    }
}

fn card(title: &str, image: Option<&str>) -> Node {
    Node::element(
        "card",
        attrs_of([
            ("title", json!(title)),
            ("image", image.map_or(Value::Null, Value::from)),
        ]),
        vec![Node::paragraph("")],
    )
}

impl EditorPlugin for CardGridPlugin {
    fn id(&self) -> &'static str {
        "ext.card_grid"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("card_grid", "card+")
                .attr(AttrSpec::integer("columns", 3, 1, MAX_COLUMNS)),
            NodeType::element("card", "block+")
                .attr(AttrSpec::string("title", ""))
                .attr(AttrSpec::optional_string("image")),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("card_grid.insert", "Insert card grid", |editor, args| {
                let args: InsertArgs = command_args("card_grid.insert", args)?;
                check_columns("card_grid.insert", args.columns)?;
                let cards = args.cards.unwrap_or(args.columns as usize);
                if !(1..=MAX_CARDS).contains(&cards) {
                    return Err(CommandError::invalid_args(
                        "card_grid.insert",
                        format!("cards must be 1-{MAX_CARDS}, got {cards}"),
                    ));
                }
                let node = Node::element(
                    "card_grid",
                    attrs_of([("columns", json!(args.columns))]),
                    (0..cards).map(|_| card("", None)).collect(),
                );
                insert_block(editor, node, "command:card_grid.insert")
            })
            .description("Insert a grid of cards.")
            .keywords(["cards", "grid", "features"])
            .args_example(json!({ "columns": 3 })),
            CommandSpec::new("card_grid.set_columns", "Set grid columns", |editor, args| {
                let args: ColumnsArgs = command_args("card_grid.set_columns", args)?;
                check_columns("card_grid.set_columns", args.columns)?;
                let grid = require_focused(editor, "card_grid")?;
                set_attrs(
                    editor,
                    grid,
                    attrs_of([("columns", json!(args.columns))]),
                    "command:card_grid.set_columns",
                )
            })
            .args_example(json!({ "columns": 2 })),
            CommandSpec::new("card_grid.add_card", "Add card", |editor, args| {
                let args: CardArgs = command_args("card_grid.add_card", args)?;
                let grid = require_focused(editor, "card_grid")?;
                let count = editor.doc().node(&grid).map_or(0, |n| n.children().len());
                if count >= MAX_CARDS {
                    return Err(CommandError::not_applicable(format!(
                        "A card grid holds at most {MAX_CARDS} cards"
                    )));
                }

                let registry = editor.shared_registry();
                let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
                let target = child_path(&grid, count);
                tx.push(Op::InsertNode {
                    path: target.clone(),
                    node: card(&args.title, args.image.as_deref()),
                })?;
                let tx = match first_point_in(tx.doc(), &target) {
                    Some(point) => tx.finish_with(Selection::collapsed(point)),
                    None => tx.finish(),
                };
                editor.apply(tx.source("command:card_grid.add_card"))?;
                Ok(())
            })
            .args_example(json!({ "title": "Fast", "image": "https://example.com/f.png" })),
        ]
    }
}
