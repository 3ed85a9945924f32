use serde::Deserialize;
use serde_json::Value;

use crate::editor::Editor;
use crate::markup::MarkupElement;
use crate::model::{Attrs, Document, Node, Path, ancestor_element_path, children_at};
use crate::ops::{Op, TxBuilder};
use crate::registry::{
    CommandError, CommandSpec, EditorPlugin, NodeType, NormalizePass, PlainTextRule,
    PluginRegistry, command_args,
};
use crate::schema::AttrSpec;
use crate::selection::{Selection, first_point_in};

use super::{child_path, focus_block_path, insert_block};

const MAX_DIMENSION: usize = 100;

pub(crate) struct TablePlugin;

fn header_from_tag(el: &MarkupElement) -> Option<String> {
    Some((el.tag == "th").to_string())
}

/// `header` is carried by the tag name.
fn no_attrs(_: &Value) -> Vec<(String, String)> {
    Vec::new()
}

fn cell_tag(attrs: &Attrs) -> String {
    match attrs.get("header").and_then(Value::as_bool) {
        Some(true) => "th".to_string(),
        _ => "td".to_string(),
    }
}

fn cell(header: bool) -> Node {
    let mut attrs = Attrs::new();
    attrs.insert("header".to_string(), Value::Bool(header));
    Node::element("table_cell", attrs, vec![Node::paragraph("")])
}

fn row(cells: usize, header: bool) -> Node {
    Node::element("table_row", Attrs::new(), (0..cells).map(|_| cell(header)).collect())
}

#[derive(Deserialize)]
struct InsertTableArgs {
    rows: usize,
    cols: usize,
    #[serde(default)]
    header_row: bool,
}

impl EditorPlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "block.table"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::block("table", "table_row+")
                .tag("table")
                .plain_text(PlainTextRule::Table),
            NodeType::element("table_row", "table_cell+")
                .tag("tr")
                .plain_text(PlainTextRule::TableRow),
            NodeType::element("table_cell", "block+")
                .tag("td")
                .tag_alias("th")
                .render_tag(cell_tag)
                .attr(AttrSpec::bool("header", false).custom(header_from_tag, no_attrs))
                .plain_text(PlainTextRule::TableCell),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(PadTableRows)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Insert table", |editor, args| {
                let args: InsertTableArgs = command_args("table.insert", args)?;
                for (name, value) in [("rows", args.rows), ("cols", args.cols)] {
                    if !(1..=MAX_DIMENSION).contains(&value) {
                        return Err(CommandError::invalid_args(
                            "table.insert",
                            format!("{name} must be between 1 and {MAX_DIMENSION}, got {value}"),
                        ));
                    }
                }
                let rows = (0..args.rows)
                    .map(|ix| row(args.cols, args.header_row && ix == 0))
                    .collect();
                let table = Node::element("table", Attrs::new(), rows);
                insert_block(editor, table, "command:table.insert")
            })
            .description("Insert an empty table.")
            .keywords(["table", "grid"])
            .args_example(serde_json::json!({ "rows": 3, "cols": 3, "header_row": true })),
            CommandSpec::new("table.insert_row_below", "Insert row below", |editor, _args| {
                let at = cell_at_caret(editor)?;
                let cells = at.row_len(editor.doc());
                let row_path = child_path(&at.table, at.row + 1);
                edit_table(editor, "command:table.insert_row_below", |tx| {
                    tx.push(Op::InsertNode {
                        path: row_path.clone(),
                        node: row(cells, false),
                    })?;
                    Ok(row_path.clone())
                })
            })
            .keywords(["table", "row"]),
            CommandSpec::new("table.insert_col_right", "Insert column right", |editor, _args| {
                let at = cell_at_caret(editor)?;
                let rows = at.rows(editor.doc());
                edit_table(editor, "command:table.insert_col_right", |tx| {
                    for (row_ix, row) in rows.iter().enumerate() {
                        let header = row
                            .get(at.col)
                            .and_then(|cell| cell.attrs())
                            .and_then(|attrs| attrs.get("header"))
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        let col = (at.col + 1).min(row.len());
                        tx.push(Op::InsertNode {
                            path: child_path(&child_path(&at.table, row_ix), col),
                            node: cell(header),
                        })?;
                    }
                    Ok(child_path(&child_path(&at.table, at.row), at.col + 1))
                })
            })
            .keywords(["table", "column"]),
            CommandSpec::new("table.delete_row", "Delete row", |editor, _args| {
                let at = cell_at_caret(editor)?;
                let rows = at.rows(editor.doc()).len();
                if rows <= 1 {
                    return delete_table(editor, &at.table);
                }
                edit_table(editor, "command:table.delete_row", |tx| {
                    tx.push(Op::RemoveNode {
                        path: child_path(&at.table, at.row),
                    })?;
                    Ok(child_path(&at.table, at.row.min(rows - 2)))
                })
            })
            .keywords(["table", "row", "remove"]),
            CommandSpec::new("table.delete_col", "Delete column", |editor, _args| {
                let at = cell_at_caret(editor)?;
                let rows = at.rows(editor.doc());
                if at.row_len(editor.doc()) <= 1 {
                    return delete_table(editor, &at.table);
                }
                edit_table(editor, "command:table.delete_col", |tx| {
                    for (row_ix, row) in rows.iter().enumerate() {
                        if at.col < row.len() {
                            tx.push(Op::RemoveNode {
                                path: child_path(&child_path(&at.table, row_ix), at.col),
                            })?;
                        }
                    }
                    let col = at.col.min(rows[at.row].len().saturating_sub(2));
                    Ok(child_path(&child_path(&at.table, at.row), col))
                })
            })
            .keywords(["table", "column", "remove"]),
            CommandSpec::new("table.delete_table", "Delete table", |editor, _args| {
                let at = cell_at_caret(editor)?;
                delete_table(editor, &at.table)
            })
            .keywords(["table", "remove"]),
        ]
    }
}

/// Where the caret sits inside a table.
struct CellAt {
    table: Path,
    row: usize,
    col: usize,
}

impl CellAt {
    /// The cells of every row.
    fn rows(&self, doc: &Document) -> Vec<Vec<Node>> {
        children_at(doc, &self.table)
            .unwrap_or_default()
            .iter()
            .map(|row| row.children().to_vec())
            .collect()
    }

    fn row_len(&self, doc: &Document) -> usize {
        doc.node(&child_path(&self.table, self.row))
            .map_or(0, |row| row.children().len())
    }
}

fn cell_at_caret(editor: &Editor) -> Result<CellAt, CommandError> {
    let cell = focus_block_path(editor)
        .and_then(|block| ancestor_element_path(editor.doc(), &block, "table_cell"))
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a table"))?;
    match cell.as_slice() {
        [table @ .., row, col] if !table.is_empty() => Ok(CellAt {
            table: table.to_vec(),
            row: *row,
            col: *col,
        }),
        _ => Err(CommandError::not_applicable("The caret is not in a table")),
    }
}

/// Runs `edit` in a builder and moves the caret to the start of the node
/// whose path it returns.
fn edit_table(
    editor: &mut Editor,
    source: &str,
    edit: impl FnOnce(&mut TxBuilder<'_>) -> Result<Path, CommandError>,
) -> Result<(), CommandError> {
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    let caret_at = edit(&mut tx)?;
    let tx = match first_point_in(tx.doc(), &caret_at) {
        Some(point) => tx.finish_with(Selection::collapsed(point)),
        None => tx.finish(),
    };
    editor.apply(tx.source(source))?;
    Ok(())
}

fn delete_table(editor: &mut Editor, table: &[usize]) -> Result<(), CommandError> {
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    let (_, parent) = table
        .split_last()
        .ok_or_else(|| CommandError::not_applicable("The caret is not in a table"))?;
    let only_child = children_at(editor.doc(), parent).is_some_and(|children| children.len() == 1);
    tx.push(Op::RemoveNode {
        path: table.to_vec(),
    })?;
    if only_child {
        tx.push(Op::InsertNode {
            path: table.to_vec(),
            node: Node::paragraph(""),
        })?;
    }
    let tx = match first_point_in(tx.doc(), table) {
        Some(point) => tx.finish_with(Selection::collapsed(point)),
        None => tx.finish(),
    };
    editor.apply(tx.source("command:table.delete_table"))?;
    Ok(())
}

/// Short rows get empty cells so every row has as many cells as the widest.
struct PadTableRows;

impl NormalizePass for PadTableRows {
    fn id(&self) -> &'static str {
        "table.pad_rows"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Path, out: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                if el.kind == "table" {
                    let width = el.children.iter().map(|row| row.children().len()).max();
                    for (row_ix, row) in el.children.iter().enumerate() {
                        let len = row.children().len();
                        for col in len..width.unwrap_or(len) {
                            out.push(Op::InsertNode {
                                path: child_path(&child_path(path, row_ix), col),
                                node: cell(false),
                            });
                        }
                    }
                }
                walk(&el.children, path, out);
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}
