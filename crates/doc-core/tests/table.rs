use blockdoc_core::{CommandError, Editor, Node, Point};

fn table(editor: &Editor) -> &Node {
    editor
        .doc()
        .children
        .iter()
        .find(|node| node.kind() == "table")
        .expect("document holds a table")
}

fn shape(editor: &Editor) -> Vec<usize> {
    table(editor)
        .children()
        .iter()
        .map(|row| row.children().len())
        .collect()
}

fn header_flags(row: &Node) -> Vec<bool> {
    row.children()
        .iter()
        .map(|cell| {
            cell.attrs()
                .and_then(|attrs| attrs.get("header"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        })
        .collect()
}

fn inserted(rows: usize, cols: usize, header_row: bool) -> Editor {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .run_command(
            "table.insert",
            Some(serde_json::json!({ "rows": rows, "cols": cols, "header_row": header_row })),
        )
        .unwrap();
    editor
}

#[test]
fn insert_table_replaces_empty_paragraph() {
    let editor = inserted(2, 3, true);
    assert_eq!(editor.doc().children.len(), 1);
    assert_eq!(shape(&editor), vec![3, 3]);

    let rows = table(&editor).children();
    assert_eq!(header_flags(&rows[0]), vec![true, true, true]);
    assert_eq!(header_flags(&rows[1]), vec![false, false, false]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0, 0, 0, 0], 0));
}

#[test]
fn insert_table_after_non_empty_paragraph() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .run_command("core.insert_text", Some(serde_json::json!({ "text": "above" })))
        .unwrap();
    editor
        .run_command("table.insert", Some(serde_json::json!({ "rows": 1, "cols": 1 })))
        .unwrap();
    assert_eq!(editor.doc().children.len(), 2);
    assert_eq!(editor.doc().children[0], Node::paragraph("above"));
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0, 0, 0, 0], 0));
}

#[test]
fn insert_table_rejects_bad_dimensions() {
    let mut editor = Editor::with_richtext_plugins();
    for (rows, cols) in [(0, 2), (2, 0), (101, 1)] {
        let err = editor
            .run_command(
                "table.insert",
                Some(serde_json::json!({ "rows": rows, "cols": cols })),
            )
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgs { .. }));
    }
    assert!(!editor.can_undo());
}

#[test]
fn row_and_column_edits_keep_the_table_rectangular() {
    let mut editor = inserted(2, 2, false);

    editor.run_command("table.insert_row_below", None).unwrap();
    assert_eq!(shape(&editor), vec![2, 2, 2]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1, 0, 0, 0], 0));

    editor.run_command("table.insert_col_right", None).unwrap();
    assert_eq!(shape(&editor), vec![3, 3, 3]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1, 1, 0, 0], 0));

    editor.run_command("table.delete_col", None).unwrap();
    assert_eq!(shape(&editor), vec![2, 2, 2]);

    editor.run_command("table.delete_row", None).unwrap();
    assert_eq!(shape(&editor), vec![2, 2]);
}

#[test]
fn new_column_copies_header_flag_of_its_row() {
    let mut editor = inserted(2, 1, true);
    editor.run_command("table.insert_col_right", None).unwrap();

    let rows = table(&editor).children();
    assert_eq!(header_flags(&rows[0]), vec![true, true]);
    assert_eq!(header_flags(&rows[1]), vec![false, false]);
}

#[test]
fn deleting_the_last_row_removes_the_table() {
    let mut editor = inserted(1, 2, false);
    editor.run_command("table.delete_row", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));
}

#[test]
fn table_commands_outside_a_table_are_not_applicable() {
    let mut editor = Editor::with_richtext_plugins();
    for id in [
        "table.insert_row_below",
        "table.insert_col_right",
        "table.delete_row",
        "table.delete_col",
        "table.delete_table",
    ] {
        let err = editor.run_command(id, None).unwrap_err();
        assert!(matches!(err, CommandError::NotApplicable(_)), "{id}");
    }
}

#[test]
fn short_rows_are_padded_on_load() {
    let registry = blockdoc_core::PluginRegistry::richtext();
    let doc = blockdoc_core::markup::decode(
        "<table><tr><td><p>a</p></td><td><p>b</p></td></tr><tr><td><p>c</p></td></tr></table>",
        &registry,
    )
    .unwrap();
    let mut editor = Editor::with_richtext_plugins();
    editor.load(doc).unwrap();
    assert_eq!(shape(&editor), vec![2, 2]);
}

#[test]
fn undo_restores_deleted_table() {
    let mut editor = inserted(2, 2, false);
    let with_table = editor.doc().clone();
    editor.run_command("table.delete_table", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);

    assert!(editor.undo());
    assert_eq!(editor.doc(), &with_table);
}
