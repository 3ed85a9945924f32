use blockdoc_core::{Document, Editor, Node, Op, PluginRegistry, Point, Selection, Transaction};

fn editor_with(children: Vec<Node>, selection: Selection) -> Editor {
    Editor::new(Document { children }, selection, PluginRegistry::richtext()).unwrap()
}

#[test]
fn delete_selection_collapses_to_start_and_typing_continues_there() {
    let mut editor = editor_with(
        vec![Node::paragraph("hello world")],
        Selection::new(Point::new(vec![0, 0], 2), Point::new(vec![0, 0], 8)),
    );

    editor.run_command("core.delete_selection", None).unwrap();
    assert_eq!(editor.doc().children[0].text_content(), "herld");
    assert_eq!(
        editor.selection(),
        &Selection::collapsed(Point::new(vec![0, 0], 2))
    );

    editor
        .run_command("core.insert_text", Some(serde_json::json!({ "text": "X" })))
        .unwrap();
    assert_eq!(editor.doc().children[0].text_content(), "heXrld");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));
}

#[test]
fn backwards_selection_deletes_the_same_range() {
    let mut editor = editor_with(
        vec![Node::paragraph("hello world")],
        Selection::new(Point::new(vec![0, 0], 8), Point::new(vec![0, 0], 2)),
    );
    editor.run_command("core.delete_selection", None).unwrap();
    assert_eq!(editor.doc().children[0].text_content(), "herld");
}

#[test]
fn caret_inside_removed_text_moves_to_range_start() {
    let mut editor = editor_with(
        vec![Node::paragraph("abcdefgh")],
        Selection::collapsed(Point::new(vec![0, 0], 4)),
    );
    editor
        .apply(Transaction::new(vec![Op::RemoveText {
            path: vec![0, 0],
            range: 1..5,
        }]))
        .unwrap();
    assert_eq!(editor.doc().children[0].text_content(), "afgh");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 1));
}

#[test]
fn caret_after_removed_text_shifts_left() {
    let mut editor = editor_with(
        vec![Node::paragraph("abcdefgh")],
        Selection::collapsed(Point::new(vec![0, 0], 7)),
    );
    editor
        .apply(Transaction::new(vec![Op::RemoveText {
            path: vec![0, 0],
            range: 1..5,
        }]))
        .unwrap();
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));
}

#[test]
fn delete_across_blocks_merges_first_and_last() {
    let mut editor = editor_with(
        vec![
            Node::paragraph("abc"),
            Node::paragraph("middle"),
            Node::paragraph("xyz"),
        ],
        Selection::new(Point::new(vec![0, 0], 1), Point::new(vec![2, 0], 2)),
    );
    editor.run_command("core.delete_selection", None).unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("az")]);
    assert_eq!(
        editor.selection(),
        &Selection::collapsed(Point::new(vec![0, 0], 1))
    );
}

#[test]
fn inserting_a_block_before_the_caret_shifts_it() {
    let mut editor = editor_with(
        vec![Node::paragraph("text")],
        Selection::collapsed(Point::new(vec![0, 0], 2)),
    );
    editor
        .apply(Transaction::new(vec![Op::InsertNode {
            path: vec![0],
            node: Node::paragraph("before"),
        }]))
        .unwrap();
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 2));
}

#[test]
fn removing_the_caret_block_moves_caret_to_the_next_one() {
    let mut editor = editor_with(
        vec![Node::paragraph("one"), Node::paragraph("two")],
        Selection::collapsed(Point::new(vec![0, 0], 2)),
    );
    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0] }]))
        .unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("two")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));
}

#[test]
fn out_of_range_selection_is_clamped() {
    let mut editor = editor_with(
        vec![Node::paragraph("short")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );
    editor.set_selection(Selection::collapsed(Point::new(vec![3, 0], 99)));
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 5));
}

#[test]
fn select_all_spans_the_document() {
    let mut editor = editor_with(
        vec![Node::paragraph("one"), Node::divider(), Node::paragraph("three")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );
    editor.run_command("core.select_all", None).unwrap();
    assert_eq!(
        editor.selection(),
        &Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![2, 0], 5))
    );
    assert!(!editor.run_query::<bool>("selection.is_collapsed", None).unwrap());
}
