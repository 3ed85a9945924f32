use blockdoc_core::{
    Attrs, CommandError, Document, Editor, Marks, Node, PluginRegistry, Point, Selection,
    TextNode,
};

fn editor_with(children: Vec<Node>, selection: Selection) -> Editor {
    Editor::new(Document { children }, selection, PluginRegistry::richtext()).unwrap()
}

fn caret(path: Vec<usize>, offset: usize) -> Selection {
    Selection::collapsed(Point::new(path, offset))
}

#[test]
fn typing_replaces_the_selection() {
    let mut editor = editor_with(
        vec![Node::paragraph("hello world")],
        Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 5)),
    );
    editor
        .run_command("core.insert_text", Some(serde_json::json!({ "text": "goodbye" })))
        .unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("goodbye world")]);
    assert_eq!(editor.selection(), &caret(vec![0, 0], 7));

    // One transaction: a single undo brings the old text back.
    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("hello world")]);
}

#[test]
fn insert_text_requires_text_argument() {
    let mut editor = Editor::with_richtext_plugins();
    let err = editor.run_command("core.insert_text", None).unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgs { .. }));
}

#[test]
fn typing_inside_a_marked_run_keeps_its_marks() {
    let bold = Marks::new().with("bold", Attrs::new());
    let mut editor = editor_with(
        vec![Node::element(
            "paragraph",
            Attrs::new(),
            vec![Node::Text(TextNode::marked("bold", bold.clone()))],
        )],
        caret(vec![0, 0], 2),
    );
    editor
        .run_command("core.insert_text", Some(serde_json::json!({ "text": "--" })))
        .unwrap();
    assert_eq!(
        editor.doc().children[0].children(),
        &[Node::Text(TextNode::marked("bo--ld", bold))]
    );
}

#[test]
fn backspace_removes_a_whole_multibyte_character() {
    let mut editor = editor_with(vec![Node::paragraph("naïve")], caret(vec![0, 0], 4));
    editor.run_command("core.delete_backward", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("nave")]);
    assert_eq!(editor.selection(), &caret(vec![0, 0], 2));
}

#[test]
fn backspace_at_run_start_deletes_from_previous_run() {
    let bold = Marks::new().with("bold", Attrs::new());
    let mut editor = editor_with(
        vec![Node::element(
            "paragraph",
            Attrs::new(),
            vec![
                Node::Text(TextNode::marked("ab", bold.clone())),
                Node::text("cd"),
            ],
        )],
        caret(vec![0, 1], 0),
    );
    editor.run_command("core.delete_backward", None).unwrap();
    assert_eq!(
        editor.doc().children[0].children(),
        &[Node::Text(TextNode::marked("a", bold)), Node::text("cd")]
    );
}

#[test]
fn backspace_at_block_start_merges_into_previous_block() {
    let mut editor = editor_with(
        vec![Node::paragraph("one"), Node::paragraph("two")],
        caret(vec![1, 0], 0),
    );
    editor.run_command("core.delete_backward", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("onetwo")]);
    assert_eq!(editor.selection(), &caret(vec![0, 0], 3));
}

#[test]
fn backspace_at_document_start_is_not_applicable() {
    let mut editor = editor_with(vec![Node::paragraph("one")], caret(vec![0, 0], 0));
    let err = editor.run_command("core.delete_backward", None).unwrap_err();
    assert!(matches!(err, CommandError::NotApplicable(_)));
    assert!(!editor.can_undo());
}

#[test]
fn backspace_on_selected_divider_removes_it() {
    let mut editor = editor_with(
        vec![Node::paragraph("a"), Node::divider(), Node::paragraph("b")],
        caret(vec![1], 0),
    );
    editor.run_command("core.delete_backward", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("a"), Node::paragraph("b")]
    );
}

#[test]
fn enter_at_start_leaves_an_empty_block_behind() {
    let mut editor = editor_with(vec![Node::paragraph("text")], caret(vec![0, 0], 0));
    editor.run_command("core.split_block", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph(""), Node::paragraph("text")]
    );
    assert_eq!(editor.selection(), &caret(vec![1, 0], 0));
}

#[test]
fn enter_over_a_selection_deletes_it_first() {
    let mut editor = editor_with(
        vec![Node::paragraph("abcdef")],
        Selection::new(Point::new(vec![0, 0], 2), Point::new(vec![0, 0], 4)),
    );
    editor.run_command("core.split_block", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("ab"), Node::paragraph("ef")]
    );
}

#[test]
fn split_keeps_marks_on_both_sides() {
    let italic = Marks::new().with("italic", Attrs::new());
    let mut editor = editor_with(
        vec![Node::element(
            "paragraph",
            Attrs::new(),
            vec![Node::Text(TextNode::marked("abcd", italic.clone()))],
        )],
        caret(vec![0, 0], 2),
    );
    editor.run_command("core.split_block", None).unwrap();
    assert_eq!(
        editor.doc().children[1].children(),
        &[Node::Text(TextNode::marked("cd", italic))]
    );
}

#[test]
fn insert_paragraph_goes_after_current_block() {
    let mut editor = editor_with(
        vec![Node::paragraph("first"), Node::paragraph("last")],
        caret(vec![0, 0], 1),
    );
    editor
        .run_command("core.insert_paragraph", Some(serde_json::json!({ "text": "middle" })))
        .unwrap();
    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("first"),
            Node::paragraph("middle"),
            Node::paragraph("last"),
        ]
    );
    assert_eq!(editor.selection(), &caret(vec![1, 0], 6));
}

#[test]
fn deleting_across_a_divider_removes_it() {
    let mut editor = editor_with(
        vec![Node::paragraph("abc"), Node::divider(), Node::paragraph("xyz")],
        Selection::new(Point::new(vec![0, 0], 2), Point::new(vec![2, 0], 1)),
    );
    editor.run_command("core.delete_selection", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("abyz")]);
    assert_eq!(editor.selection(), &caret(vec![0, 0], 2));
}
