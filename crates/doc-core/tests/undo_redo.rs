use blockdoc_core::{
    Document, Editor, EditorConfig, Node, Op, PluginRegistry, Point, Selection, Transaction,
};

fn paragraph_editor(text: &str) -> Editor {
    Editor::new(
        Document {
            children: vec![Node::paragraph(text)],
        },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
    .unwrap()
}

#[test]
fn undo_redo_roundtrip_for_multi_op_transaction() {
    let mut editor = paragraph_editor("");
    let tx = Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "a".to_string(),
        },
        Op::InsertText {
            path: vec![0, 0],
            offset: 1,
            text: "b".to_string(),
        },
    ])
    .source("test:insert");

    editor.apply(tx).unwrap();
    assert_eq!(editor.doc().children[0].text_content(), "ab");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 2));

    assert!(editor.undo());
    assert_eq!(editor.doc(), &Document::empty());
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));

    assert!(editor.redo());
    assert_eq!(editor.doc().children[0].text_content(), "ab");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 2));
}

#[test]
fn undo_and_redo_on_empty_history_do_nothing() {
    let mut editor = Editor::with_richtext_plugins();
    assert!(!editor.can_undo());
    assert!(!editor.can_redo());
    assert!(!editor.undo());
    assert!(!editor.redo());
    assert_eq!(editor.doc(), &Document::empty());
}

#[test]
fn new_transaction_clears_redo() {
    let mut editor = paragraph_editor("");
    editor
        .run_command("core.insert_text", Some(serde_json::json!({ "text": "a" })))
        .unwrap();
    assert!(editor.undo());
    assert!(editor.can_redo());

    editor
        .run_command("core.insert_text", Some(serde_json::json!({ "text": "z" })))
        .unwrap();
    assert!(!editor.can_redo());
    assert_eq!(editor.doc().children[0].text_content(), "z");
}

#[test]
fn history_is_bounded_by_max_undo() {
    let mut editor = paragraph_editor("").with_config(EditorConfig {
        max_undo: 2,
        ..Default::default()
    });
    for text in ["a", "b", "c"] {
        editor
            .run_command("core.insert_text", Some(serde_json::json!({ "text": text })))
            .unwrap();
    }
    assert_eq!(editor.doc().children[0].text_content(), "abc");

    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(editor.doc().children[0].text_content(), "a");
}

#[test]
fn split_block_undo_restores_single_paragraph() {
    let mut editor = paragraph_editor("hello");
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 2)));
    editor.run_command("core.split_block", None).unwrap();

    assert_eq!(editor.doc().children.len(), 2);
    assert_eq!(editor.doc().children[0].text_content(), "he");
    assert_eq!(editor.doc().children[1].text_content(), "llo");
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 0));
    let after_split = editor.doc().clone();

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("hello")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 2));

    assert!(editor.redo());
    assert_eq!(editor.doc(), &after_split);
}

#[test]
fn undo_reverts_normalization_together_with_the_edit() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("one"), Node::paragraph("two")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 3)),
        PluginRegistry::richtext(),
    )
    .unwrap();
    editor.run_command("list.toggle_bulleted", None).unwrap();
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    editor.run_command("list.toggle_bulleted", None).unwrap();

    // The second list merged into the first one.
    assert_eq!(editor.doc().children.len(), 1);
    assert_eq!(editor.doc().children[0].children().len(), 2);

    assert!(editor.undo());
    assert_eq!(editor.doc().children.len(), 2);
    assert_eq!(editor.doc().children[0].kind(), "bulleted_list");
    assert_eq!(editor.doc().children[1], Node::paragraph("two"));
}
