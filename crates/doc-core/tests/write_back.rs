use blockdoc_core::{
    ApplyError, Attrs, Document, Editor, Node, Op, PluginRegistry, Point, Selection, Transaction,
    WriteBackOutcome,
};
use serde_json::json;

fn image(src: &str) -> Node {
    let mut attrs = Attrs::new();
    attrs.insert("src".to_string(), json!(src));
    Node::void("image", attrs)
}

fn alt(value: &str) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("alt".to_string(), json!(value));
    attrs
}

fn editor() -> Editor {
    Editor::new(
        Document {
            children: vec![Node::paragraph("intro"), image("a.png"), Node::paragraph("outro")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
    .unwrap()
}

fn alt_at(editor: &Editor, ix: usize) -> serde_json::Value {
    editor.doc().children[ix]
        .attrs()
        .and_then(|attrs| attrs.get("alt"))
        .cloned()
        .unwrap_or_default()
}

#[test]
fn completed_write_back_is_one_undoable_step() {
    let mut editor = editor();
    let ticket = editor.begin_write_back(&[1]).unwrap();
    assert_eq!(ticket.kind, "image");
    assert_eq!(ticket.snapshot.get("src"), Some(&json!("a.png")));

    assert_eq!(editor.complete_write_back(&ticket, alt("described")), WriteBackOutcome::Applied);
    assert_eq!(alt_at(&editor, 1), json!("described"));

    assert!(editor.undo());
    assert_eq!(alt_at(&editor, 1), json!(""));
}

#[test]
fn newer_request_supersedes_older_one() {
    let mut editor = editor();
    let first = editor.begin_write_back(&[1]).unwrap();
    let second = editor.begin_write_back(&[1]).unwrap();
    assert_eq!(first.handle, second.handle);
    assert!(second.generation > first.generation);

    // The slow first result arrives after the second was requested.
    assert_eq!(editor.complete_write_back(&first, alt("old")), WriteBackOutcome::Superseded);
    assert_eq!(alt_at(&editor, 1), json!(""));
    assert_eq!(editor.complete_write_back(&second, alt("new")), WriteBackOutcome::Applied);
    assert_eq!(alt_at(&editor, 1), json!("new"));
}

#[test]
fn ticket_follows_its_node_through_edits() {
    let mut editor = editor();
    let ticket = editor.begin_write_back(&[1]).unwrap();

    editor
        .apply(Transaction::new(vec![Op::InsertNode {
            path: vec![0],
            node: Node::paragraph("new first"),
        }]))
        .unwrap();
    assert_eq!(editor.tracked_path(ticket.handle), Some(vec![2]));

    assert_eq!(editor.complete_write_back(&ticket, alt("moved")), WriteBackOutcome::Applied);
    assert_eq!(alt_at(&editor, 2), json!("moved"));
    assert_eq!(alt_at(&editor, 1), json!(null));
}

#[test]
fn undo_moves_tracked_path_back() {
    let mut editor = editor();
    let ticket = editor.begin_write_back(&[1]).unwrap();
    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0] }]))
        .unwrap();
    assert_eq!(editor.tracked_path(ticket.handle), Some(vec![0]));

    assert!(editor.undo());
    assert_eq!(editor.tracked_path(ticket.handle), Some(vec![1]));
}

#[test]
fn removed_node_cannot_be_written() {
    let mut editor = editor();
    let ticket = editor.begin_write_back(&[1]).unwrap();
    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![1] }]))
        .unwrap();
    assert_eq!(editor.tracked_path(ticket.handle), None);

    let before = editor.doc().clone();
    assert_eq!(editor.complete_write_back(&ticket, alt("late")), WriteBackOutcome::TargetGone);
    assert_eq!(editor.doc(), &before);
}

#[test]
fn cancelled_request_is_discarded() {
    let mut editor = editor();
    let ticket = editor.begin_write_back(&[1]).unwrap();
    editor.cancel_write_back(&ticket);
    assert_eq!(editor.complete_write_back(&ticket, alt("late")), WriteBackOutcome::Superseded);
    assert!(!editor.can_undo());
}

#[test]
fn attributes_outside_the_schema_are_rejected() {
    let mut editor = editor();
    let ticket = editor.begin_write_back(&[1]).unwrap();
    let mut bogus = Attrs::new();
    bogus.insert("caption".to_string(), json!("nope"));

    let outcome = editor.complete_write_back(&ticket, bogus);
    assert!(matches!(outcome, WriteBackOutcome::Rejected(ApplyError::Content(_))));
    assert!(!editor.can_undo());
}

#[test]
fn text_runs_and_missing_paths_cannot_be_tracked() {
    let mut editor = editor();
    assert!(matches!(
        editor.begin_write_back(&[0, 0]),
        Err(ApplyError::InvalidPath(_))
    ));
    assert!(matches!(
        editor.begin_write_back(&[9]),
        Err(ApplyError::InvalidPath(_))
    ));
}
