use blockdoc_core::markup::{DecodeWarning, decode, decode_with_report, encode};
use blockdoc_core::plain_text::{lossy_blocks, to_plain_text};
use blockdoc_core::{Editor, Node, PluginRegistry, Point, RegistryError, Selection};
use serde_json::json;

fn editor() -> Editor {
    Editor::empty(blockdoc_extensions::registry())
}

fn run(editor: &mut Editor, id: &str, args: serde_json::Value) {
    editor
        .run_command(id, Some(args))
        .unwrap_or_else(|err| panic!("{id}: {err}"));
}

#[test]
fn intro_and_faq_survive_encode_then_decode() {
    let mut editor = editor();
    run(&mut editor, "block.insert_heading", json!({ "level": 2, "text": "Intro" }));
    run(&mut editor, "accordion.insert", json!({ "title": "FAQ" }));

    let markup = encode(editor.doc(), editor.registry());
    assert_eq!(
        markup,
        "<h2>Intro</h2><div data-type=\"accordion\" data-title=\"FAQ\" data-open=\"true\"><p></p></div>"
    );

    let decoded = decode(&markup, editor.registry()).unwrap();
    assert_eq!(decoded.children.len(), 2);
    let Node::Element(heading) = &decoded.children[0] else {
        panic!("expected a heading element");
    };
    assert_eq!(heading.kind, "heading");
    assert_eq!(heading.attrs.get("level"), Some(&json!(2)));
    let Node::Element(accordion) = &decoded.children[1] else {
        panic!("expected an accordion element");
    };
    assert_eq!(accordion.kind, "accordion");
    assert_eq!(accordion.attrs.get("title"), Some(&json!("FAQ")));
    assert_eq!(accordion.children, vec![Node::paragraph("")]);
    assert_eq!(&decoded, editor.doc());
}

#[test]
fn every_extension_block_round_trips_through_markup() {
    let mut editor = editor();
    run(&mut editor, "accordion.insert", json!({ "title": "More", "open": false }));
    run(&mut editor, "core.insert_text", json!({ "text": "inside" }));
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0], 6)));
    run(&mut editor, "tabs.insert", json!({ "labels": ["One", "Two"] }));
    run(&mut editor, "timeline.insert", json!({ "items": [{ "date": "2024", "title": "Start" }] }));
    run(&mut editor, "card_grid.insert", json!({ "columns": 2 }));
    run(
        &mut editor,
        "chart.insert",
        json!({
            "chart_type": "line",
            "title": "Visits",
            "data": { "labels": ["Mon", "Tue"], "series": [{ "name": "web", "values": [1.5, 2] }] }
        }),
    );
    run(&mut editor, "diagram.insert", json!({ "source": "graph TD; A-->B" }));
    run(&mut editor, "image_compare.insert", json!({ "before": "a.png", "after": "b.png" }));

    let markup = encode(editor.doc(), editor.registry());
    let decoded = decode_with_report(&markup, editor.registry()).unwrap();
    assert!(decoded.warnings.is_empty(), "{:?}", decoded.warnings);
    assert_eq!(&decoded.document, editor.doc());
}

#[test]
fn unknown_extension_is_kept_verbatim_by_a_plain_registry() {
    let mut editor = editor();
    run(&mut editor, "accordion.insert", json!({ "title": "FAQ" }));
    let markup = encode(editor.doc(), editor.registry());

    let plain = PluginRegistry::richtext();
    let decoded = decode_with_report(&markup, &plain).unwrap();
    assert!(matches!(decoded.document.children[0], Node::Opaque(_)));
    assert_eq!(
        decoded.warnings,
        vec![DecodeWarning::UnknownBlock {
            tag: "div".to_string(),
            data_type: Some("accordion".to_string()),
        }]
    );
    assert_eq!(encode(&decoded.document, &plain), markup);
}

#[test]
fn tabs_holding_a_panel_kind_from_a_newer_build_still_load() {
    let registry = blockdoc_extensions::registry();
    let input = "<p>ok</p><div data-type=\"tabs\" data-active=\"0\">\
                 <div data-type=\"tab_panel\" data-label=\"A\"><p>x</p></div>\
                 <div data-type=\"future_panel_kind\"></div></div>";
    let decoded = decode_with_report(input, &registry).unwrap();

    assert_eq!(decoded.document.children.len(), 2);
    let Node::Opaque(tabs) = &decoded.document.children[1] else {
        panic!("expected the tab group to stay opaque");
    };
    assert_eq!(tabs.label(), "tabs");
    assert!(matches!(
        decoded.warnings.last(),
        Some(DecodeWarning::UnfitContent { kind, .. }) if kind == "tabs"
    ));
    assert_eq!(encode(&decoded.document, &registry), input);
}

#[test]
fn simple_mode_flattens_containers_and_tokenizes_atomic_blocks() {
    let mut editor = editor();
    run(&mut editor, "block.insert_heading", json!({ "level": 2, "text": "Intro" }));
    run(&mut editor, "accordion.insert", json!({ "title": "FAQ" }));
    run(&mut editor, "core.insert_text", json!({ "text": "Answer" }));
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 0)));
    run(&mut editor, "chart.insert", json!({}));

    // The chart lands after the heading, the accordion moves down.
    let registry = editor.registry();
    assert_eq!(
        to_plain_text(editor.doc(), registry),
        "## Intro\n\n[[block:chart]]\n\nAnswer\n"
    );
    assert_eq!(lossy_blocks(editor.doc(), registry), vec![vec![1], vec![2]]);
}

#[test]
fn registering_extensions_twice_is_rejected() {
    let mut registry = blockdoc_extensions::registry();
    assert_eq!(
        blockdoc_extensions::register_all(&mut registry).unwrap_err(),
        RegistryError::DuplicateNodeType("accordion".to_string())
    );
}
