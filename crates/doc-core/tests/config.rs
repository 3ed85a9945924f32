use blockdoc_core::{Document, DocumentValue, Editor, EditorConfig, Node, ValueError};

#[test]
fn zero_and_missing_settings_fall_back_to_defaults() {
    let config = EditorConfig::from_json_str(r#"{ "max_undo": 0 }"#).unwrap();
    assert_eq!(config, EditorConfig::default());

    let config = EditorConfig::from_json_str(r#"{ "max_undo": 5 }"#).unwrap();
    assert_eq!(config.max_undo, 5);
    assert_eq!(config.max_normalize_iterations, 100);

    assert!(EditorConfig::from_json_str(r#"{ "max_undo": "lots" }"#).is_err());
}

#[test]
fn configured_history_limit_applies() {
    let mut editor = Editor::with_richtext_plugins().with_config(EditorConfig {
        max_undo: 1,
        ..EditorConfig::default()
    });
    for text in ["a", "b"] {
        editor
            .run_command("core.insert_text", Some(serde_json::json!({ "text": text })))
            .unwrap();
    }
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);
}

#[test]
fn document_value_round_trips_through_json() {
    let value = DocumentValue::from_document(Document {
        children: vec![Node::paragraph("saved"), Node::divider()],
    });
    let json = value.to_json_pretty().unwrap();
    assert!(json.contains("\"schema\": \"blockdoc\""));

    let parsed = DocumentValue::from_json_str(&json).unwrap();
    assert_eq!(parsed, value);
    assert_eq!(parsed.into_document().children.len(), 2);
}

#[test]
fn document_value_without_envelope_fields_uses_current_version() {
    let parsed = DocumentValue::from_json_str(r#"{ "document": { "children": [] } }"#).unwrap();
    assert_eq!(parsed.schema, "blockdoc");
    assert_eq!(parsed.version, 1);
}

#[test]
fn document_value_refuses_foreign_or_newer_envelopes() {
    let err = DocumentValue::from_json_str(
        r#"{ "schema": "other", "version": 1, "document": { "children": [] } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ValueError::UnknownSchema(name) if name == "other"));

    let err = DocumentValue::from_json_str(
        r#"{ "schema": "blockdoc", "version": 7, "document": { "children": [] } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ValueError::UnsupportedVersion { found: 7 }));

    assert!(matches!(
        DocumentValue::from_json_str("not json"),
        Err(ValueError::Json(_))
    ));
}
