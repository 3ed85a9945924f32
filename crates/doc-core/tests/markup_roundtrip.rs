use blockdoc_core::markup::{DecodeError, DecodeWarning, decode, decode_with_report, encode};
use blockdoc_core::{
    Attrs, Document, Editor, Marks, Node, PluginRegistry, Point, Selection, TextNode,
};
use serde_json::json;

fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attrs {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn marked(text: &str, marks: &[(&str, Attrs)]) -> Node {
    let marks = marks
        .iter()
        .fold(Marks::new(), |m, (name, attrs)| m.with(*name, attrs.clone()));
    Node::Text(TextNode::marked(text, marks))
}

fn cell(header: bool, text: &str) -> Node {
    Node::element(
        "table_cell",
        attrs(&[("header", json!(header))]),
        vec![Node::paragraph(text)],
    )
}

fn item(text: &str) -> Node {
    Node::element("list_item", Attrs::new(), vec![Node::paragraph(text)])
}

/// A document using every built-in block type and most marks, normalized
/// the way an editor holds it.
fn rich_document() -> Document {
    let children = vec![
        Node::element("heading", attrs(&[("level", json!(2))]), vec![Node::text("Intro")]),
        Node::element(
            "paragraph",
            Attrs::new(),
            vec![
                Node::text("Plain, "),
                marked("bold italic", &[("bold", Attrs::new()), ("italic", Attrs::new())]),
                Node::text(" & "),
                marked(
                    "a <link>",
                    &[("link", attrs(&[("href", json!("https://example.com/?a=1&b=\"2\""))]))],
                ),
                Node::text("\nsecond line"),
            ],
        ),
        Node::element(
            "paragraph",
            Attrs::new(),
            vec![
                marked("big", &[("font_size", attrs(&[("size", json!(24))]))]),
                marked("red", &[("text_color", attrs(&[("color", json!("#f00"))]))]),
            ],
        ),
        Node::element("bulleted_list", Attrs::new(), vec![item("one"), item("two")]),
        Node::element(
            "ordered_list",
            attrs(&[("start", json!(3))]),
            vec![Node::element(
                "list_item",
                Attrs::new(),
                vec![
                    Node::paragraph("three"),
                    Node::element("bulleted_list", Attrs::new(), vec![item("nested")]),
                ],
            )],
        ),
        Node::element(
            "code_block",
            attrs(&[("language", json!("rust"))]),
            vec![Node::text("fn main() {\n    println!(\"<hi>\");\n}")],
        ),
        Node::element("blockquote", Attrs::new(), vec![Node::paragraph("quoted")]),
        Node::void(
            "image",
            attrs(&[("src", json!("https://example.com/cat.png")), ("alt", json!("A cat"))]),
        ),
        Node::divider(),
        Node::element(
            "table",
            Attrs::new(),
            vec![
                Node::element("table_row", Attrs::new(), vec![cell(true, "A"), cell(true, "B")]),
                Node::element("table_row", Attrs::new(), vec![cell(false, "1"), cell(false, "2")]),
            ],
        ),
        Node::paragraph(""),
    ];
    let editor = Editor::new(
        Document { children },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
    .unwrap();
    editor.doc().clone()
}

#[test]
fn rich_document_survives_encode_then_decode() {
    let registry = PluginRegistry::richtext();
    let doc = rich_document();

    let markup = encode(&doc, &registry);
    let decoded = decode(&markup, &registry).unwrap();
    assert_eq!(decoded, doc);
    assert_eq!(encode(&decoded, &registry), markup);
}

#[test]
fn encoding_uses_canonical_tags() {
    let registry = PluginRegistry::richtext();
    let markup = encode(&rich_document(), &registry);

    assert!(markup.starts_with("<h2>Intro</h2>"));
    assert!(markup.contains("<strong><em>bold italic</em></strong>"));
    assert!(markup.contains("<a href=\"https://example.com/?a=1&amp;b=&quot;2&quot;\">a &lt;link&gt;</a>"));
    assert!(markup.contains("Plain, "));
    assert!(markup.contains("<br>second line"));
    assert!(markup.contains("<ol start=\"3\">"));
    assert!(markup.contains("<pre data-language=\"rust\"><code>fn main() {\n"));
    assert!(markup.contains("<img src=\"https://example.com/cat.png\" alt=\"A cat\">"));
    assert!(markup.contains("<hr>"));
    assert!(markup.contains("<th><p>A</p></th>"));
    assert!(markup.contains("<td><p>2</p></td>"));
    assert!(markup.contains("<span data-mark=\"font_size\" data-size=\"24\">big</span>"));
}

#[test]
fn legacy_tag_aliases_decode_to_canonical_types() {
    let registry = PluginRegistry::richtext();
    let doc = decode(
        "<h3>T</h3><p><b>b</b><i>i</i><del>d</del></p><table><tbody><tr><th><p>h</p></th></tr></tbody></table>",
        &registry,
    )
    .unwrap();

    let heading = doc.children[0].as_element().unwrap();
    assert_eq!(heading.kind, "heading");
    assert_eq!(heading.attrs.get("level"), Some(&json!(3)));

    let names: Vec<Vec<&str>> = doc.children[1]
        .children()
        .iter()
        .filter_map(Node::as_text)
        .map(|run| run.marks.names().collect())
        .collect();
    assert_eq!(names, vec![vec!["bold"], vec!["italic"], vec!["strikethrough"]]);

    assert_eq!(
        encode(&doc, &registry),
        "<h3>T</h3><p><strong>b</strong><em>i</em><s>d</s></p><table><tr><th><p>h</p></th></tr></table>"
    );
}

#[test]
fn unknown_block_is_preserved_verbatim() {
    let registry = PluginRegistry::richtext();
    let input = "<p>a</p><div data-type=\"poll\" data-question=\"Tea?\"><p>yes</p></div><p>b</p>";
    let decoded = decode_with_report(input, &registry).unwrap();

    assert_eq!(decoded.document.children.len(), 3);
    let Node::Opaque(opaque) = &decoded.document.children[1] else {
        panic!("expected an opaque placeholder");
    };
    assert_eq!(opaque.label(), "poll");
    assert_eq!(
        decoded.warnings,
        vec![DecodeWarning::UnknownBlock {
            tag: "div".to_string(),
            data_type: Some("poll".to_string()),
        }]
    );
    assert_eq!(encode(&decoded.document, &registry), input);
}

#[test]
fn unknown_block_inside_a_narrow_container_keeps_the_container_opaque() {
    let registry = PluginRegistry::richtext();
    let input = "<p>before</p><ul><li>a</li><x-widget>b</x-widget></ul><p>after</p>";
    let decoded = decode_with_report(input, &registry).unwrap();

    let kinds: Vec<&str> = decoded.document.children.iter().map(Node::kind).collect();
    assert_eq!(kinds, vec!["paragraph", "opaque", "paragraph"]);
    let Node::Opaque(list) = &decoded.document.children[1] else {
        panic!("expected the list to stay opaque");
    };
    assert_eq!(list.label(), "ul");
    assert!(matches!(
        decoded.warnings.as_slice(),
        [
            DecodeWarning::UnknownBlock { tag, .. },
            DecodeWarning::UnfitContent { kind, .. },
        ] if tag == "x-widget" && kind == "bulleted_list"
    ));
    assert_eq!(encode(&decoded.document, &registry), input);
}

#[test]
fn unknown_table_part_keeps_the_table_opaque() {
    let registry = PluginRegistry::richtext();
    let input = "<table><caption>c</caption><tr><td>a</td></tr></table><p>ok</p>";
    let doc = decode(input, &registry).unwrap();
    assert_eq!(doc.children.len(), 2);
    assert!(matches!(&doc.children[0], Node::Opaque(table) if table.tag == "table"));
    assert_eq!(doc.children[1], Node::paragraph("ok"));

    // The loaded document is editable as usual.
    let editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![1, 0], 0)),
        PluginRegistry::richtext(),
    );
    assert!(editor.is_ok());
}

#[test]
fn unknown_block_inside_a_broad_container_stays_nested() {
    let registry = PluginRegistry::richtext();
    let decoded =
        decode_with_report("<blockquote><p>q</p><div data-type=\"poll\"></div></blockquote>", &registry)
            .unwrap();
    let quote = decoded.document.children[0].as_element().unwrap();
    assert_eq!(quote.kind, "blockquote");
    assert!(matches!(quote.children[1], Node::Opaque(_)));
    assert_eq!(decoded.warnings.len(), 1);
}

#[test]
fn unknown_inline_element_is_unwrapped_with_a_warning() {
    let registry = PluginRegistry::richtext();
    let decoded = decode_with_report("<p>x<blink>y</blink>z</p>", &registry).unwrap();
    assert_eq!(decoded.document.children, vec![Node::paragraph("xyz")]);
    assert_eq!(
        decoded.warnings,
        vec![DecodeWarning::UnknownInline {
            tag: "blink".to_string()
        }]
    );
}

#[test]
fn malformed_attribute_falls_back_to_default() {
    let registry = PluginRegistry::richtext();
    let decoded = decode_with_report("<ol start=\"many\"><li><p>x</p></li></ol>", &registry).unwrap();

    let list = decoded.document.children[0].as_element().unwrap();
    assert_eq!(list.attrs.get("start"), Some(&json!(1)));
    assert!(matches!(
        decoded.warnings.as_slice(),
        [DecodeWarning::MalformedAttr { kind, attr, raw }]
            if kind == "ordered_list" && attr == "start" && raw == "many"
    ));
}

#[test]
fn stray_text_between_blocks_becomes_a_paragraph() {
    let registry = PluginRegistry::richtext();
    let doc = decode("<hr>loose <strong>text</strong><p>after</p>", &registry).unwrap();
    assert_eq!(doc.children.len(), 3);
    assert_eq!(doc.children[1].kind(), "paragraph");
    assert_eq!(doc.children[1].text_content(), "loose text");
}

#[test]
fn empty_input_decodes_to_empty_paragraph() {
    let registry = PluginRegistry::richtext();
    assert_eq!(decode("", &registry).unwrap(), Document::empty());
    assert_eq!(decode("  \n ", &registry).unwrap(), Document::empty());
    assert_eq!(decode("<p></p>", &registry).unwrap(), Document::empty());
}

#[test]
fn broken_markup_is_an_error() {
    let registry = PluginRegistry::richtext();
    assert!(matches!(
        decode("<p>open", &registry),
        Err(DecodeError::UnclosedTag { .. })
    ));
    assert!(matches!(
        decode("<p>a</em></p>", &registry),
        Err(DecodeError::MismatchedTag { .. })
    ));
    assert!(matches!(
        decode("<ul><p>not an item</p></ul>", &registry),
        Err(DecodeError::Schema(_))
    ));
}
