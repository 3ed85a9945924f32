use blockdoc_core::plain_text::{from_plain_text, lossy_blocks, placeholder_token, to_plain_text};
use blockdoc_core::{
    Attrs, Document, Editor, Marks, Node, OpaqueNode, PluginRegistry, Point, Selection, TextNode,
};
use serde_json::json;

fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attrs {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn item(text: &str) -> Node {
    Node::element("list_item", Attrs::new(), vec![Node::paragraph(text)])
}

fn cell(header: bool, text: &str) -> Node {
    Node::element(
        "table_cell",
        attrs(&[("header", json!(header))]),
        vec![Node::paragraph(text)],
    )
}

fn normalized(children: Vec<Node>) -> Document {
    Editor::new(
        Document { children },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
    .unwrap()
    .doc()
    .clone()
}

/// Everything here has an exact plain-text spelling.
fn expressible_document() -> Document {
    normalized(vec![
        Node::element("heading", attrs(&[("level", json!(1))]), vec![Node::text("Title")]),
        Node::element(
            "paragraph",
            Attrs::new(),
            vec![
                Node::text("a "),
                Node::Text(TextNode::marked("b", Marks::new().with("bold", Attrs::new()))),
            ],
        ),
        Node::element("bulleted_list", Attrs::new(), vec![item("one"), item("two")]),
        Node::element("ordered_list", attrs(&[("start", json!(3))]), vec![item("x")]),
        Node::element(
            "code_block",
            attrs(&[("language", json!("rust"))]),
            vec![Node::text("let a;\nlet b;")],
        ),
        Node::element("blockquote", Attrs::new(), vec![Node::paragraph("q")]),
        Node::divider(),
        Node::void(
            "image",
            attrs(&[("src", json!("https://x/c.png")), ("alt", json!("A cat"))]),
        ),
        Node::element(
            "table",
            Attrs::new(),
            vec![
                Node::element("table_row", Attrs::new(), vec![cell(true, "A"), cell(true, "B")]),
                Node::element("table_row", Attrs::new(), vec![cell(false, "1"), cell(false, "2")]),
            ],
        ),
    ])
}

const EXPECTED: &str = "# Title

a **b**

- one
- two

3. x

```rust
let a;
let b;
```

> q

---

![A cat](https://x/c.png)

| A | B |
| --- | --- |
| 1 | 2 |
";

#[test]
fn renders_every_built_in_block() {
    let registry = PluginRegistry::richtext();
    assert_eq!(to_plain_text(&expressible_document(), &registry), EXPECTED);
}

#[test]
fn expressible_document_survives_render_then_parse() {
    let registry = PluginRegistry::richtext();
    let doc = expressible_document();
    assert_eq!(from_plain_text(&to_plain_text(&doc, &registry)), doc);
    assert!(lossy_blocks(&doc, &registry).is_empty());
}

#[test]
fn parses_inline_delimiters_and_links() {
    let doc = from_plain_text("plain *it* ~~gone~~ `co*de` [site](https://example.com)\n");
    let runs: Vec<(String, Vec<String>)> = doc.children[0]
        .children()
        .iter()
        .filter_map(Node::as_text)
        .map(|run| (run.text.clone(), run.marks.names().map(str::to_string).collect()))
        .collect();
    assert_eq!(
        runs,
        vec![
            ("plain ".to_string(), vec![]),
            ("it".to_string(), vec!["italic".to_string()]),
            (" ".to_string(), vec![]),
            ("gone".to_string(), vec!["strikethrough".to_string()]),
            (" ".to_string(), vec![]),
            ("co*de".to_string(), vec!["code".to_string()]),
            (" ".to_string(), vec![]),
            ("site".to_string(), vec!["link".to_string()]),
        ]
    );
}

#[test]
fn unmatched_delimiter_stays_literal() {
    let doc = from_plain_text("2 * 3 = 6");
    assert_eq!(doc.children, vec![Node::paragraph("2 * 3 = 6")]);
}

#[test]
fn paragraphs_that_look_like_syntax_come_back_as_paragraphs() {
    let registry = PluginRegistry::richtext();
    let doc = normalized(vec![
        Node::paragraph("# not a heading"),
        Node::paragraph("2*3*4 - x"),
        Node::paragraph("- not a list"),
        Node::paragraph("1. not ordered"),
        Node::paragraph("> not quoted\n---"),
        Node::paragraph("C:\\dir [x](y) `z` ~~w~~"),
    ]);

    let text = to_plain_text(&doc, &registry);
    assert!(text.starts_with("\\# not a heading\n\n2\\*3\\*4 - x\n\n\\- not a list\n\n1\\. not ordered\n"));
    assert_eq!(from_plain_text(&text), doc);
    assert!(lossy_blocks(&doc, &registry).is_empty());
}

#[test]
fn escapes_keep_their_character_inside_marks() {
    let doc = from_plain_text("**a\\*b** `c\\`d` [e\\[f](https://x)\n");
    let runs: Vec<(String, Vec<String>)> = doc.children[0]
        .children()
        .iter()
        .filter_map(Node::as_text)
        .map(|run| (run.text.clone(), run.marks.names().map(str::to_string).collect()))
        .collect();
    assert_eq!(
        runs,
        vec![
            ("a*b".to_string(), vec!["bold".to_string()]),
            (" ".to_string(), vec![]),
            ("c`d".to_string(), vec!["code".to_string()]),
            (" ".to_string(), vec![]),
            ("e[f".to_string(), vec!["link".to_string()]),
        ]
    );
}

#[test]
fn nested_list_lines_become_nested_lists() {
    let doc = from_plain_text("- a\n  - b\n- c\n");
    assert_eq!(doc.children.len(), 1);
    let list = doc.children[0].as_element().unwrap();
    assert_eq!(list.kind, "bulleted_list");
    assert_eq!(list.children.len(), 2);
    let first = list.children[0].as_element().unwrap();
    assert_eq!(first.children[1].kind(), "bulleted_list");
    assert_eq!(first.children[1].text_content(), "b");
}

#[test]
fn empty_text_is_one_empty_paragraph() {
    assert_eq!(from_plain_text(""), Document::empty());
    assert_eq!(from_plain_text("\n\n"), Document::empty());
}

#[test]
fn opaque_blocks_render_as_placeholder_tokens() {
    let registry = PluginRegistry::richtext();
    let doc = Document {
        children: vec![
            Node::paragraph("before"),
            Node::Opaque(OpaqueNode {
                tag: "div".to_string(),
                data_type: Some("poll".to_string()),
                markup: "<div data-type=\"poll\"></div>".to_string(),
            }),
        ],
    };
    assert_eq!(placeholder_token("poll"), "[[block:poll]]");
    assert_eq!(to_plain_text(&doc, &registry), "before\n\n[[block:poll]]\n");
    assert_eq!(lossy_blocks(&doc, &registry), vec![vec![1]]);

    let parsed = from_plain_text(&to_plain_text(&doc, &registry));
    assert_eq!(parsed.children[1], Node::paragraph("[[block:poll]]"));
}

#[test]
fn lossy_blocks_flags_dropped_marks_and_sized_images() {
    let registry = PluginRegistry::richtext();
    let doc = normalized(vec![
        Node::element(
            "paragraph",
            Attrs::new(),
            vec![Node::Text(TextNode::marked(
                "under",
                Marks::new().with("underline", Attrs::new()),
            ))],
        ),
        Node::paragraph("fine"),
        Node::void(
            "image",
            attrs(&[("src", json!("a.png")), ("width", json!("50%"))]),
        ),
    ]);
    assert_eq!(lossy_blocks(&doc, &registry), vec![vec![0], vec![2]]);
    assert_eq!(to_plain_text(&doc, &registry), "under\n\nfine\n\n![](a.png)\n");
}
