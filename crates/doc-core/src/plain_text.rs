//! The markdown-like dialect of simple edit mode. Lossy in both directions:
//! custom blocks flatten or become `[[block:<name>]]` tokens, and parsing
//! only ever produces built-in node types. Text that would otherwise read
//! as syntax is backslash-escaped.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use crate::inline::coalesce_runs;
use crate::model::{Attrs, Document, ElementNode, Marks, Node, Path, TextNode};
use crate::registry::{MarkPlainText, PlainTextRule, PluginRegistry};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```\s*([\w+#.-]*)\s*$").expect("valid fence regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid heading regex"));
static DIVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").expect("valid divider regex"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^!\[([^\]]*)\]\(([^)\s]*)\)\s*$").expect("valid image regex")
});
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([-*+]|\d+[.)])\s+(.*)$").expect("valid list item regex")
});
static TABLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\|?\s*:?-+:?\s*(?:\|\s*:?-+:?\s*)*\|?\s*$").expect("valid table regex")
});
static INLINE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\[[:punct:]]|\*\*|~~|\*|`|\[([^\]]*)\]\(([^)\s]*)\)")
        .expect("valid inline regex")
});

/// Renders `doc` in the plain-text dialect. Never fails.
pub fn to_plain_text(doc: &Document, registry: &PluginRegistry) -> String {
    let lines = render_blocks(&doc.children, registry, "\n");
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// `[[block:<name>]]`
pub fn placeholder_token(name: &str) -> String {
    format!("[[block:{name}]]")
}

fn plain_rule(node: &Node, registry: &PluginRegistry) -> Option<PlainTextRule> {
    match node {
        Node::Element(el) => Some(
            registry
                .get(&el.kind)
                .map_or(PlainTextRule::Flatten, |t| t.plain_text),
        ),
        Node::Void(v) => Some(
            registry
                .get(&v.kind)
                .map_or(PlainTextRule::Placeholder, |t| t.plain_text),
        ),
        Node::Text(_) | Node::Opaque(_) => None,
    }
}

/// Renders sibling blocks, placing `separator` lines between them.
fn render_blocks(nodes: &[Node], registry: &PluginRegistry, separator: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for node in nodes {
        let lines = render_block(node, registry);
        if lines.is_empty() {
            continue;
        }
        if !out.is_empty() && separator == "\n" {
            out.push(String::new());
        }
        out.extend(lines);
    }
    out
}

fn render_block(node: &Node, registry: &PluginRegistry) -> Vec<String> {
    let Some(rule) = plain_rule(node, registry) else {
        return match node {
            Node::Opaque(opaque) => vec![placeholder_token(opaque.label())],
            Node::Text(t) => t.text.lines().map(str::to_string).collect(),
            _ => Vec::new(),
        };
    };
    let attrs = node.attrs().cloned().unwrap_or_default();
    let children = node.children();

    match rule {
        PlainTextRule::Paragraph => split_lines(&render_inline(children, registry))
            .into_iter()
            .map(escape_line_start)
            .collect(),
        PlainTextRule::Heading => {
            let level = attrs.get("level").and_then(Value::as_u64).unwrap_or(1).clamp(1, 6);
            let text = render_inline(children, registry).replace('\n', " ");
            vec![format!("{} {text}", "#".repeat(level as usize))]
        }
        PlainTextRule::Blockquote => render_blocks(children, registry, "\n")
            .into_iter()
            .map(|line| {
                if line.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {line}")
                }
            })
            .collect(),
        PlainTextRule::CodeBlock => {
            let language = attrs.get("language").and_then(Value::as_str).unwrap_or("");
            let mut lines = vec![format!("```{language}")];
            let text = node.text_content();
            if !text.is_empty() {
                lines.extend(text.split('\n').map(str::to_string));
            }
            lines.push("```".to_string());
            lines
        }
        PlainTextRule::Divider => vec!["---".to_string()],
        PlainTextRule::Image => {
            let alt = attrs.get("alt").and_then(Value::as_str).unwrap_or("");
            let src = attrs.get("src").and_then(Value::as_str).unwrap_or("");
            vec![format!("![{alt}]({src})")]
        }
        PlainTextRule::BulletedList => render_list(children, registry, |_| "- ".to_string()),
        PlainTextRule::OrderedList => {
            let start = attrs.get("start").and_then(Value::as_u64).unwrap_or(1);
            render_list(children, registry, |ix| format!("{}. ", start + ix as u64))
        }
        PlainTextRule::ListItem => render_blocks(children, registry, ""),
        PlainTextRule::Table => render_table(children, registry),
        PlainTextRule::TableRow | PlainTextRule::TableCell => {
            vec![render_cell_text(node, registry)]
        }
        PlainTextRule::Flatten => render_blocks(children, registry, "\n"),
        PlainTextRule::Placeholder => vec![placeholder_token(node.kind())],
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

/// Escapes a paragraph line the parser would otherwise open a block with.
/// For `1. x` the escape goes before the `.`.
fn escape_line_start(line: String) -> String {
    if !starts_block(&line) && !line.trim_start().starts_with('|') {
        return line;
    }
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let at = indent + digits;
    format!("{}\\{}", &line[..at], &line[at..])
}

fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '*' | '`' | '~' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match chars.peek() {
            Some(next) if ch == '\\' && next.is_ascii_punctuation() => {
                out.push(*next);
                chars.next();
            }
            _ => out.push(ch),
        }
    }
    out
}

fn render_list(
    items: &[Node],
    registry: &PluginRegistry,
    marker: impl Fn(usize) -> String,
) -> Vec<String> {
    let mut out = Vec::new();
    for (ix, item) in items.iter().enumerate() {
        let marker = marker(ix);
        let indent = " ".repeat(marker.len());
        let lines = render_blocks(item.children(), registry, "");
        if lines.is_empty() {
            out.push(marker);
            continue;
        }
        for (line_ix, line) in lines.into_iter().enumerate() {
            if line_ix == 0 {
                out.push(format!("{marker}{line}"));
            } else {
                out.push(format!("{indent}{line}"));
            }
        }
    }
    out
}

fn render_table(rows: &[Node], registry: &PluginRegistry) -> Vec<String> {
    let mut out = Vec::new();
    for (row_ix, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row
            .children()
            .iter()
            .map(|cell| render_cell_text(cell, registry).replace('|', "\\|"))
            .collect();
        out.push(format!("| {} |", cells.join(" | ")));
        if row_ix == 0 {
            let separator = vec!["---"; cells.len().max(1)].join(" | ");
            out.push(format!("| {separator} |"));
        }
    }
    out
}

fn render_cell_text(cell: &Node, registry: &PluginRegistry) -> String {
    cell.children()
        .iter()
        .map(|block| match block {
            Node::Element(el) if !el.children.iter().any(|c| !matches!(c, Node::Text(_))) => {
                render_inline(&el.children, registry).replace('\n', " ")
            }
            other => render_block(other, registry).join(" "),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_inline(runs: &[Node], registry: &PluginRegistry) -> String {
    let mut out = String::new();
    for run in runs.iter().filter_map(Node::as_text) {
        let mut marks: Vec<_> = run
            .marks
            .iter()
            .filter_map(|(name, attrs)| registry.mark(name).map(|m| (m, attrs)))
            .collect();
        // Innermost first, so the outermost mark wraps last.
        marks.sort_by_key(|(mark, _)| std::cmp::Reverse(registry.mark_rank(&mark.name)));

        let mut text = escape_inline(&run.text);
        for (mark, attrs) in marks {
            text = match mark.plain_text {
                MarkPlainText::Delimiter(d) => format!("{d}{text}{d}"),
                MarkPlainText::Link => {
                    let href = attrs.get("href").and_then(Value::as_str).unwrap_or("");
                    format!("[{text}]({href})")
                }
                MarkPlainText::Dropped => text,
            };
        }
        out.push_str(&text);
    }
    out
}

/// Parses the dialect into built-in node types. Placeholder tokens come back
/// as ordinary paragraphs holding the token text.
pub fn from_plain_text(text: &str) -> Document {
    let lines: Vec<&str> = text.lines().collect();
    let children = parse_blocks(&lines);
    if children.is_empty() {
        return Document::empty();
    }
    Document { children }
}

fn parse_blocks(lines: &[&str]) -> Vec<Node> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if let Some(caps) = FENCE.captures(line) {
            let language = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && lines[i].trim_end() != "```" {
                body.push(lines[i]);
                i += 1;
            }
            i += 1;
            out.push(Node::element(
                "code_block",
                attrs([("language", json!(language))]),
                vec![Node::text(body.join("\n"))],
            ));
            continue;
        }

        if let Some(caps) = HEADING.captures(line) {
            let level = caps[1].len();
            out.push(Node::element(
                "heading",
                attrs([("level", json!(level))]),
                parse_inline(caps[2].trim_end()),
            ));
            i += 1;
            continue;
        }

        if DIVIDER.is_match(line) {
            out.push(Node::divider());
            i += 1;
            continue;
        }

        if let Some(caps) = IMAGE.captures(line) {
            out.push(Node::void(
                "image",
                attrs([
                    ("src", json!(&caps[2])),
                    ("alt", json!(&caps[1])),
                    ("width", Value::Null),
                ]),
            ));
            i += 1;
            continue;
        }

        if line.trim_start().starts_with('>') {
            let mut quoted = Vec::new();
            while i < lines.len() && lines[i].trim_start().starts_with('>') {
                let rest = &lines[i].trim_start()[1..];
                quoted.push(rest.strip_prefix(' ').unwrap_or(rest));
                i += 1;
            }
            let mut children = parse_blocks(&quoted);
            if children.is_empty() {
                children.push(Node::paragraph(""));
            }
            out.push(Node::element("blockquote", Attrs::new(), children));
            continue;
        }

        if LIST_ITEM.is_match(line) {
            let (lists, next) = parse_lists(lines, i);
            out.extend(lists);
            i = next;
            continue;
        }

        if line.trim_start().starts_with('|')
            && lines.get(i + 1).is_some_and(|next| TABLE_SEPARATOR.is_match(next))
        {
            let header = split_row(line);
            let mut rows = vec![table_row(&header, true)];
            i += 2;
            while i < lines.len() && lines[i].trim_start().starts_with('|') {
                rows.push(table_row(&split_row(lines[i]), false));
                i += 1;
            }
            out.push(Node::element("table", Attrs::new(), rows));
            continue;
        }

        let mut paragraph = vec![line];
        i += 1;
        while i < lines.len() && !lines[i].trim().is_empty() && !starts_block(lines[i]) {
            paragraph.push(lines[i]);
            i += 1;
        }
        out.push(Node::element(
            "paragraph",
            Attrs::new(),
            parse_inline(&paragraph.join("\n")),
        ));
    }
    out
}

fn starts_block(line: &str) -> bool {
    FENCE.is_match(line)
        || HEADING.is_match(line)
        || DIVIDER.is_match(line)
        || IMAGE.is_match(line)
        || LIST_ITEM.is_match(line)
        || line.trim_start().starts_with('>')
}

fn attrs<const N: usize>(pairs: [(&str, Value); N]) -> Attrs {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

struct ListLine {
    indent: usize,
    ordered: bool,
    number: u64,
    text: String,
}

/// Consumes a run of list lines starting at `start`. Lines indented under an
/// item without a marker continue that item's text.
fn parse_lists(lines: &[&str], start: usize) -> (Vec<Node>, usize) {
    let mut entries: Vec<ListLine> = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = LIST_ITEM.captures(line) {
            let marker = &caps[2];
            let ordered = marker.ends_with(['.', ')']);
            entries.push(ListLine {
                indent: caps[1].len(),
                ordered,
                number: marker
                    .trim_end_matches(['.', ')'])
                    .parse()
                    .unwrap_or(1),
                text: caps[3].to_string(),
            });
            i += 1;
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        match entries.last_mut() {
            Some(last) if !line.trim().is_empty() && indent > last.indent => {
                last.text.push('\n');
                last.text.push_str(line.trim_start());
                i += 1;
            }
            _ => break,
        }
    }

    let mut out = Vec::new();
    let mut ix = 0;
    while ix < entries.len() {
        let (list, next) = build_list(&entries, ix, entries[ix].indent);
        out.push(list);
        ix = next;
    }
    (out, i)
}

fn build_list(entries: &[ListLine], start: usize, indent: usize) -> (Node, usize) {
    let ordered = entries[start].ordered;
    let mut items: Vec<Node> = Vec::new();
    let mut i = start;

    while i < entries.len() && entries[i].indent >= indent {
        let entry = &entries[i];
        if entry.indent > indent {
            let (nested, next) = build_list(entries, i, entry.indent);
            if let Some(Node::Element(item)) = items.last_mut() {
                item.children.push(nested);
            }
            i = next;
            continue;
        }
        if entry.ordered != ordered {
            break;
        }
        items.push(Node::element(
            "list_item",
            Attrs::new(),
            vec![Node::element("paragraph", Attrs::new(), parse_inline(&entry.text))],
        ));
        i += 1;
    }

    let list = if ordered {
        Node::element(
            "ordered_list",
            attrs([("start", json!(entries[start].number))]),
            items,
        )
    } else {
        Node::element("bulleted_list", Attrs::new(), items)
    };
    (list, i)
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

fn table_row(cells: &[String], header: bool) -> Node {
    let cells = cells
        .iter()
        .map(|text| {
            Node::element(
                "table_cell",
                attrs([("header", json!(header))]),
                vec![Node::element("paragraph", Attrs::new(), parse_inline(text))],
            )
        })
        .collect();
    Node::element("table_row", Attrs::new(), cells)
}

/// Reads inline delimiters. A delimiter only opens a mark when a matching
/// closer follows; otherwise it is literal text. `\\` before punctuation
/// always yields the literal character, inside code too.
fn parse_inline(text: &str) -> Vec<Node> {
    let mut runs: Vec<Node> = Vec::new();
    let mut marks = Marks::new();
    let mut in_code = false;
    let mut cursor = 0;

    let push = |runs: &mut Vec<Node>, text: &str, marks: &Marks| {
        if !text.is_empty() {
            runs.push(Node::Text(TextNode::marked(text, marks.clone())));
        }
    };

    for caps in INLINE_TOKEN.captures_iter(text) {
        let Some(token) = caps.get(0) else {
            continue;
        };
        if token.start() < cursor {
            continue;
        }
        let delimiter = token.as_str();

        if let Some(escaped) = delimiter.strip_prefix('\\') {
            push(&mut runs, &text[cursor..token.start()], &marks);
            push(&mut runs, escaped, &marks);
            cursor = token.end();
            continue;
        }

        if in_code && delimiter != "`" {
            continue;
        }

        push(&mut runs, &text[cursor..token.start()], &marks);
        cursor = token.end();

        if let (Some(label), Some(href)) = (caps.get(1), caps.get(2)) {
            let mut link_marks = marks.clone();
            let mut link_attrs = Attrs::new();
            link_attrs.insert("href".to_string(), json!(href.as_str()));
            link_marks.add("link", link_attrs);
            push(&mut runs, &unescape(label.as_str()), &link_marks);
            continue;
        }

        let Some(name) = delimiter_mark(delimiter) else {
            push(&mut runs, delimiter, &marks);
            continue;
        };
        if marks.has(name) {
            marks.remove(name);
            in_code = false;
        } else if text[cursor..].contains(delimiter) {
            marks.add(name, Attrs::new());
            in_code = name == "code";
        } else {
            push(&mut runs, delimiter, &marks);
        }
    }
    push(&mut runs, &text[cursor..], &marks);

    coalesce_runs(runs)
}

fn delimiter_mark(delimiter: &str) -> Option<&'static str> {
    match delimiter {
        "**" => Some("bold"),
        "*" => Some("italic"),
        "~~" => Some("strikethrough"),
        "`" => Some("code"),
        _ => None,
    }
}

/// Paths of nodes that lose data when rendered in the plain-text dialect.
pub fn lossy_blocks(doc: &Document, registry: &PluginRegistry) -> Vec<Path> {
    fn walk(nodes: &[Node], path: &mut Path, registry: &PluginRegistry, out: &mut Vec<Path>) {
        for (ix, node) in nodes.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Opaque(_) => out.push(path.clone()),
                Node::Void(v) => {
                    let rule = plain_rule(node, registry);
                    let sized_image = v.kind == "image"
                        && v.attrs.get("width").is_some_and(|w| !w.is_null());
                    if rule == Some(PlainTextRule::Placeholder) || sized_image {
                        out.push(path.clone());
                    }
                }
                Node::Element(el) => match plain_rule(node, registry) {
                    Some(PlainTextRule::Flatten) => out.push(path.clone()),
                    Some(PlainTextRule::TableCell) if !is_single_paragraph(el) => {
                        out.push(path.clone())
                    }
                    _ if drops_marks(el, registry) => out.push(path.clone()),
                    _ => walk(&el.children, path, registry, out),
                },
                Node::Text(_) => {}
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), registry, &mut out);
    out
}

fn is_single_paragraph(cell: &ElementNode) -> bool {
    matches!(cell.children.as_slice(), [Node::Element(p)] if p.kind == "paragraph")
}

fn drops_marks(el: &ElementNode, registry: &PluginRegistry) -> bool {
    el.children.iter().filter_map(Node::as_text).any(|run| {
        run.marks.names().any(|name| {
            registry
                .mark(name)
                .is_none_or(|mark| mark.plain_text == MarkPlainText::Dropped)
        })
    })
}
