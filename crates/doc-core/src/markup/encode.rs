use crate::model::{Attrs, Document, Node, TextNode};
use crate::registry::{NodeType, PluginRegistry};

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

pub fn encode(doc: &Document, registry: &PluginRegistry) -> String {
    let mut out = String::new();
    for node in &doc.children {
        encode_node(node, registry, &mut out);
    }
    out
}

fn encode_node(node: &Node, registry: &PluginRegistry, out: &mut String) {
    match node {
        Node::Opaque(opaque) => out.push_str(&opaque.markup),
        Node::Text(t) => encode_run(t, registry, false, out),
        Node::Void(v) => {
            let Some(node_type) = registry.get(&v.kind) else {
                tracing::warn!(kind = %v.kind, "skipping unregistered atomic node");
                return;
            };
            let tag = node_type.tag_for(&v.attrs);
            open_tag(&tag, node_type, &v.attrs, out);
            if !VOID_TAGS.contains(&tag.as_str()) {
                close_tag(&tag, out);
            }
        }
        Node::Element(el) => {
            let Some(node_type) = registry.get(&el.kind) else {
                tracing::warn!(kind = %el.kind, "skipping unregistered element");
                return;
            };
            let tag = node_type.tag_for(&el.attrs);
            open_tag(&tag, node_type, &el.attrs, out);
            if let Some(wrapper) = &node_type.markup.inner_wrapper {
                out.push('<');
                out.push_str(wrapper);
                out.push('>');
            }

            let inline = registry
                .content_rule(&el.kind)
                .is_some_and(|rule| rule.is_inline());
            for child in &el.children {
                match child {
                    Node::Text(t) if inline => {
                        encode_run(t, registry, node_type.markup.preserve_newlines, out)
                    }
                    other => encode_node(other, registry, out),
                }
            }

            if let Some(wrapper) = &node_type.markup.inner_wrapper {
                close_tag(wrapper, out);
            }
            close_tag(&tag, out);
        }
    }
}

fn open_tag(tag: &str, node_type: &NodeType, attrs: &Attrs, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    if let Some(data_type) = &node_type.markup.data_type {
        push_attr("data-type", data_type, out);
    }
    for spec in &node_type.attrs {
        let value = attrs.get(&spec.name).unwrap_or(&spec.default);
        for (name, text) in spec.serialize(value) {
            push_attr(&name, &text, out);
        }
    }
    out.push('>');
}

fn close_tag(tag: &str, out: &mut String) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn push_attr(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(value, true, out);
    out.push('"');
}

/// Emits one text run with its marks nested in registry order.
fn encode_run(run: &TextNode, registry: &PluginRegistry, preserve_newlines: bool, out: &mut String) {
    let mut marks: Vec<_> = run
        .marks
        .iter()
        .filter_map(|(name, attrs)| registry.mark(name).map(|mark| (mark, attrs)))
        .collect();
    marks.sort_by_key(|(mark, _)| registry.mark_rank(&mark.name));

    for (mark, attrs) in &marks {
        out.push('<');
        out.push_str(&mark.tag);
        if mark.data_mark {
            push_attr("data-mark", &mark.name, out);
        }
        for spec in &mark.attrs {
            let value = attrs.get(&spec.name).unwrap_or(&spec.default);
            for (name, text) in spec.serialize(value) {
                push_attr(&name, &text, out);
            }
        }
        out.push('>');
    }

    if preserve_newlines {
        escape_into(&run.text, false, out);
    } else {
        let mut lines = run.text.split('\n');
        if let Some(first) = lines.next() {
            escape_into(first, false, out);
        }
        for line in lines {
            out.push_str("<br>");
            escape_into(line, false, out);
        }
    }

    for (mark, _) in marks.iter().rev() {
        close_tag(&mark.tag, out);
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
