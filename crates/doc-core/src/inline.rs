//! Helpers for the runs of marked text inside a text block. Offsets called
//! "global" count bytes from the start of the block's text.

use crate::model::{ElementNode, Marks, Node, TextNode};
use crate::registry::PluginRegistry;
use crate::selection::Point;

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

pub(crate) fn prev_char_boundary(s: &str, ix: usize) -> usize {
    let ix = clamp_to_char_boundary(s, ix);
    s[..ix].char_indices().next_back().map_or(0, |(i, _)| i)
}

pub(crate) fn inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .filter_map(Node::as_text)
        .map(|t| t.text.len())
        .sum()
}

pub(crate) fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if ix < child_ix {
            global += t.text.len();
            continue;
        }
        if ix == child_ix {
            global += clamp_to_char_boundary(&t.text, offset);
        }
        break;
    }
    global
}

pub(crate) fn point_for_global_offset(
    block_path: &[usize],
    children: &[Node],
    global_offset: usize,
) -> Point {
    let at = |ix: usize, offset: usize| {
        let mut path = block_path.to_vec();
        path.push(ix);
        Point::new(path, offset)
    };

    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if remaining < t.text.len() {
            return at(child_ix, clamp_to_char_boundary(&t.text, remaining));
        }
        if remaining == t.text.len() {
            if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                return at(child_ix + 1, 0);
            }
            return at(child_ix, t.text.len());
        }
        remaining -= t.text.len();
    }

    children
        .iter()
        .enumerate()
        .rev()
        .find_map(|(ix, node)| node.as_text().map(|t| at(ix, t.text.len())))
        .unwrap_or_else(|| at(0, 0))
}

/// Rewrites the marks of every run overlapping `start..end`, splitting runs
/// at the range edges. The result is coalesced.
pub(crate) fn apply_marks_in_block(
    children: &[Node],
    start: usize,
    end: usize,
    apply: &dyn Fn(&mut Marks),
) -> Vec<Node> {
    if start >= end {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end <= node_start || start >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = clamp_to_char_boundary(&t.text, start.saturating_sub(node_start));
        let sel_end = clamp_to_char_boundary(&t.text, end.saturating_sub(node_start));

        let mut middle = t.marks.clone();
        apply(&mut middle);

        for (text, marks) in [
            (&t.text[..sel_start], &t.marks),
            (&t.text[sel_start..sel_end], &middle),
            (&t.text[sel_end..], &t.marks),
        ] {
            if !text.is_empty() {
                out.push(Node::Text(TextNode::marked(text, marks.clone())));
            }
        }
    }

    coalesce_runs(out)
}

/// Merges adjacent runs with equal marks and drops empty runs, keeping a
/// single empty run when nothing else is left.
pub(crate) fn coalesce_runs(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Node::Text(t) = &node {
            if t.text.is_empty() {
                continue;
            }
            if let Some(Node::Text(prev)) = out.last_mut() {
                if prev.marks == t.marks {
                    prev.text.push_str(&t.text);
                    continue;
                }
            }
        }
        out.push(node);
    }
    if !out.iter().any(|n| matches!(n, Node::Text(_))) {
        out.insert(0, Node::text(""));
    }
    out
}

/// Marks of every run overlapping `start..end`.
pub(crate) fn marks_in_range(children: &[Node], start: usize, end: usize) -> Vec<&Marks> {
    let mut cursor = 0usize;
    let mut out = Vec::new();
    for t in children.iter().filter_map(Node::as_text) {
        let node_start = cursor;
        cursor += t.text.len();
        if end > node_start && start < cursor {
            out.push(&t.marks);
        }
    }
    out
}

/// Splits runs at a global offset. Both halves keep at least one run.
pub(crate) fn split_inlines(children: &[Node], at: usize) -> (Vec<Node>, Vec<Node>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut cursor = 0usize;
    for node in children {
        let Node::Text(t) = node else {
            continue;
        };
        let node_start = cursor;
        cursor += t.text.len();
        if cursor <= at {
            left.push(node.clone());
        } else if node_start >= at {
            right.push(node.clone());
        } else {
            let split = clamp_to_char_boundary(&t.text, at - node_start);
            left.push(Node::Text(TextNode::marked(&t.text[..split], t.marks.clone())));
            right.push(Node::Text(TextNode::marked(&t.text[split..], t.marks.clone())));
        }
    }
    (coalesce_runs(left), coalesce_runs(right))
}

pub(crate) fn is_text_block(el: &ElementNode, registry: &PluginRegistry) -> bool {
    registry
        .content_rule(&el.kind)
        .is_some_and(|rule| rule.is_inline())
}
