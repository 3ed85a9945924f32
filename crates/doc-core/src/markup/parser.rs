//! Byte-scanning tokenizer for portable markup. Builds a small element tree
//! with byte spans so unknown blocks can be preserved verbatim.

use std::ops::Range;

use super::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupElement {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order, names lowercased and values unescaped.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
    /// Bytes of the whole element, start tag through end tag.
    pub span: Range<usize>,
}

impl MarkupElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Elements that never have an end tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

struct OpenElement {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<MarkupNode>,
    start: usize,
}

pub fn parse(input: &str) -> Result<Vec<MarkupNode>, DecodeError> {
    let bytes = input.as_bytes();
    let mut idx = 0_usize;
    let mut roots: Vec<MarkupNode> = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();

    fn sink<'a>(
        stack: &'a mut [OpenElement],
        roots: &'a mut Vec<MarkupNode>,
    ) -> &'a mut Vec<MarkupNode> {
        match stack.last_mut() {
            Some(open) => &mut open.children,
            None => roots,
        }
    }

    fn push_text(target: &mut Vec<MarkupNode>, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(MarkupNode::Text(prev)) = target.last_mut() {
            prev.push_str(text);
        } else {
            target.push(MarkupNode::Text(text.to_string()));
        }
    }

    while idx < bytes.len() {
        if bytes[idx] != b'<' {
            let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            push_text(sink(&mut stack, &mut roots), &decode_entities(&input[idx..next]));
            idx = next;
            continue;
        }

        if starts_with(bytes, idx, b"<!--") {
            idx = skip_comment(bytes, idx);
            continue;
        }

        if starts_with(bytes, idx, b"<!") || starts_with(bytes, idx, b"<?") {
            idx = skip_to_gt(bytes, idx.saturating_add(2));
            continue;
        }

        let Some((tag, next_idx)) = parse_tag(input, idx)? else {
            push_text(sink(&mut stack, &mut roots), "<");
            idx = idx.saturating_add(1);
            continue;
        };

        if tag.is_end {
            let Some(open) = stack.pop() else {
                return Err(DecodeError::UnexpectedClosingTag {
                    tag: tag.name,
                    offset: idx,
                });
            };
            if open.tag != tag.name {
                return Err(DecodeError::MismatchedTag {
                    expected: open.tag,
                    found: tag.name,
                    offset: idx,
                });
            }
            let element = MarkupElement {
                tag: open.tag,
                attrs: open.attrs,
                children: open.children,
                span: open.start..next_idx,
            };
            sink(&mut stack, &mut roots).push(MarkupNode::Element(element));
        } else if tag.self_closing || VOID_TAGS.contains(&tag.name.as_str()) {
            let element = MarkupElement {
                tag: tag.name,
                attrs: tag.attrs,
                children: Vec::new(),
                span: idx..next_idx,
            };
            sink(&mut stack, &mut roots).push(MarkupNode::Element(element));
        } else {
            stack.push(OpenElement {
                tag: tag.name,
                attrs: tag.attrs,
                children: Vec::new(),
                start: idx,
            });
        }

        idx = next_idx;
    }

    if let Some(open) = stack.pop() {
        return Err(DecodeError::UnclosedTag {
            tag: open.tag,
            offset: open.start,
        });
    }

    Ok(roots)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedTag {
    name: String,
    attrs: Vec<(String, String)>,
    is_end: bool,
    self_closing: bool,
}

/// `Ok(None)` when the `<` at `start` does not open a tag and should be read
/// as text.
fn parse_tag(input: &str, start: usize) -> Result<Option<(ParsedTag, usize)>, DecodeError> {
    let bytes = input.as_bytes();
    let mut idx = start.saturating_add(1);
    let mut is_end = false;
    if bytes.get(idx).copied() == Some(b'/') {
        is_end = true;
        idx = idx.saturating_add(1);
    }

    if !bytes.get(idx).is_some_and(u8::is_ascii_alphabetic) {
        return Ok(None);
    }
    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }
    let name = input[name_start..idx].to_ascii_lowercase();

    let unterminated = || DecodeError::UnterminatedTag { offset: start };
    let mut attrs = Vec::new();

    loop {
        idx = skip_spaces(bytes, idx);
        match bytes.get(idx).copied() {
            None => return Err(unterminated()),
            Some(b'>') => {
                let tag = ParsedTag {
                    name,
                    attrs,
                    is_end,
                    self_closing: false,
                };
                return Ok(Some((tag, idx.saturating_add(1))));
            }
            Some(b'/') => {
                let after = skip_spaces(bytes, idx.saturating_add(1));
                if bytes.get(after).copied() == Some(b'>') {
                    let tag = ParsedTag {
                        name,
                        attrs,
                        is_end,
                        self_closing: true,
                    };
                    return Ok(Some((tag, after.saturating_add(1))));
                }
                idx = after;
            }
            Some(_) => {
                let attr_start = idx;
                while idx < bytes.len() && is_attr_name_char(bytes[idx]) {
                    idx = idx.saturating_add(1);
                }
                if idx == attr_start {
                    // Stray punctuation such as a lone quote.
                    idx = idx.saturating_add(1);
                    continue;
                }
                let attr_name = input[attr_start..idx].to_ascii_lowercase();

                let after_name = skip_spaces(bytes, idx);
                if bytes.get(after_name).copied() != Some(b'=') {
                    attrs.push((attr_name, String::new()));
                    idx = after_name;
                    continue;
                }

                idx = skip_spaces(bytes, after_name.saturating_add(1));
                let value = match bytes.get(idx).copied() {
                    None => return Err(unterminated()),
                    Some(quote @ (b'"' | b'\'')) => {
                        let value_start = idx.saturating_add(1);
                        let value_end =
                            find_byte(bytes, value_start, quote).ok_or_else(unterminated)?;
                        idx = value_end.saturating_add(1);
                        &input[value_start..value_end]
                    }
                    Some(_) => {
                        let value_start = idx;
                        while idx < bytes.len()
                            && !bytes[idx].is_ascii_whitespace()
                            && bytes[idx] != b'>'
                        {
                            idx = idx.saturating_add(1);
                        }
                        &input[value_start..idx]
                    }
                };
                attrs.push((attr_name, decode_entities(value)));
            }
        }
    }
}

/// Replaces character references. Unknown references are kept literally.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    find_subslice(bytes, start.saturating_add(4), b"-->")
        .map(|end| end.saturating_add(3))
        .unwrap_or(bytes.len())
}

fn skip_to_gt(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() {
        if bytes[idx] == b'>' {
            return idx.saturating_add(1);
        }
        idx = idx.saturating_add(1);
    }
    bytes.len()
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn is_attr_name_char(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !matches!(byte, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_element(nodes: &[MarkupNode]) -> &MarkupElement {
        match nodes {
            [MarkupNode::Element(el)] => el,
            other => panic!("expected one element, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_elements_with_spans() {
        let input = "<div data-type=\"accordion\"><p>Hi</p></div>";
        let nodes = parse(input).unwrap();
        let div = only_element(&nodes);
        assert_eq!(div.tag, "div");
        assert_eq!(div.attr("data-type"), Some("accordion"));
        assert_eq!(div.span, 0..input.len());
        let p = only_element(&div.children);
        assert_eq!(p.children, vec![MarkupNode::Text("Hi".into())]);
        assert_eq!(&input[p.span.clone()], "<p>Hi</p>");
    }

    #[test]
    fn quoted_attributes_may_contain_angle_brackets() {
        let nodes = parse(r#"<div data-data='{"a":"<b>"}' hidden></div>"#).unwrap();
        let div = only_element(&nodes);
        assert_eq!(div.attr("data-data"), Some(r#"{"a":"<b>"}"#));
        assert_eq!(div.attr("hidden"), Some(""));
    }

    #[test]
    fn entities_are_decoded_in_text_and_attributes() {
        let nodes = parse("<p title=\"a &amp; b\">1 &lt; 2 &#x41;&#66; &bogus;</p>").unwrap();
        let p = only_element(&nodes);
        assert_eq!(p.attr("title"), Some("a & b"));
        assert_eq!(p.children, vec![MarkupNode::Text("1 < 2 AB &bogus;".into())]);
    }

    #[test]
    fn void_and_self_closing_tags_need_no_end_tag() {
        let nodes = parse("<p>a<br>b</p><hr><img src=x.png/><div/>").unwrap();
        assert_eq!(nodes.len(), 4);
        let p = match &nodes[0] {
            MarkupNode::Element(el) => el,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(p.children.len(), 3);
    }

    #[test]
    fn comments_and_doctype_are_skipped() {
        let nodes = parse("<!DOCTYPE html><!-- note --><p>x</p>").unwrap();
        assert_eq!(only_element(&nodes).tag, "p");
    }

    #[test]
    fn bare_angle_bracket_is_text() {
        let nodes = parse("<p>1 < 2</p>").unwrap();
        let p = only_element(&nodes);
        assert_eq!(p.children, vec![MarkupNode::Text("1 < 2".into())]);
    }

    #[test]
    fn malformed_markup_is_an_error() {
        assert!(matches!(
            parse("<p>open"),
            Err(DecodeError::UnclosedTag { ref tag, .. }) if tag == "p"
        ));
        assert!(matches!(
            parse("<p><em>x</p></em>"),
            Err(DecodeError::MismatchedTag { .. })
        ));
        assert!(matches!(
            parse("text</p>"),
            Err(DecodeError::UnexpectedClosingTag { .. })
        ));
        assert!(matches!(
            parse("<p class=\"x>"),
            Err(DecodeError::UnterminatedTag { offset: 0 })
        ));
    }

    #[test]
    fn tag_names_are_case_insensitive() {
        let nodes = parse("<P CLASS=a>x</p>").unwrap();
        let p = only_element(&nodes);
        assert_eq!(p.tag, "p");
        assert_eq!(p.attr("class"), Some("a"));
    }
}
