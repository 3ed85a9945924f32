use std::ops::Range;

use serde::Deserialize;
use serde_json::Value;

use crate::editor::Editor;
use crate::inline::{inline_text_len, marks_in_range};
use crate::model::{Attrs, Marks, Node, Path};
use crate::ops::{Op, TxBuilder};
use crate::registry::{
    CommandError, CommandSpec, EditorPlugin, MarkPlainText, MarkType, QueryError, QuerySpec,
    command_args,
};
use crate::schema::AttrSpec;

use super::{selected_leaf_blocks, text_block_of};

const FONT_SIZES: std::ops::RangeInclusive<i64> = 8..=72;

pub(crate) struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    /// Registration order is the nesting order in markup, outermost first.
    fn mark_types(&self) -> Vec<MarkType> {
        vec![
            MarkType::new("link", "a")
                .attr(AttrSpec::string("href", "").html("href"))
                .plain_text(MarkPlainText::Link),
            MarkType::new("bold", "strong")
                .tag_alias("b")
                .plain_text(MarkPlainText::Delimiter("**")),
            MarkType::new("italic", "em")
                .tag_alias("i")
                .plain_text(MarkPlainText::Delimiter("*")),
            MarkType::new("underline", "u"),
            MarkType::new("strikethrough", "s")
                .tag_alias("del")
                .plain_text(MarkPlainText::Delimiter("~~")),
            MarkType::new("code", "code").plain_text(MarkPlainText::Delimiter("`")),
            MarkType::new("text_color", "span")
                .data_mark()
                .attr(AttrSpec::string("color", "")),
            MarkType::new("highlight", "mark").attr(AttrSpec::string("color", "")),
            MarkType::new("font_size", "span")
                .data_mark()
                .attr(AttrSpec::integer("size", 16, *FONT_SIZES.start(), *FONT_SIZES.end())),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let mut commands: Vec<CommandSpec> = [
            ("bold", "Toggle bold", ["bold", "strong"]),
            ("italic", "Toggle italic", ["italic", "emphasis"]),
            ("underline", "Toggle underline", ["underline", "u"]),
            ("strikethrough", "Toggle strikethrough", ["strikethrough", "strike"]),
            ("code", "Toggle inline code", ["code", "monospace"]),
        ]
        .into_iter()
        .map(|(mark, label, keywords)| {
            CommandSpec::new(format!("marks.toggle_{mark}"), label, move |editor, _args| {
                toggle_mark(editor, mark)
            })
            .keywords(keywords)
        })
        .collect();

        commands.extend([
            CommandSpec::new("marks.set_link", "Set link", |editor, args| {
                let args: LinkArgs = command_args("marks.set_link", args)?;
                let url = args.url.trim();
                if url.is_empty() {
                    return Err(CommandError::invalid_args("marks.set_link", "url is empty"));
                }
                set_mark(editor, "link", attrs_of("href", Value::String(url.to_string())))
            })
            .description("Link the selected text.")
            .keywords(["link", "url", "href"])
            .args_example(serde_json::json!({ "url": "https://example.com" })),
            CommandSpec::new("marks.unset_link", "Remove link", |editor, _args| {
                unset_mark(editor, "link")
            })
            .keywords(["unlink"]),
            CommandSpec::new("marks.set_text_color", "Set text color", |editor, args| {
                let color = color_arg("marks.set_text_color", args)?;
                set_mark(editor, "text_color", attrs_of("color", Value::String(color)))
            })
            .keywords(["color", "foreground"])
            .args_example(serde_json::json!({ "color": "#d0021b" })),
            CommandSpec::new("marks.unset_text_color", "Clear text color", |editor, _args| {
                unset_mark(editor, "text_color")
            }),
            CommandSpec::new("marks.set_highlight", "Highlight", |editor, args| {
                let color = color_arg("marks.set_highlight", args)?;
                set_mark(editor, "highlight", attrs_of("color", Value::String(color)))
            })
            .keywords(["highlight", "background", "marker"])
            .args_example(serde_json::json!({ "color": "#fff59d" })),
            CommandSpec::new("marks.unset_highlight", "Clear highlight", |editor, _args| {
                unset_mark(editor, "highlight")
            }),
            CommandSpec::new("marks.set_font_size", "Set font size", |editor, args| {
                let args: FontSizeArgs = command_args("marks.set_font_size", args)?;
                if !FONT_SIZES.contains(&args.size) {
                    return Err(CommandError::invalid_args(
                        "marks.set_font_size",
                        format!(
                            "size must be between {} and {}",
                            FONT_SIZES.start(),
                            FONT_SIZES.end()
                        ),
                    ));
                }
                set_mark(editor, "font_size", attrs_of("size", Value::from(args.size)))
            })
            .keywords(["font", "size"])
            .args_example(serde_json::json!({ "size": 20 })),
            CommandSpec::new("marks.unset_font_size", "Reset font size", |editor, _args| {
                unset_mark(editor, "font_size")
            }),
        ]);
        commands
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("marks.get_active", |editor, _args| {
                serde_json::to_value(active_marks(editor))
                    .map_err(|err| QueryError::Decode(err.to_string()))
            }),
            QuerySpec::new("selection.is_collapsed", |editor, _args| {
                Ok(Value::Bool(editor.selection().is_collapsed()))
            }),
        ]
    }
}

#[derive(Deserialize)]
struct LinkArgs {
    url: String,
}

#[derive(Deserialize)]
struct ColorArgs {
    color: String,
}

#[derive(Deserialize)]
struct FontSizeArgs {
    size: i64,
}

fn color_arg(command: &str, args: Option<Value>) -> Result<String, CommandError> {
    let args: ColorArgs = command_args(command, args)?;
    let color = args.color.trim();
    if color.is_empty() {
        return Err(CommandError::invalid_args(command, "color is empty"));
    }
    Ok(color.to_string())
}

fn attrs_of(name: &str, value: Value) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert(name.to_string(), value);
    attrs
}

/// The selected text as global byte ranges, one per touched text block.
fn selected_ranges(editor: &Editor) -> Result<Vec<(Path, Range<usize>)>, CommandError> {
    let selection = editor.selection();
    if selection.is_collapsed() {
        return Err(CommandError::not_applicable("Select some text first"));
    }
    let doc = editor.doc();
    let registry = editor.registry();
    let (start, end) = selection.ordered();
    let start = text_block_of(doc, registry, &start).map(|(path, _, global)| (path, global));
    let end = text_block_of(doc, registry, &end).map(|(path, _, global)| (path, global));

    let mut ranges = Vec::new();
    for path in selected_leaf_blocks(editor) {
        let Some(Node::Element(el)) = doc.node(&path) else {
            continue;
        };
        let from = match &start {
            Some((p, global)) if *p == path => *global,
            _ => 0,
        };
        let to = match &end {
            Some((p, global)) if *p == path => *global,
            _ => inline_text_len(&el.children),
        };
        if from < to {
            ranges.push((path, from..to));
        }
    }

    if ranges.is_empty() {
        return Err(CommandError::not_applicable("The selection holds no text"));
    }
    Ok(ranges)
}

fn toggle_mark(editor: &mut Editor, name: &str) -> Result<(), CommandError> {
    let ranges = selected_ranges(editor)?;
    let active = ranges.iter().all(|(path, range)| {
        editor
            .doc()
            .node(path)
            .and_then(Node::as_element)
            .is_some_and(|el| {
                marks_in_range(&el.children, range.start, range.end)
                    .iter()
                    .all(|marks| marks.has(name))
            })
    });

    if active {
        remove_over(editor, ranges, name, "command:marks.toggle")
    } else {
        add_over(editor, ranges, name, Attrs::new(), "command:marks.toggle")
    }
}

fn set_mark(editor: &mut Editor, name: &str, attrs: Attrs) -> Result<(), CommandError> {
    let ranges = selected_ranges(editor)?;
    add_over(editor, ranges, name, attrs, "command:marks.set")
}

fn unset_mark(editor: &mut Editor, name: &str) -> Result<(), CommandError> {
    let ranges = selected_ranges(editor)?;
    remove_over(editor, ranges, name, "command:marks.unset")
}

fn add_over(
    editor: &mut Editor,
    ranges: Vec<(Path, Range<usize>)>,
    name: &str,
    attrs: Attrs,
    source: &str,
) -> Result<(), CommandError> {
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    for (path, range) in ranges {
        tx.push(Op::AddMark {
            path,
            range,
            name: name.to_string(),
            attrs: attrs.clone(),
        })?;
    }
    editor.apply(tx.finish().source(source))?;
    Ok(())
}

fn remove_over(
    editor: &mut Editor,
    ranges: Vec<(Path, Range<usize>)>,
    name: &str,
    source: &str,
) -> Result<(), CommandError> {
    let registry = editor.shared_registry();
    let mut tx = TxBuilder::new(editor.doc(), editor.selection(), &registry);
    for (path, range) in ranges {
        tx.push(Op::RemoveMark {
            path,
            range,
            name: name.to_string(),
        })?;
    }
    editor.apply(tx.finish().source(source))?;
    Ok(())
}

/// Marks of the run under a caret, or the marks shared by every selected
/// run.
fn active_marks(editor: &Editor) -> Marks {
    let selection = editor.selection();
    let doc = editor.doc();
    if selection.is_collapsed() {
        return match doc.node(&selection.focus.path) {
            Some(Node::Text(run)) => run.marks.clone(),
            _ => Marks::new(),
        };
    }

    let Ok(ranges) = selected_ranges(editor) else {
        return Marks::new();
    };
    let mut all = ranges.iter().flat_map(|(path, range)| {
        doc.node(path)
            .and_then(Node::as_element)
            .map(|el| marks_in_range(&el.children, range.start, range.end))
            .unwrap_or_default()
    });
    let Some(first) = all.next() else {
        return Marks::new();
    };
    let rest: Vec<&Marks> = all.collect();
    first
        .iter()
        .filter(|(name, _)| rest.iter().all(|marks| marks.has(name)))
        .fold(Marks::new(), |marks, (name, attrs)| {
            marks.with(name.clone(), attrs.clone())
        })
}
