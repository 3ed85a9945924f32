//! Diagrams keep their source text and the last rendered SVG. Rendering
//! happens outside the editor: `request_render` snapshots the source under a
//! write ticket, `finish_render` writes the result back. A newer request for
//! the same diagram makes older results stale.

use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    ApplyError, AttrSpec, CommandError, CommandSpec, Editor, EditorPlugin, Node, NodeType, Path,
    WriteBackOutcome, WriteTicket, command_args,
};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::common::{attrs_of, require_focused, set_attrs};

const SYNTAXES: &[&str] = &["mermaid", "graphviz", "plantuml"];

pub(crate) struct DiagramPlugin;

#[derive(Deserialize)]
struct InsertArgs {
    #[serde(default)]
    source: String,
    #[serde(default = "default_syntax")]
    syntax: String,
}

fn default_syntax() -> String {
    "mermaid".to_string()
}

#[derive(Deserialize)]
struct SourceArgs {
    source: String,
}

fn check_syntax(command: &str, syntax: &str) -> Result<(), CommandError> {
    if SYNTAXES.contains(&syntax) {
        Ok(())
    } else {
        Err(CommandError::invalid_args(
            command,
            format!("unknown diagram syntax `{syntax}`"),
        ))
    }
}

impl EditorPlugin for DiagramPlugin {
    fn id(&self) -> &'static str {
        "ext.diagram"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::atomic("diagram")
                .attr(AttrSpec::enumeration("syntax", SYNTAXES, "mermaid"))
                .attr(AttrSpec::string("source", ""))
                .attr(AttrSpec::optional_string("svg"))
                .attr(AttrSpec::optional_string("error")),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("diagram.insert", "Insert diagram", |editor, args| {
                let args: InsertArgs = command_args("diagram.insert", args)?;
                check_syntax("diagram.insert", &args.syntax)?;
                let node = Node::void(
                    "diagram",
                    attrs_of([("syntax", json!(args.syntax)), ("source", json!(args.source))]),
                );
                insert_block(editor, node, "command:diagram.insert")
            })
            .description("Insert a diagram drawn from text.")
            .keywords(["diagram", "mermaid", "flowchart", "graph"])
            .args_example(json!({ "syntax": "mermaid", "source": "graph TD; A-->B" })),
            CommandSpec::new("diagram.set_source", "Edit diagram source", |editor, args| {
                let args: SourceArgs = command_args("diagram.set_source", args)?;
                let path = require_focused(editor, "diagram")?;
                set_attrs(
                    editor,
                    path,
                    attrs_of([("source", json!(args.source))]),
                    "command:diagram.set_source",
                )
            })
            .hidden(true),
        ]
    }
}

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("no diagram at {0:?}")]
    NotADiagram(Path),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// What a renderer needs, plus the ticket its result must come back with.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub ticket: WriteTicket,
    pub syntax: String,
    pub source: String,
}

/// Turns diagram source into SVG.
pub trait DiagramRenderer {
    type Error: std::error::Error;

    fn render(&self, syntax: &str, source: &str) -> Result<String, Self::Error>;
}

/// Snapshots the diagram at `path` for rendering. Supersedes every earlier
/// request for the same diagram.
pub fn request_render(editor: &mut Editor, path: &[usize]) -> Result<RenderRequest, DiagramError> {
    if !matches!(editor.doc().node(path), Some(Node::Void(v)) if v.kind == "diagram") {
        return Err(DiagramError::NotADiagram(path.to_vec()));
    }
    let ticket = editor.begin_write_back(path)?;
    let text = |name: &str| {
        ticket
            .snapshot
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let syntax = text("syntax");
    let source = text("source");
    Ok(RenderRequest {
        ticket,
        syntax,
        source,
    })
}

/// Writes a render result back. A failed render keeps the previous SVG and
/// records the message.
pub fn finish_render(
    editor: &mut Editor,
    request: &RenderRequest,
    result: Result<String, String>,
) -> WriteBackOutcome {
    let attrs = match result {
        Ok(svg) => attrs_of([("svg", json!(svg)), ("error", Value::Null)]),
        Err(message) => {
            tracing::debug!(handle = ?request.ticket.handle, %message, "diagram render failed");
            attrs_of([("error", json!(message))])
        }
    };
    editor.complete_write_back(&request.ticket, attrs)
}

/// Requests, renders and writes back in one go.
pub fn render_now<R: DiagramRenderer>(
    editor: &mut Editor,
    path: &[usize],
    renderer: &R,
) -> Result<WriteBackOutcome, DiagramError> {
    let request = request_render(editor, path)?;
    let result = renderer
        .render(&request.syntax, &request.source)
        .map_err(|err| err.to_string());
    Ok(finish_render(editor, &request, result))
}
