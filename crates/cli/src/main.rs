//! blockdoc CLI
//!
//! Converts documents between markup, simple-mode text and the JSON value,
//! and runs editor commands over them.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use blockdoc_core::markup::{DecodeWarning, decode_with_report, encode};
use blockdoc_core::plain_text::{from_plain_text, lossy_blocks, to_plain_text};
use blockdoc_core::{Document, DocumentValue, Editor, PluginRegistry};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "blockdoc")]
#[command(about = "Structured document conversion and editing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render markup as simple-mode text
    ToText {
        /// Markup file, stdin when omitted
        input: Option<PathBuf>,
    },
    /// Parse simple-mode text into markup
    FromText { input: Option<PathBuf> },
    /// Wrap markup in the versioned JSON value
    ToJson { input: Option<PathBuf> },
    /// Unwrap a JSON value back into markup
    FromJson { input: Option<PathBuf> },
    /// Report what a decode or a simple-mode switch would lose
    Check {
        input: Option<PathBuf>,

        /// Exit with an error when anything would be lost
        #[arg(long)]
        strict: bool,
    },
    /// Run editor commands from a JSON script against a markup document
    Exec {
        /// Script: an array of `{"command": id, "args": {...}}`
        #[arg(short, long)]
        script: PathBuf,

        /// Markup file, stdin when omitted
        input: Option<PathBuf>,
    },
    /// List the commands the editor understands
    Commands {
        /// Include commands hidden from menus
        #[arg(long)]
        all: bool,
    },
}

#[derive(serde::Deserialize)]
struct Step {
    command: String,
    #[serde(default)]
    args: Option<Value>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let registry = Arc::new(blockdoc_extensions::registry());

    let output = match cli.command {
        Commands::ToText { input } => {
            let doc = load_markup(input.as_deref(), &registry)?;
            for path in lossy_blocks(&doc, &registry) {
                warn!(?path, "block cannot be represented exactly in simple mode");
            }
            to_plain_text(&doc, &registry)
        }
        Commands::FromText { input } => {
            let text = read_input(input.as_deref())?;
            let doc = settle(from_plain_text(&text), &registry)?;
            encode(&doc, &registry)
        }
        Commands::ToJson { input } => {
            let doc = load_markup(input.as_deref(), &registry)?;
            let mut json = DocumentValue::from_document(doc).to_json_pretty()?;
            json.push('\n');
            json
        }
        Commands::FromJson { input } => {
            let json = read_input(input.as_deref())?;
            let doc = DocumentValue::from_json_str(&json)
                .context("Failed to read document value")?
                .into_document();
            let doc = settle(doc, &registry)?;
            encode(&doc, &registry)
        }
        Commands::Check { input, strict } => check(input.as_deref(), strict, &registry)?,
        Commands::Exec { script, input } => exec(&script, input.as_deref(), &registry)?,
        Commands::Commands { all } => list_commands(&registry, all),
    };

    std::io::stdout()
        .write_all(output.as_bytes())
        .context("Failed to write output")?;
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn load_markup(path: Option<&Path>, registry: &PluginRegistry) -> Result<Document> {
    let markup = read_input(path)?;
    let decoded = decode_with_report(&markup, registry).context("Failed to decode markup")?;
    for warning in &decoded.warnings {
        warn!("{}", describe(warning));
    }
    Ok(decoded.document)
}

/// Runs normalization and validation through a throwaway editor.
fn settle(doc: Document, registry: &Arc<PluginRegistry>) -> Result<Document> {
    let mut editor = Editor::empty(Arc::clone(registry));
    editor.load(doc).context("Document does not fit the schema")?;
    Ok(editor.doc().clone())
}

fn describe(warning: &DecodeWarning) -> String {
    match warning {
        DecodeWarning::UnknownBlock {
            tag,
            data_type: Some(data_type),
        } => format!("unknown block `{tag}` (data-type `{data_type}`) kept as-is"),
        DecodeWarning::UnknownBlock {
            tag,
            data_type: None,
        } => format!("unknown block `{tag}` kept as-is"),
        DecodeWarning::UnknownInline { tag } => format!("unknown inline `{tag}` unwrapped"),
        DecodeWarning::MalformedAttr { kind, attr, raw } => {
            format!("`{kind}` attribute `{attr}` has malformed value {raw:?}; default used")
        }
        DecodeWarning::UnfitContent { kind, reason } => {
            format!("`{kind}` kept as-is, its content does not fit: {reason}")
        }
    }
}

fn check(path: Option<&Path>, strict: bool, registry: &PluginRegistry) -> Result<String> {
    let markup = read_input(path)?;
    let decoded = decode_with_report(&markup, registry).context("Failed to decode markup")?;
    let lossy = lossy_blocks(&decoded.document, registry);

    let mut report = String::new();
    for warning in &decoded.warnings {
        report.push_str(&format!("decode: {}\n", describe(warning)));
    }
    for path in &lossy {
        let kind = decoded
            .document
            .node(path)
            .map_or("?", |node| node.kind());
        report.push_str(&format!("simple mode: {kind} at {path:?}\n"));
    }

    let problems = decoded.warnings.len() + lossy.len();
    if problems == 0 {
        report.push_str("ok\n");
    } else if strict {
        eprint!("{report}");
        bail!("{problems} problem(s) found");
    }
    Ok(report)
}

fn exec(script: &Path, input: Option<&Path>, registry: &Arc<PluginRegistry>) -> Result<String> {
    let steps: Vec<Step> = serde_json::from_str(&read_input(Some(script))?)
        .with_context(|| format!("Failed to parse script {}", script.display()))?;

    let doc = load_markup(input, registry)?;
    run_script(steps, doc, registry)
}

fn run_script(steps: Vec<Step>, doc: Document, registry: &Arc<PluginRegistry>) -> Result<String> {
    let mut editor = Editor::empty(Arc::clone(registry));
    editor.load(doc).context("Document does not fit the schema")?;

    for (ix, step) in steps.into_iter().enumerate() {
        debug!(step = ix, command = %step.command, "running");
        editor
            .run_command(&step.command, step.args)
            .with_context(|| format!("Step {ix} (`{}`) failed", step.command))?;
    }
    info!(undo = editor.can_undo(), "script finished");

    Ok(encode(editor.doc(), editor.registry()))
}

fn list_commands(registry: &PluginRegistry, all: bool) -> String {
    let mut commands: Vec<_> = registry
        .commands()
        .values()
        .filter(|command| all || !command.hidden)
        .collect();
    commands.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = String::new();
    for command in commands {
        out.push_str(&format!("{:<32} {}", command.id, command.label));
        if let Some(description) = &command.description {
            out.push_str(&format!(" - {description}"));
        }
        out.push('\n');
    }
    out
}
