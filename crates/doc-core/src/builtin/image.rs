use serde::Deserialize;
use serde_json::Value;

use crate::collab::AssetStore;
use crate::editor::Editor;
use crate::model::{Attrs, Node};
use crate::registry::{CommandError, CommandSpec, EditorPlugin, NodeType, PlainTextRule, command_args};
use crate::schema::AttrSpec;

use super::insert_block;

pub(crate) struct ImagePlugin;

#[derive(Deserialize)]
struct InsertImageArgs {
    src: String,
    #[serde(default)]
    alt: String,
}

impl EditorPlugin for ImagePlugin {
    fn id(&self) -> &'static str {
        "block.image"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::atomic("image")
                .tag("img")
                .attr(AttrSpec::string("src", "").html("src"))
                .attr(AttrSpec::string("alt", "").html("alt"))
                .attr(AttrSpec::optional_string("width").html("width"))
                .plain_text(PlainTextRule::Image),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("image.insert", "Insert image", |editor, args| {
                let args: InsertImageArgs = command_args("image.insert", args)?;
                let src = args.src.trim();
                if src.is_empty() {
                    return Err(CommandError::invalid_args("image.insert", "src is empty"));
                }
                let mut attrs = Attrs::new();
                attrs.insert("src".to_string(), Value::from(src));
                attrs.insert("alt".to_string(), Value::from(args.alt));
                insert_block(editor, Node::void("image", attrs), "command:image.insert")
            })
            .description("Insert an image from a URL.")
            .keywords(["image", "picture", "photo", "img"])
            .args_example(serde_json::json!({ "src": "https://example.com/cat.png", "alt": "A cat" })),
        ]
    }
}

/// Hands `bytes` to the asset store and inserts an image pointing at the
/// URL it returns.
pub fn insert_uploaded_image<S: AssetStore>(
    editor: &mut Editor,
    store: &mut S,
    file_name: &str,
    bytes: &[u8],
    alt: &str,
) -> Result<(), CommandError> {
    let url = store.store(file_name, bytes).map_err(|err| {
        tracing::warn!(file_name, error = %err, "asset upload failed");
        CommandError::not_applicable(format!("Upload of `{file_name}` failed: {err}"))
    })?;
    editor.run_command(
        "image.insert",
        Some(serde_json::json!({ "src": url, "alt": alt })),
    )
}
