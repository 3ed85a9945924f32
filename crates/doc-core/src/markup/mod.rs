//! Portable markup: the tag-based persistence format of a document.

mod decode;
mod encode;
mod parser;

use thiserror::Error;

use crate::content::ContentError;
use crate::model::Document;

pub use decode::{Decoded, decode, decode_with_report};
pub use encode::encode;
pub use parser::{MarkupElement, MarkupNode, parse};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unterminated tag at byte {offset}")]
    UnterminatedTag { offset: usize },
    #[error("expected `</{expected}>` but found `</{found}>` at byte {offset}")]
    MismatchedTag {
        expected: String,
        found: String,
        offset: usize,
    },
    #[error("closing tag `</{tag}>` at byte {offset} has no opening tag")]
    UnexpectedClosingTag { tag: String, offset: usize },
    #[error("`<{tag}>` opened at byte {offset} is never closed")]
    UnclosedTag { tag: String, offset: usize },
    #[error("decoded document is invalid: {0}")]
    Schema(#[from] ContentError),
}

/// Recoverable data loss noticed while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    /// Kept as an opaque placeholder.
    UnknownBlock {
        tag: String,
        data_type: Option<String>,
    },
    /// Unwrapped to its text.
    UnknownInline { tag: String },
    /// Replaced by the attribute's default.
    MalformedAttr {
        kind: String,
        attr: String,
        raw: String,
    },
    /// A known container whose children, once unknown blocks were kept
    /// opaque, no longer fit its content rule. Kept as an opaque placeholder.
    UnfitContent { kind: String, reason: String },
}

impl Document {
    pub fn from_markup(
        input: &str,
        registry: &crate::registry::PluginRegistry,
    ) -> Result<Self, DecodeError> {
        decode(input, registry)
    }

    pub fn to_markup(&self, registry: &crate::registry::PluginRegistry) -> String {
        encode(self, registry)
    }
}
