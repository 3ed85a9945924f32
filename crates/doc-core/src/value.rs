use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Document;

const SCHEMA: &str = "blockdoc";
const VERSION: u32 = 1;

fn default_schema() -> String {
    SCHEMA.to_string()
}

fn default_version() -> u32 {
    VERSION
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("unknown schema `{0}`")]
    UnknownSchema(String),
    #[error("unsupported version {found}, this build reads up to {VERSION}")]
    UnsupportedVersion { found: u32 },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Versioned JSON envelope of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub document: Document,
}

impl DocumentValue {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            document,
        }
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_json_pretty(&self) -> Result<String, ValueError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses an envelope, refusing other schemas and newer versions.
    pub fn from_json_str(s: &str) -> Result<Self, ValueError> {
        let value: Self = serde_json::from_str(s)?;
        if value.schema != SCHEMA {
            return Err(ValueError::UnknownSchema(value.schema));
        }
        if value.version > VERSION {
            return Err(ValueError::UnsupportedVersion {
                found: value.version,
            });
        }
        Ok(value)
    }
}
