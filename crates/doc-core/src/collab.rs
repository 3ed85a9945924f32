//! Seams to the services around the editor: where documents are persisted
//! and where uploaded binaries live.

use crate::editor::Editor;
use crate::markup::DecodeError;
use crate::model::Document;

/// Persists documents as portable markup under a caller-chosen key.
pub trait DocumentStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn load(&self, key: &str) -> Result<Option<String>, Self::Error>;
    fn save(&mut self, key: &str, markup: &str) -> Result<(), Self::Error>;
}

/// Stores binary assets and hands back a URL to reference them by.
pub trait AssetStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn store(&mut self, file_name: &str, bytes: &[u8]) -> Result<String, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError<E: std::error::Error + 'static> {
    #[error("store failed")]
    Store(#[source] E),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Loads and decodes the document stored under `key`, if any.
pub fn load_document<S: DocumentStore>(
    store: &S,
    key: &str,
    editor: &Editor,
) -> Result<Option<Document>, StoreError<S::Error>> {
    let Some(markup) = store.load(key).map_err(StoreError::Store)? else {
        return Ok(None);
    };
    Ok(Some(Document::from_markup(&markup, editor.registry())?))
}

pub fn save_document<S: DocumentStore>(
    store: &mut S,
    key: &str,
    editor: &Editor,
) -> Result<(), StoreError<S::Error>> {
    let markup = editor.doc().to_markup(editor.registry());
    store.save(key, &markup).map_err(StoreError::Store)
}
