mod collab;
mod content;
mod deferred;
mod editor;
mod inline;
mod model;
mod ops;
mod registry;
mod schema;
mod selection;
mod value;

pub mod builtin;
pub mod markup;
pub mod plain_text;

pub use crate::collab::*;
pub use crate::content::*;
pub use crate::deferred::{NodeHandle, WriteBackOutcome, WriteTicket};
pub use crate::editor::{ApplyError, Editor, EditorConfig, UndoRecord};
pub use crate::model::*;
pub use crate::ops::*;
pub use crate::registry::*;
pub use crate::schema::*;
pub use crate::selection::{Point, Selection, document_end, document_start, first_point_in, last_point_in};
pub use crate::value::*;
