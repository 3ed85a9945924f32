use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::editor::{ApplyError, apply_op_to};
use crate::model::{Attrs, Document, Node, Path};
use crate::registry::PluginRegistry;
use crate::selection::Selection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    /// Splits the node at `path` at `position` (a byte offset for text runs,
    /// a child index for elements). The new right-hand element takes `attrs`.
    SplitNode {
        #[serde(default)]
        path: Path,
        position: usize,
        #[serde(default)]
        attrs: Attrs,
    },
    /// Merges the node at `path` into its previous sibling. `position` is the
    /// previous sibling's length before the merge and `attrs` the attributes
    /// of the merged-away element.
    MergeNode {
        #[serde(default)]
        path: Path,
        position: usize,
        #[serde(default)]
        attrs: Attrs,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
    /// Adds a mark to the text of the block at `path` over a global byte range.
    AddMark {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
        name: String,
        #[serde(default)]
        attrs: Attrs,
    },
    RemoveMark {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
        name: String,
    },
    /// Replaces all runs of the text block at `path`.
    ReplaceInlines {
        #[serde(default)]
        path: Path,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn set(attrs: Attrs) -> Self {
        Self {
            set: attrs,
            remove: Vec::new(),
        }
    }

    pub fn one(name: impl Into<String>, value: serde_json::Value) -> Self {
        let mut set = Attrs::new();
        set.insert(name.into(), value);
        Self::set(set)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}

/// Builds a transaction op by op against a scratch copy of the document, so
/// each op can be computed from the state the previous ones left behind.
pub struct TxBuilder<'r> {
    doc: Document,
    selection: Selection,
    registry: &'r PluginRegistry,
    ops: Vec<Op>,
}

impl<'r> TxBuilder<'r> {
    pub fn new(doc: &Document, selection: &Selection, registry: &'r PluginRegistry) -> Self {
        Self {
            doc: doc.clone(),
            selection: selection.clone(),
            registry,
            ops: Vec::new(),
        }
    }

    /// The scratch document with every pushed op applied.
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// The selection remapped through every pushed op.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn registry(&self) -> &'r PluginRegistry {
        self.registry
    }

    /// Replaces the selection carried through later ops.
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: Op) -> Result<(), ApplyError> {
        apply_op_to(&mut self.doc, &mut self.selection, op.clone(), self.registry)?;
        self.ops.push(op);
        Ok(())
    }

    pub fn finish(self) -> Transaction {
        Transaction::new(self.ops).selection_after(self.selection)
    }

    pub fn finish_with(self, selection_after: Selection) -> Transaction {
        Transaction::new(self.ops).selection_after(selection_after)
    }
}
