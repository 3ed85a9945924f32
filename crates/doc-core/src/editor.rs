use std::collections::VecDeque;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::content::ContentError;
use crate::deferred::TrackedNodes;
use crate::inline::{apply_marks_in_block, clamp_to_char_boundary, is_text_block};
use crate::model::{
    Attrs, Document, Node, PathError, TextNode, children_mut, element_mut, node_mut, node_text_mut,
};
use crate::ops::{AttrPatch, Op, Transaction};
use crate::registry::{CommandError, PluginRegistry, QueryError, TransactionPreview};
use crate::schema::fill_defaults;
use crate::selection::{
    PathChange, Point, Selection, transform_selection_insert_text,
    transform_selection_path_change, transform_selection_remove_run,
    transform_selection_remove_text, transform_selection_replace_inlines,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid op: {0}")]
    InvalidOp(String),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo: 200,
            max_normalize_iterations: 100,
        }
    }
}

impl EditorConfig {
    /// Zero values fall back to the defaults.
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.max_undo == 0 {
            self.max_undo = defaults.max_undo;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = defaults.max_normalize_iterations;
        }
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(s).map(Self::with_defaults)
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: Arc<PluginRegistry>,
    config: EditorConfig,
    undo_stack: VecDeque<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    pub(crate) tracked: TrackedNodes,
}

impl Editor {
    /// Normalizes `doc` and refuses it when it still violates the registry's
    /// content rules or attribute schemas.
    pub fn new(
        doc: Document,
        selection: Selection,
        registry: impl Into<Arc<PluginRegistry>>,
    ) -> Result<Self, ApplyError> {
        let mut editor = Self::empty(registry);
        editor.doc = doc;
        editor.selection = selection;
        editor.settle()?;
        Ok(editor)
    }

    /// An editor over a single empty paragraph.
    pub fn empty(registry: impl Into<Arc<PluginRegistry>>) -> Self {
        Self {
            doc: Document::empty(),
            selection: Selection::collapsed(Point::new(vec![0, 0], 0)),
            registry: registry.into(),
            config: EditorConfig::default(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            tracked: TrackedNodes::default(),
        }
    }

    pub fn with_richtext_plugins() -> Self {
        Self::empty(PluginRegistry::richtext())
    }

    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = config.with_defaults();
        while self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.pop_front();
        }
        self
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = self.registry.normalize_selection(&self.doc, &selection);
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Replaces the document wholesale. History and write-back tickets are
    /// reset; the caret moves to the start.
    pub fn load(&mut self, doc: Document) -> Result<(), ApplyError> {
        let mut next = Self::empty(Arc::clone(&self.registry)).with_config(self.config.clone());
        next.doc = doc;
        next.selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        next.settle()?;
        *self = next;
        Ok(())
    }

    fn settle(&mut self) -> Result<(), ApplyError> {
        normalize_to_fixpoint(
            &mut self.doc,
            &mut self.selection,
            &mut self.tracked,
            &self.registry,
            self.config.max_normalize_iterations,
        )?;
        self.registry.validate_document(&self.doc)?;
        self.selection = self.registry.normalize_selection(&self.doc, &self.selection);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop_back() else {
            return false;
        };

        match self.replay(&record.inverse_ops) {
            Ok(redo_ops) => {
                self.selection = self
                    .registry
                    .normalize_selection(&self.doc, &record.selection_before);
                self.redo_stack.push(UndoRecord {
                    inverse_ops: redo_ops,
                    ..record
                });
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropping undo record that no longer applies");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        match self.replay(&record.inverse_ops) {
            Ok(undo_ops) => {
                self.selection = self
                    .registry
                    .normalize_selection(&self.doc, &record.selection_after);
                self.undo_stack.push_back(UndoRecord {
                    inverse_ops: undo_ops,
                    ..record
                });
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropping redo record that no longer applies");
                false
            }
        }
    }

    /// Applies `ops` all-or-nothing and returns their inverses in reverse
    /// order.
    fn replay(&mut self, ops: &[Op]) -> Result<Vec<Op>, ApplyError> {
        let doc_before = self.doc.clone();
        let selection_before = self.selection.clone();
        let tracked_before = self.tracked.clone();

        let mut inverse_ops = Vec::with_capacity(ops.len());
        for op in ops.iter().cloned() {
            match apply_op_to(&mut self.doc, &mut self.selection, op, &self.registry) {
                Ok(applied) => {
                    self.tracked.remap(&applied.change);
                    inverse_ops.push(applied.inverse);
                }
                Err(err) => {
                    self.doc = doc_before;
                    self.selection = selection_before;
                    self.tracked = tracked_before;
                    return Err(err);
                }
            }
        }
        inverse_ops.reverse();
        Ok(inverse_ops)
    }

    /// Applies a transaction atomically: ops, then `selection_after`, then
    /// normalization and validation. On any failure the document, selection
    /// and tracked handles are left exactly as they were.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let tx = self.transform_transaction(tx);

        if tx.ops.is_empty() {
            if let Some(selection) = tx.selection_after {
                self.set_selection(selection);
            }
            return Ok(());
        }

        let selection_before = self.selection.clone();
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        let mut tracked = self.tracked.clone();

        let inverse_ops = match execute(
            &mut doc,
            &mut selection,
            &mut tracked,
            &tx,
            &self.registry,
            self.config.max_normalize_iterations,
        ) {
            Ok(inverse_ops) => inverse_ops,
            Err(err) => {
                tracing::debug!(source = ?tx.meta.source, error = %err, "transaction rejected");
                return Err(err);
            }
        };

        self.doc = doc;
        self.selection = selection;
        self.tracked = tracked;

        tracing::trace!(
            source = ?tx.meta.source,
            ops = tx.ops.len(),
            "transaction committed"
        );

        self.undo_stack.push_back(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after: self.selection.clone(),
        });
        self.redo_stack.clear();
        while self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.pop_front();
        }

        Ok(())
    }

    fn transform_transaction(&self, mut tx: Transaction) -> Transaction {
        for transform in self.registry.transaction_transforms() {
            if let Some(next) = transform.transform(self, &tx) {
                tx = next;
            }
        }
        tx
    }

    /// The document and selection `tx` would produce, without committing.
    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, ApplyError> {
        let tx = self.transform_transaction(tx.clone());
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        let mut tracked = self.tracked.clone();

        execute(
            &mut doc,
            &mut selection,
            &mut tracked,
            &tx,
            &self.registry,
            self.config.max_normalize_iterations,
        )?;

        Ok(TransactionPreview { doc, selection })
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::UnknownCommand(id.to_string()));
        };
        let result = (command.handler)(self, args);
        if let Err(err) = &result {
            tracing::debug!(command = id, error = %err, "command not applied");
        }
        result
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::UnknownQuery(id.to_string()));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value).map_err(|err| QueryError::Decode(err.to_string()))
    }
}

/// Runs a whole transaction against the given state and returns the
/// inverse ops in undo order.
fn execute(
    doc: &mut Document,
    selection: &mut Selection,
    tracked: &mut TrackedNodes,
    tx: &Transaction,
    registry: &PluginRegistry,
    max_normalize_iterations: usize,
) -> Result<Vec<Op>, ApplyError> {
    let mut inverse_ops = Vec::with_capacity(tx.ops.len());
    for op in tx.ops.iter().cloned() {
        let applied = apply_op_to(doc, selection, op, registry)?;
        tracked.remap(&applied.change);
        inverse_ops.push(applied.inverse);
    }

    if let Some(selection_after) = &tx.selection_after {
        *selection = selection_after.clone();
    }

    inverse_ops.extend(normalize_to_fixpoint(
        doc,
        selection,
        tracked,
        registry,
        max_normalize_iterations,
    )?);
    registry.validate_document(doc)?;
    *selection = registry.normalize_selection(doc, selection);

    inverse_ops.reverse();
    Ok(inverse_ops)
}

fn normalize_to_fixpoint(
    doc: &mut Document,
    selection: &mut Selection,
    tracked: &mut TrackedNodes,
    registry: &PluginRegistry,
    max_iterations: usize,
) -> Result<Vec<Op>, ApplyError> {
    let mut inverse_ops = Vec::new();
    for _ in 0..max_iterations {
        let mut changed = false;
        for pass in registry.normalize_passes() {
            let ops = pass.run(doc, registry);
            if ops.is_empty() {
                continue;
            }
            changed = true;
            tracing::trace!(pass = pass.id(), ops = ops.len(), "normalize");
            for op in ops {
                let applied = apply_op_to(doc, selection, op, registry)?;
                tracked.remap(&applied.change);
                inverse_ops.push(applied.inverse);
            }
        }
        if !changed {
            return Ok(inverse_ops);
        }
    }
    Err(ApplyError::NormalizeDidNotConverge)
}

pub(crate) struct Applied {
    pub inverse: Op,
    pub change: PathChange,
}

impl Applied {
    fn new(inverse: Op, change: PathChange) -> Self {
        Self { inverse, change }
    }
}

pub(crate) fn apply_op_to(
    doc: &mut Document,
    selection: &mut Selection,
    op: Op,
    registry: &PluginRegistry,
) -> Result<Applied, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Applied::new(
                Op::RemoveText {
                    path,
                    range: offset..offset + text.len(),
                },
                PathChange::None,
            ))
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start = clamp_to_char_boundary(&text_node.text, range.start);
            let end = clamp_to_char_boundary(&text_node.text, range.end);
            if start >= end {
                return Ok(Applied::new(
                    Op::InsertText {
                        path,
                        offset: start,
                        text: String::new(),
                    },
                    PathChange::None,
                ));
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Applied::new(
                Op::InsertText {
                    path,
                    offset: start,
                    text: removed,
                },
                PathChange::None,
            ))
        }
        Op::InsertNode { path, node } => {
            let (index, parent_path) = split_path(&path)?;
            let children = children_mut(doc, parent_path)?;
            if index > children.len() {
                return Err(ApplyError::InvalidPath(format!(
                    "Insert index out of bounds: {index} > {}",
                    children.len()
                )));
            }
            children.insert(index, node);
            let change = PathChange::Inserted(path.clone());
            transform_selection_path_change(selection, &change, false, 0);
            Ok(Applied::new(Op::RemoveNode { path }, change))
        }
        Op::RemoveNode { path } => {
            let (index, parent_path) = split_path(&path)?;
            let children = children_mut(doc, parent_path)?;
            if index >= children.len() {
                return Err(ApplyError::InvalidPath(format!(
                    "Remove index out of bounds: {index} >= {}",
                    children.len()
                )));
            }
            let removed = children.remove(index);
            let siblings_after = children.len();
            let change = PathChange::Removed(path.clone());
            if matches!(removed, Node::Text(_)) {
                let prev_len = index
                    .checked_sub(1)
                    .and_then(|prev| children[prev].as_text())
                    .map(|t| t.text.len());
                transform_selection_remove_run(selection, &path, prev_len, siblings_after);
            } else {
                transform_selection_path_change(selection, &change, false, siblings_after);
            }
            Ok(Applied::new(
                Op::InsertNode {
                    path,
                    node: removed,
                },
                change,
            ))
        }
        Op::SplitNode {
            path,
            position,
            attrs,
        } => {
            let (index, parent_path) = split_path(&path)?;
            let children = children_mut(doc, parent_path)?;
            let node = children.get_mut(index).ok_or_else(|| {
                ApplyError::InvalidPath(format!("Split target out of bounds: {index}"))
            })?;
            let (right, text_node) = match node {
                Node::Text(t) => {
                    if position > t.text.len() || !t.text.is_char_boundary(position) {
                        return Err(ApplyError::InvalidOp(format!(
                            "Cannot split text at {position}"
                        )));
                    }
                    let text = t.text.split_off(position);
                    (Node::Text(TextNode::marked(text, t.marks.clone())), true)
                }
                Node::Element(el) => {
                    if position > el.children.len() {
                        return Err(ApplyError::InvalidOp(format!(
                            "Cannot split `{}` at child {position}",
                            el.kind
                        )));
                    }
                    let moved = el.children.split_off(position);
                    (
                        Node::element(el.kind.clone(), attrs.clone(), moved),
                        false,
                    )
                }
                Node::Void(_) | Node::Opaque(_) => {
                    return Err(ApplyError::InvalidOp("Atomic nodes cannot be split".into()));
                }
            };
            children.insert(index + 1, right);

            let change = PathChange::Split {
                path: path.clone(),
                position,
            };
            transform_selection_path_change(selection, &change, text_node, 0);

            let mut right_path = path;
            if let Some(last) = right_path.last_mut() {
                *last += 1;
            }
            Ok(Applied::new(
                Op::MergeNode {
                    path: right_path,
                    position,
                    attrs,
                },
                change,
            ))
        }
        Op::MergeNode { path, .. } => {
            let (index, parent_path) = split_path(&path)?;
            if index == 0 {
                return Err(ApplyError::InvalidOp(
                    "First child has no previous sibling to merge into".into(),
                ));
            }
            let children = children_mut(doc, parent_path)?;
            if index >= children.len() {
                return Err(ApplyError::InvalidPath(format!(
                    "Merge target out of bounds: {index} >= {}",
                    children.len()
                )));
            }
            let compatible = match (&children[index - 1], &children[index]) {
                (Node::Text(left), Node::Text(right)) => left.marks == right.marks,
                (Node::Element(left), Node::Element(right)) => left.kind == right.kind,
                _ => false,
            };
            if !compatible {
                return Err(ApplyError::InvalidOp(
                    "Only text runs with equal marks or elements of one type can merge".into(),
                ));
            }

            let right = children.remove(index);
            let (position, right_attrs, text_node) = match (&mut children[index - 1], right) {
                (Node::Text(left), Node::Text(right)) => {
                    let position = left.text.len();
                    left.text.push_str(&right.text);
                    (position, Attrs::new(), true)
                }
                (Node::Element(left), Node::Element(right)) => {
                    let position = left.children.len();
                    left.children.extend(right.children);
                    (position, right.attrs, false)
                }
                _ => unreachable!("merge compatibility checked above"),
            };

            let change = PathChange::Merged {
                path: path.clone(),
                position,
            };
            transform_selection_path_change(selection, &change, text_node, 0);

            let mut left_path = path;
            if let Some(last) = left_path.last_mut() {
                *last -= 1;
            }
            Ok(Applied::new(
                Op::SplitNode {
                    path: left_path,
                    position,
                    attrs: right_attrs,
                },
                change,
            ))
        }
        Op::SetNodeAttrs { path, patch } => {
            let node = node_mut(doc, &path)?;
            let (kind, attrs) = match node {
                Node::Element(el) => (el.kind.as_str(), &mut el.attrs),
                Node::Void(v) => (v.kind.as_str(), &mut v.attrs),
                Node::Text(_) | Node::Opaque(_) => {
                    return Err(ApplyError::InvalidPath("Node has no attributes".into()));
                }
            };
            let node_type = registry
                .get(kind)
                .ok_or_else(|| ContentError::UnknownType(kind.to_string()))?;

            let mut coerced = AttrPatch {
                set: Attrs::new(),
                remove: patch.remove,
            };
            for (name, value) in patch.set {
                let spec = node_type
                    .attr_spec(&name)
                    .ok_or_else(|| ContentError::UnknownAttr {
                        kind: kind.to_string(),
                        attr: name.clone(),
                    })?;
                let value = spec.coerce(&value).ok_or_else(|| ContentError::InvalidAttr {
                    kind: kind.to_string(),
                    attr: name.clone(),
                })?;
                coerced.set.insert(name, value);
            }

            let old = patch_apply(attrs, &coerced);
            Ok(Applied::new(
                Op::SetNodeAttrs { path, patch: old },
                PathChange::None,
            ))
        }
        Op::AddMark {
            path,
            range,
            name,
            attrs,
        } => {
            let mark = registry
                .mark(&name)
                .ok_or_else(|| ContentError::UnknownMark(name.clone()))?;
            let mut mark_attrs = Attrs::new();
            for (attr, value) in attrs {
                let spec = mark
                    .attrs
                    .iter()
                    .find(|spec| spec.name == attr)
                    .ok_or_else(|| ContentError::UnknownAttr {
                        kind: name.clone(),
                        attr: attr.clone(),
                    })?;
                let value = spec.coerce(&value).ok_or_else(|| ContentError::InvalidAttr {
                    kind: name.clone(),
                    attr: attr.clone(),
                })?;
                mark_attrs.insert(attr, value);
            }
            fill_defaults(&mark.attrs, &mut mark_attrs);

            replace_runs(doc, selection, path, registry, |children| {
                apply_marks_in_block(children, range.start, range.end, &|marks| {
                    marks.add(name.clone(), mark_attrs.clone())
                })
            })
        }
        Op::RemoveMark { path, range, name } => {
            replace_runs(doc, selection, path, registry, |children| {
                apply_marks_in_block(children, range.start, range.end, &|marks| {
                    marks.remove(&name);
                })
            })
        }
        Op::ReplaceInlines { path, children } => {
            replace_runs(doc, selection, path, registry, |_| children)
        }
    }
}

fn replace_runs(
    doc: &mut Document,
    selection: &mut Selection,
    path: Vec<usize>,
    registry: &PluginRegistry,
    rewrite: impl FnOnce(&[Node]) -> Vec<Node>,
) -> Result<Applied, ApplyError> {
    let el = element_mut(doc, &path)?;
    if !is_text_block(el, registry) {
        return Err(ApplyError::InvalidOp(format!(
            "`{}` does not hold text runs",
            el.kind
        )));
    }
    let next = rewrite(&el.children);
    let old = std::mem::replace(&mut el.children, next);
    transform_selection_replace_inlines(selection, &path, &old, &el.children);
    Ok(Applied::new(
        Op::ReplaceInlines {
            path,
            children: old,
        },
        PathChange::None,
    ))
}

fn split_path(path: &[usize]) -> Result<(usize, &[usize]), ApplyError> {
    path.split_last()
        .map(|(ix, parent)| (*ix, parent))
        .ok_or_else(|| ApplyError::InvalidPath("Empty path".into()))
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set = Attrs::new();
    let mut old_remove = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}

