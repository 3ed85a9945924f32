//! Write-back of results produced outside the editor (renders, uploads,
//! remote transformations). A ticket names a node by a handle that follows
//! the node through every edit; only the newest ticket for a node may write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::editor::{ApplyError, Editor};
use crate::model::{Attrs, Node, Path};
use crate::ops::{AttrPatch, Op, Transaction};
use crate::selection::PathChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle(u64);

#[derive(Debug, Clone)]
struct TrackedNode {
    path: Path,
    kind: String,
    generation: u64,
}

/// Live nodes only: an entry is dropped as soon as its node is removed or
/// merged away, so the map never outgrows the document.
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackedNodes {
    next_handle: u64,
    nodes: BTreeMap<NodeHandle, TrackedNode>,
}

impl TrackedNodes {
    pub(crate) fn remap(&mut self, change: &PathChange) {
        if matches!(change, PathChange::None) {
            return;
        }
        self.nodes.retain(|_, node| match change.map_path(&node.path) {
            Some(path) => {
                node.path = path;
                true
            }
            None => false,
        });
    }

    fn handle_for(&self, path: &[usize]) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|(_, node)| node.path == path)
            .map(|(handle, _)| *handle)
    }

    /// Handed out by this editor, whether or not the node still exists.
    fn issued(&self, handle: NodeHandle) -> bool {
        handle.0 < self.next_handle
    }

    fn track(&mut self, path: &[usize], kind: &str) -> (NodeHandle, u64) {
        if let Some(handle) = self.handle_for(path)
            && let Some(node) = self.nodes.get_mut(&handle)
            && node.kind == kind
        {
            node.generation += 1;
            return (handle, node.generation);
        }

        let handle = NodeHandle(self.next_handle);
        self.next_handle += 1;
        // A stale entry at the same path belonged to a different node type.
        self.nodes.retain(|_, node| node.path != path);
        self.nodes.insert(
            handle,
            TrackedNode {
                path: path.to_vec(),
                kind: kind.to_string(),
                generation: 1,
            },
        );
        (handle, 1)
    }
}

/// Proof that a write-back was requested. `snapshot` holds the node's
/// attributes at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteTicket {
    pub handle: NodeHandle,
    pub generation: u64,
    pub kind: String,
    pub snapshot: Attrs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteBackOutcome {
    Applied,
    /// A newer ticket exists for the node, or the request was cancelled.
    Superseded,
    /// The node was removed or replaced by a node of another type.
    TargetGone,
    /// The attributes did not fit the node's schema.
    Rejected(ApplyError),
}

impl Editor {
    /// Starts tracking the element or atomic node at `path` and returns a
    /// ticket that supersedes every earlier ticket for the same node.
    pub fn begin_write_back(&mut self, path: &[usize]) -> Result<WriteTicket, ApplyError> {
        let (kind, snapshot) = match self.doc().node(path) {
            Some(Node::Element(el)) => (el.kind.clone(), el.attrs.clone()),
            Some(Node::Void(v)) => (v.kind.clone(), v.attrs.clone()),
            Some(Node::Text(_) | Node::Opaque(_)) => {
                return Err(ApplyError::InvalidPath(
                    "Write-back target has no attributes".into(),
                ));
            }
            None => {
                return Err(ApplyError::InvalidPath(format!(
                    "No node at {path:?}"
                )));
            }
        };

        let (handle, generation) = self.tracked.track(path, &kind);
        tracing::trace!(?handle, generation, kind = %kind, "write-back requested");
        Ok(WriteTicket {
            handle,
            generation,
            kind,
            snapshot,
        })
    }

    /// Current path of a tracked node, `None` once the node is gone.
    pub fn tracked_path(&self, handle: NodeHandle) -> Option<Path> {
        Some(self.tracked.nodes.get(&handle)?.path.clone())
    }

    /// Writes `attrs` onto the ticket's node as a single undoable
    /// transaction, unless the ticket is stale or the node is gone.
    pub fn complete_write_back(&mut self, ticket: &WriteTicket, attrs: Attrs) -> WriteBackOutcome {
        let Some(tracked) = self.tracked.nodes.get(&ticket.handle) else {
            if self.tracked.issued(ticket.handle) {
                tracing::debug!(handle = ?ticket.handle, "write-back discarded: node removed");
                return WriteBackOutcome::TargetGone;
            }
            tracing::debug!(handle = ?ticket.handle, "write-back discarded: handle unknown");
            return WriteBackOutcome::Superseded;
        };
        if tracked.generation != ticket.generation {
            tracing::debug!(
                handle = ?ticket.handle,
                ticket = ticket.generation,
                latest = tracked.generation,
                "write-back discarded: superseded"
            );
            return WriteBackOutcome::Superseded;
        }
        let path = tracked.path.clone();
        if self.doc().node(&path).map(Node::kind) != Some(ticket.kind.as_str()) {
            tracing::debug!(handle = ?ticket.handle, "write-back discarded: node replaced");
            return WriteBackOutcome::TargetGone;
        }

        let tx = Transaction::new(vec![Op::SetNodeAttrs {
            path,
            patch: AttrPatch::set(attrs),
        }])
        .source("write_back");
        match self.apply(tx) {
            Ok(()) => WriteBackOutcome::Applied,
            Err(err) => WriteBackOutcome::Rejected(err),
        }
    }

    /// Makes every outstanding ticket for the node stale.
    pub fn cancel_write_back(&mut self, ticket: &WriteTicket) {
        if let Some(node) = self.tracked.nodes.get_mut(&ticket.handle)
            && node.generation == ticket.generation
        {
            node.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Attrs, Document, Node};
    use crate::ops::{Op, Transaction};
    use crate::registry::PluginRegistry;
    use crate::selection::{Point, Selection};
    use crate::{Editor, WriteBackOutcome};

    fn divider_editor() -> Editor {
        Editor::new(
            Document {
                children: vec![Node::paragraph("keep"), Node::divider()],
            },
            Selection::collapsed(Point::new(vec![0, 0], 0)),
            PluginRegistry::richtext(),
        )
        .unwrap()
    }

    #[test]
    fn removed_nodes_stop_being_tracked() {
        let mut editor = divider_editor();
        let mut tickets = Vec::new();
        for _ in 0..50 {
            tickets.push(editor.begin_write_back(&[1]).unwrap());
            editor
                .apply(Transaction::new(vec![Op::RemoveNode { path: vec![1] }]))
                .unwrap();
            editor
                .apply(Transaction::new(vec![Op::InsertNode {
                    path: vec![1],
                    node: Node::divider(),
                }]))
                .unwrap();
            assert!(editor.tracked.nodes.is_empty());
        }

        let live = editor.begin_write_back(&[1]).unwrap();
        assert_eq!(editor.tracked.nodes.len(), 1);
        assert_eq!(
            editor.complete_write_back(&tickets[0], Attrs::new()),
            WriteBackOutcome::TargetGone
        );
        assert_eq!(editor.tracked_path(live.handle), Some(vec![1]));
    }
}
