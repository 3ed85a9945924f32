use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::inline::{point_for_global_offset, point_global_offset};
use crate::model::{Document, Node, Path};

/// A position in the document. `path` addresses a text run (and `offset` is
/// a byte offset into it) or an atomic node (and `offset` is 0).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    /// Path of the block holding this point: the parent of a text run.
    pub fn block_path(&self) -> &[usize] {
        self.path.split_last().map(|(_, p)| p).unwrap_or(&[])
    }

    pub fn inline_index(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// The moving end of the selection.
    pub fn head(&self) -> &Point {
        &self.focus
    }

    /// `(start, end)` in document order.
    pub fn ordered(&self) -> (Point, Point) {
        if self.focus < self.anchor {
            (self.focus.clone(), self.anchor.clone())
        } else {
            (self.anchor.clone(), self.focus.clone())
        }
    }

    fn points_mut(&mut self) -> [&mut Point; 2] {
        [&mut self.anchor, &mut self.focus]
    }
}

/// How an applied op moved node addresses. Used to remap selections and
/// tracked node handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathChange {
    None,
    Inserted(Path),
    Removed(Path),
    Split { path: Path, position: usize },
    Merged { path: Path, position: usize },
}

impl PathChange {
    /// New address of the node at `path`, or `None` when the node is gone.
    pub(crate) fn map_path(&self, path: &[usize]) -> Option<Path> {
        match self {
            PathChange::None => Some(path.to_vec()),
            PathChange::Inserted(at) => {
                let mut out = path.to_vec();
                let depth = at.len() - 1;
                if sibling_or_descendant(at, path) && path[depth] >= at[depth] {
                    out[depth] += 1;
                }
                Some(out)
            }
            PathChange::Removed(at) => {
                if path.starts_with(at) {
                    return None;
                }
                let mut out = path.to_vec();
                let depth = at.len() - 1;
                if sibling_or_descendant(at, path) && path[depth] > at[depth] {
                    out[depth] -= 1;
                }
                Some(out)
            }
            PathChange::Split { path: at, position } => {
                let depth = at.len() - 1;
                let mut out = path.to_vec();
                if path.len() > at.len() && path.starts_with(at) {
                    let child = path[at.len()];
                    if child >= *position {
                        out[depth] += 1;
                        out[at.len()] = child - position;
                    }
                } else if sibling_or_descendant(at, path) && path[depth] > at[depth] {
                    out[depth] += 1;
                }
                Some(out)
            }
            PathChange::Merged { path: at, position } => {
                if path == at.as_slice() {
                    return None;
                }
                let depth = at.len() - 1;
                let mut out = path.to_vec();
                if path.len() > at.len() && path.starts_with(at) {
                    out[depth] -= 1;
                    out[at.len()] += position;
                } else if sibling_or_descendant(at, path) && path[depth] > at[depth] {
                    out[depth] -= 1;
                }
                Some(out)
            }
        }
    }
}

/// True when `path` runs through a sibling slot of `at` (same parent).
fn sibling_or_descendant(at: &[usize], path: &[usize]) -> bool {
    let parent = &at[..at.len() - 1];
    path.len() >= at.len() && path.starts_with(parent)
}

pub(crate) fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in selection.points_mut() {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

/// Points inside the removed range collapse to its start.
pub(crate) fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in selection.points_mut() {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset -= removed_len;
        } else {
            point.offset = range.start;
        }
    }
}

/// Remaps through a structural change. `text_split` is true when the split or
/// merged node is a text run, in which case `position` is a byte offset.
pub(crate) fn transform_selection_path_change(
    selection: &mut Selection,
    change: &PathChange,
    text_node: bool,
    siblings_after: usize,
) {
    for point in selection.points_mut() {
        match change {
            PathChange::Split { path, position } if text_node && point.path == *path => {
                if point.offset >= *position {
                    if let Some(last) = point.path.last_mut() {
                        *last += 1;
                    }
                    point.offset -= position;
                }
            }
            PathChange::Merged { path, position } if point.path == *path => {
                if let Some(last) = point.path.last_mut() {
                    *last -= 1;
                }
                if text_node {
                    point.offset += position;
                } else {
                    point.offset = 0;
                }
            }
            PathChange::Removed(path) if point.path.starts_with(path) => {
                // The caret lands on the node now occupying the slot, or the
                // previous one when the removed node was last.
                let depth = path.len() - 1;
                point.path.truncate(path.len());
                if point.path[depth] >= siblings_after {
                    point.path[depth] = siblings_after.saturating_sub(1);
                }
                point.offset = 0;
                if siblings_after == 0 {
                    point.path.truncate(depth);
                }
            }
            _ => {
                if let Some(mapped) = change.map_path(&point.path) {
                    point.path = mapped;
                }
            }
        }
    }
}

/// A removed text run hands its points to the run sliding into its slot, or
/// to the end of the previous run when it was the last one.
pub(crate) fn transform_selection_remove_run(
    selection: &mut Selection,
    path: &[usize],
    prev_len: Option<usize>,
    siblings_after: usize,
) {
    let change = PathChange::Removed(path.to_vec());
    let ix = path.last().copied().unwrap_or_default();
    for point in selection.points_mut() {
        if point.path != path {
            if let Some(mapped) = change.map_path(&point.path) {
                point.path = mapped;
            }
            continue;
        }
        match prev_len {
            _ if ix < siblings_after => point.offset = 0,
            Some(len) => {
                point.path[path.len() - 1] = ix - 1;
                point.offset = len;
            }
            None => {
                point.path.truncate(path.len() - 1);
                point.offset = 0;
            }
        }
    }
}

/// Remaps points inside a text block whose runs were replaced. Points keep
/// their offset into the block's text, clamped to the new length.
pub(crate) fn transform_selection_replace_inlines(
    selection: &mut Selection,
    block_path: &[usize],
    old_children: &[Node],
    new_children: &[Node],
) {
    let new_len: usize = new_children
        .iter()
        .filter_map(Node::as_text)
        .map(|t| t.text.len())
        .sum();
    for point in selection.points_mut() {
        if point.path.len() != block_path.len() + 1 || !point.path.starts_with(block_path) {
            continue;
        }
        let global = point_global_offset(old_children, point.inline_index(), point.offset);
        *point = point_for_global_offset(block_path, new_children, global.min(new_len));
    }
}

/// First addressable point at or below `path`: a text run at offset 0 or an
/// atomic node.
pub fn first_point_in(doc: &Document, path: &[usize]) -> Option<Point> {
    let node = doc.node(path)?;
    match node {
        Node::Text(_) | Node::Void(_) | Node::Opaque(_) => Some(Point::new(path.to_vec(), 0)),
        Node::Element(el) => el.children.iter().enumerate().find_map(|(ix, _)| {
            let mut child = path.to_vec();
            child.push(ix);
            first_point_in(doc, &child)
        }),
    }
}

/// Last addressable point at or below `path`.
pub fn last_point_in(doc: &Document, path: &[usize]) -> Option<Point> {
    let node = doc.node(path)?;
    match node {
        Node::Text(t) => Some(Point::new(path.to_vec(), t.text.len())),
        Node::Void(_) | Node::Opaque(_) => Some(Point::new(path.to_vec(), 0)),
        Node::Element(el) => el.children.iter().enumerate().rev().find_map(|(ix, _)| {
            let mut child = path.to_vec();
            child.push(ix);
            last_point_in(doc, &child)
        }),
    }
}

pub fn document_start(doc: &Document) -> Option<Point> {
    (0..doc.children.len()).find_map(|ix| first_point_in(doc, &[ix]))
}

pub fn document_end(doc: &Document) -> Option<Point> {
    (0..doc.children.len())
        .rev()
        .find_map(|ix| last_point_in(doc, &[ix]))
}

/// Resolves `point` to the nearest valid position, clamping indices and
/// offsets along the way.
pub(crate) fn normalize_point(doc: &Document, point: &Point) -> Option<Point> {
    let mut resolved: Path = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                let offset = crate::inline::clamp_to_char_boundary(&t.text, point.offset);
                return Some(Point::new(resolved, offset));
            }
            Node::Void(_) | Node::Opaque(_) => return Some(Point::new(resolved, 0)),
            Node::Element(el) => children = &el.children,
        }
    }

    if resolved.is_empty() {
        return None;
    }
    first_point_in(doc, &resolved).or_else(|| {
        resolved.pop();
        (!resolved.is_empty())
            .then(|| first_point_in(doc, &resolved))
            .flatten()
    })
}

pub(crate) fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    let fallback = document_start(doc).unwrap_or_else(|| Point::new(vec![0], 0));
    let anchor = normalize_point(doc, &selection.anchor)
        .or_else(|| normalize_point(doc, &selection.focus))
        .unwrap_or_else(|| fallback.clone());
    let focus = normalize_point(doc, &selection.focus).unwrap_or_else(|| anchor.clone());
    Selection { anchor, focus }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_sorts_by_path_then_offset() {
        let sel = Selection::new(Point::new(vec![1, 0], 2), Point::new(vec![0, 0], 5));
        let (start, end) = sel.ordered();
        assert_eq!(start.path, vec![0, 0]);
        assert_eq!(end.path, vec![1, 0]);
        assert_eq!(sel.head(), &sel.focus);
    }

    #[test]
    fn removal_collapses_points_to_range_start() {
        let mut sel = Selection::new(Point::new(vec![0, 0], 3), Point::new(vec![0, 0], 8));
        transform_selection_remove_text(&mut sel, &[0, 0], 2..6);
        assert_eq!(sel.anchor.offset, 2);
        assert_eq!(sel.focus.offset, 4);
    }

    #[test]
    fn split_moves_descendants_into_new_sibling() {
        let change = PathChange::Split {
            path: vec![2],
            position: 1,
        };
        assert_eq!(change.map_path(&[2, 0, 0]), Some(vec![2, 0, 0]));
        assert_eq!(change.map_path(&[2, 3, 0]), Some(vec![3, 2, 0]));
        assert_eq!(change.map_path(&[4]), Some(vec![5]));
        assert_eq!(change.map_path(&[1, 7]), Some(vec![1, 7]));
    }

    #[test]
    fn merge_and_remove_drop_the_node() {
        let merged = PathChange::Merged {
            path: vec![1],
            position: 2,
        };
        assert_eq!(merged.map_path(&[1]), None);
        assert_eq!(merged.map_path(&[1, 0]), Some(vec![0, 2]));
        assert_eq!(merged.map_path(&[3]), Some(vec![2]));

        let removed = PathChange::Removed(vec![0, 1]);
        assert_eq!(removed.map_path(&[0, 1, 4]), None);
        assert_eq!(removed.map_path(&[0, 2]), Some(vec![0, 1]));
        assert_eq!(removed.map_path(&[1]), Some(vec![1]));
    }
}
