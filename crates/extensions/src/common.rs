use blockdoc_core::builtin::focus_block_path;
use blockdoc_core::{
    AttrPatch, Attrs, CommandError, Document, Editor, ElementNode, Node, Op, Path, Transaction,
    ancestor_element_path,
};

/// Path of the closest `kind` node at or above the caret. Atomic nodes match
/// when the caret sits on them.
pub(crate) fn focused(editor: &Editor, kind: &str) -> Option<Path> {
    let path = focus_block_path(editor)?;
    match editor.doc().node(&path) {
        Some(Node::Void(v)) if v.kind == kind => Some(path),
        _ => ancestor_element_path(editor.doc(), &path, kind),
    }
}

pub(crate) fn require_focused(editor: &Editor, kind: &str) -> Result<Path, CommandError> {
    focused(editor, kind)
        .ok_or_else(|| CommandError::not_applicable(format!("The cursor is not in a {kind}")))
}

/// Writes `attrs` onto the node at `path` as one transaction.
pub(crate) fn set_attrs(
    editor: &mut Editor,
    path: Path,
    attrs: Attrs,
    source: &str,
) -> Result<(), CommandError> {
    let tx = Transaction::new(vec![Op::SetNodeAttrs {
        path,
        patch: AttrPatch::set(attrs),
    }])
    .source(source);
    editor.apply(tx)?;
    Ok(())
}

pub(crate) fn attrs_of<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Attrs {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Every element of `kind`, depth first.
pub(crate) fn elements_of_kind<'a>(doc: &'a Document, kind: &str) -> Vec<(Path, &'a ElementNode)> {
    fn walk<'a>(
        nodes: &'a [Node],
        kind: &str,
        path: &mut Path,
        out: &mut Vec<(Path, &'a ElementNode)>,
    ) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };
            path.push(ix);
            if el.kind == kind {
                out.push((path.clone(), el));
            }
            walk(&el.children, kind, path, out);
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, kind, &mut Vec::new(), &mut out);
    out
}

pub(crate) fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}
