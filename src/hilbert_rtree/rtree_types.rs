//! Node and entry types for the Hilbert variant.

use crate::arena::NodeId;
use crate::rect::Rect;

/// A data entry held by a leaf: rectangle, centroid Hilbert key, payload.
#[derive(Debug)]
pub(crate) struct HilbertEntry<T> {
    pub rect: Rect<i64>,
    pub key: u128,
    pub payload: T,
}

/// Node contents. Leaf entries are kept sorted by Hilbert key, internal
/// children by their `lhv`.
#[derive(Debug)]
pub(crate) enum HilbertNodeKind<T> {
    Leaf(Vec<HilbertEntry<T>>),
    Internal(Vec<NodeId>),
}

#[derive(Debug)]
pub(crate) struct HilbertNode<T> {
    pub parent: Option<NodeId>,
    /// Chain neighbor with smaller keys, possibly under another parent.
    pub prev: Option<NodeId>,
    /// Chain neighbor with larger keys, possibly under another parent.
    pub next: Option<NodeId>,
    pub mbr: Rect<i64>,
    /// Largest Hilbert value in the subtree below this node.
    pub lhv: u128,
    pub kind: HilbertNodeKind<T>,
}

impl<T> HilbertNode<T> {
    pub(crate) fn fill(&self) -> usize {
        match &self.kind {
            HilbertNodeKind::Leaf(entries) => entries.len(),
            HilbertNodeKind::Internal(children) => children.len(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, HilbertNodeKind::Leaf(_))
    }
}
