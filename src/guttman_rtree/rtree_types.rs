//! Node and entry types for the Guttman variant.

use crate::arena::NodeId;
use crate::rect::Rect;

/// A data entry held by a leaf.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    pub rect: Rect<f64>,
    pub payload: T,
}

/// Node contents: a leaf holds data entries, an internal node holds
/// child ids. A node is exactly one of the two.
#[derive(Debug)]
pub(crate) enum NodeKind<T> {
    Leaf(Vec<Entry<T>>),
    Internal(Vec<NodeId>),
}

#[derive(Debug)]
pub(crate) struct Node<T> {
    pub parent: Option<NodeId>,
    /// Bounding rectangle covering everything below this node.
    pub mbr: Rect<f64>,
    pub kind: NodeKind<T>,
}

impl<T> Node<T> {
    pub(crate) fn fill(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.len(),
            NodeKind::Internal(children) => children.len(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }
}
