//! GuttmanRTree implementation.

use log::debug;

use super::rtree_types::{Entry, Node, NodeKind};
use super::split::quadratic_partition;
use crate::arena::{Arena, NodeId};
use crate::errors::{SpatialError, SpatialResult};
use crate::rect::Rect;

/// Classical R-tree over `f64` coordinates.
///
/// `m` (minimum fill) and `M` (maximum fill) bound every non-root node;
/// the root may hold as little as a single entry. Dimensionality is
/// fixed by the first successful insert.
///
/// # Example
///
/// ```
/// use spatial_rtree::{GuttmanRTree, Rect};
///
/// # fn main() -> spatial_rtree::SpatialResult<()> {
/// let mut tree = GuttmanRTree::new(2, 4)?;
/// tree.insert(Rect::new(vec![0.0, 0.0], vec![1.0, 1.0])?, "a")?;
/// let hits = tree.search(&Rect::new(vec![0.5, 0.5], vec![0.5, 0.5])?);
/// assert_eq!(hits, vec![&"a"]);
/// # Ok(())
/// # }
/// ```
pub struct GuttmanRTree<T> {
    arena: Arena<Node<T>>,
    root: Option<NodeId>,
    min_fill: usize,
    max_fill: usize,
    dims: Option<usize>,
    len: usize,
}

impl<T> GuttmanRTree<T> {
    /// Creates an empty tree with fill bounds `m` and `M`.
    ///
    /// Fails with `InvalidParameter` when `m > M / 2`.
    pub fn new(min_fill: usize, max_fill: usize) -> SpatialResult<Self> {
        if min_fill > max_fill / 2 {
            return Err(SpatialError::InvalidParameter(format!(
                "minimum fill {min_fill} must be at most half of maximum fill {max_fill}"
            )));
        }
        Ok(GuttmanRTree {
            arena: Arena::new(),
            root: None,
            min_fill,
            max_fill,
            dims: None,
            len: 0,
        })
    }

    /// Number of entries currently indexed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds an entry.
    ///
    /// Fails with `DimensionMismatch` when `rect` disagrees with the
    /// dimensionality established by the first insert.
    pub fn insert(&mut self, rect: Rect<f64>, payload: T) -> SpatialResult<()> {
        match self.dims {
            Some(d) if d != rect.dim() => {
                return Err(SpatialError::DimensionMismatch {
                    expected: d,
                    actual: rect.dim(),
                })
            }
            None => self.dims = Some(rect.dim()),
            _ => {}
        }
        self.insert_entry(Entry { rect, payload });
        self.len += 1;
        Ok(())
    }

    /// Removes the first entry whose rectangle equals `rect` under the
    /// coordinate tolerance. No-op when no such entry exists.
    pub fn remove(&mut self, rect: &Rect<f64>) {
        let Some(root) = self.root else { return };
        let Some((leaf, pos)) = self.find_entry(root, rect) else {
            return;
        };
        if let NodeKind::Leaf(entries) = &mut self.arena.get_mut(leaf).kind {
            entries.remove(pos);
        }
        self.len -= 1;
        self.condense(leaf);
    }

    /// Returns the payloads of all entries overlapping `window`, in
    /// unspecified order.
    pub fn search(&self, window: &Rect<f64>) -> Vec<&T> {
        let mut out = Vec::new();
        let Some(root) = self.root else { return out };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match &self.arena.get(id).kind {
                NodeKind::Leaf(entries) => {
                    for entry in entries {
                        if entry.rect.overlaps(window) {
                            out.push(&entry.payload);
                        }
                    }
                }
                NodeKind::Internal(children) => {
                    for &child in children {
                        if self.arena.get(child).mbr.overlaps(window) {
                            stack.push(child);
                        }
                    }
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Core insertion path, shared with condense-tree reinsertion (does
    /// not touch the entry count).
    fn insert_entry(&mut self, entry: Entry<T>) {
        let Some(root) = self.root else {
            let node = Node {
                parent: None,
                mbr: entry.rect.clone(),
                kind: NodeKind::Leaf(vec![entry]),
            };
            self.root = Some(self.arena.insert(node));
            return;
        };

        let leaf = self.choose_leaf(root, &entry.rect);
        if let NodeKind::Leaf(entries) = &mut self.arena.get_mut(leaf).kind {
            entries.push(entry);
        }
        let split = (self.arena.get(leaf).fill() > self.max_fill).then(|| self.split_node(leaf));
        self.adjust_path(leaf, split);
    }

    /// Descends to the leaf needing the least area enlargement at each
    /// level; ties go to the child with the smaller current area.
    fn choose_leaf(&self, mut node: NodeId, rect: &Rect<f64>) -> NodeId {
        loop {
            let children = match &self.arena.get(node).kind {
                NodeKind::Leaf(_) => return node,
                NodeKind::Internal(children) => children,
            };
            let mut best = children[0];
            let mut best_growth = f64::INFINITY;
            let mut best_area = f64::INFINITY;
            for &child in children {
                let mbr = &self.arena.get(child).mbr;
                let growth = mbr.enlargement(rect);
                let area = mbr.area();
                if growth < best_growth || (growth == best_growth && area < best_area) {
                    best_growth = growth;
                    best_area = area;
                    best = child;
                }
            }
            node = best;
        }
    }

    /// Splits an overfull node in two with the quadratic partition and
    /// returns the freshly created sibling. Both MBRs are recomputed
    /// from scratch.
    fn split_node(&mut self, id: NodeId) -> NodeId {
        let parent = self.arena.get(id).parent;
        let sibling = if self.arena.get(id).is_leaf() {
            let drained = match &mut self.arena.get_mut(id).kind {
                NodeKind::Leaf(entries) => std::mem::take(entries),
                NodeKind::Internal(_) => unreachable!("leaf node changed kind"),
            };
            let rects: Vec<Rect<f64>> = drained.iter().map(|e| e.rect.clone()).collect();
            let (keep, give) = quadratic_partition(&rects, self.min_fill);
            let (kept, given) = partition_by_index(drained, &keep, &give);
            let kept_mbr = mbr_of(kept.iter().map(|e| &e.rect));
            let given_mbr = mbr_of(given.iter().map(|e| &e.rect));

            let node = self.arena.get_mut(id);
            node.kind = NodeKind::Leaf(kept);
            node.mbr = kept_mbr;
            self.arena.insert(Node {
                parent,
                mbr: given_mbr,
                kind: NodeKind::Leaf(given),
            })
        } else {
            let drained = match &mut self.arena.get_mut(id).kind {
                NodeKind::Internal(children) => std::mem::take(children),
                NodeKind::Leaf(_) => unreachable!("internal node changed kind"),
            };
            let rects: Vec<Rect<f64>> = drained
                .iter()
                .map(|&c| self.arena.get(c).mbr.clone())
                .collect();
            let (keep, give) = quadratic_partition(&rects, self.min_fill);
            let (kept, given) = partition_by_index(drained, &keep, &give);
            let kept_mbr = mbr_of(kept.iter().map(|&c| &self.arena.get(c).mbr));
            let given_mbr = mbr_of(given.iter().map(|&c| &self.arena.get(c).mbr));

            let sibling = self.arena.insert(Node {
                parent,
                mbr: given_mbr,
                kind: NodeKind::Internal(given.clone()),
            });
            for &child in &given {
                self.arena.get_mut(child).parent = Some(sibling);
            }
            let node = self.arena.get_mut(id);
            node.kind = NodeKind::Internal(kept);
            node.mbr = kept_mbr;
            sibling
        };
        debug!("split node {id} -> sibling {sibling}");
        sibling
    }

    /// Walks from `node` to the root, refreshing MBRs and propagating a
    /// split sibling upward; a root split grows the tree by one level.
    fn adjust_path(&mut self, mut node: NodeId, mut split: Option<NodeId>) {
        loop {
            self.recompute_mbr(node);
            match self.arena.get(node).parent {
                None => {
                    if let Some(sibling) = split {
                        let mbr = self.arena.get(node).mbr.union(&self.arena.get(sibling).mbr);
                        let new_root = self.arena.insert(Node {
                            parent: None,
                            mbr,
                            kind: NodeKind::Internal(vec![node, sibling]),
                        });
                        self.arena.get_mut(node).parent = Some(new_root);
                        self.arena.get_mut(sibling).parent = Some(new_root);
                        self.root = Some(new_root);
                        debug!("root split; tree grew one level");
                    }
                    return;
                }
                Some(parent) => {
                    if let Some(sibling) = split {
                        self.arena.get_mut(sibling).parent = Some(parent);
                        if let NodeKind::Internal(children) =
                            &mut self.arena.get_mut(parent).kind
                        {
                            children.push(sibling);
                        }
                        split = (self.arena.get(parent).fill() > self.max_fill)
                            .then(|| self.split_node(parent));
                    }
                    node = parent;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Locates the leaf and position of the first entry matching `rect`.
    fn find_entry(&self, root: NodeId, rect: &Rect<f64>) -> Option<(NodeId, usize)> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match &self.arena.get(id).kind {
                NodeKind::Leaf(entries) => {
                    if let Some(pos) = entries.iter().position(|e| e.rect.approx_eq(rect)) {
                        return Some((id, pos));
                    }
                }
                NodeKind::Internal(children) => {
                    for &child in children {
                        if self.arena.get(child).mbr.overlaps(rect) {
                            stack.push(child);
                        }
                    }
                }
            }
        }
        None
    }

    /// Condense-tree: evicts underfull nodes along the path to the root,
    /// collecting their leaf entries and orphaned child subtrees, then
    /// reinserts the entries and re-grafts the subtrees at the level
    /// matching their height.
    fn condense(&mut self, leaf: NodeId) {
        let mut orphan_entries: Vec<Entry<T>> = Vec::new();
        let mut orphan_subtrees: Vec<(NodeId, usize)> = Vec::new();

        let mut current = leaf;
        while let Some(parent) = self.arena.get(current).parent {
            if self.arena.get(current).fill() < self.min_fill {
                self.remove_child(parent, current);
                let node = self.arena.remove(current);
                match node.kind {
                    NodeKind::Leaf(entries) => {
                        debug!("evicting leaf {current} with {} entries", entries.len());
                        orphan_entries.extend(entries);
                    }
                    NodeKind::Internal(children) => {
                        debug!("evicting internal {current} with {} subtrees", children.len());
                        for child in children {
                            let height = self.height_of(child);
                            self.arena.get_mut(child).parent = None;
                            orphan_subtrees.push((child, height));
                        }
                    }
                }
            } else {
                self.recompute_mbr(current);
            }
            current = parent;
        }
        self.recompute_mbr(current);

        if self.arena.get(current).fill() == 0 {
            self.arena.remove(current);
            self.root = None;
        }

        // Tallest first, so the root never needs to grow more than one
        // level per graft and no single-child non-root appears.
        orphan_subtrees.sort_by(|a, b| b.1.cmp(&a.1));
        for (subtree, height) in orphan_subtrees {
            self.regraft(subtree, height);
        }
        for entry in orphan_entries {
            self.insert_entry(entry);
        }

        self.collapse_root();
    }

    /// Reattaches an orphaned subtree of the given height under a node
    /// at `height + 1`, growing the tree when it is too short.
    fn regraft(&mut self, subtree: NodeId, height: usize) {
        let Some(root) = self.root else {
            self.arena.get_mut(subtree).parent = None;
            self.root = Some(subtree);
            return;
        };

        let root_height = self.height_of(root);
        let target = if root_height < height + 1 {
            let mut top = root;
            let mut h = root_height;
            while h < height + 1 {
                let mbr = self.arena.get(top).mbr.clone();
                let new_root = self.arena.insert(Node {
                    parent: None,
                    mbr,
                    kind: NodeKind::Internal(vec![top]),
                });
                self.arena.get_mut(top).parent = Some(new_root);
                top = new_root;
                h += 1;
            }
            self.root = Some(top);
            debug!("grew tree to height {h} for re-grafting");
            top
        } else {
            // Least-enlargement descent pinned to the target level.
            let graft_mbr = self.arena.get(subtree).mbr.clone();
            let mut node = root;
            let mut h = root_height;
            while h > height + 1 {
                let children = match &self.arena.get(node).kind {
                    NodeKind::Internal(children) => children,
                    NodeKind::Leaf(_) => break,
                };
                let mut best = children[0];
                let mut best_growth = f64::INFINITY;
                for &child in children {
                    let growth = self.arena.get(child).mbr.enlargement(&graft_mbr);
                    if growth < best_growth {
                        best_growth = growth;
                        best = child;
                    }
                }
                node = best;
                h -= 1;
            }
            node
        };

        debug!("re-grafting subtree {subtree} (height {height}) under {target}");
        self.arena.get_mut(subtree).parent = Some(target);
        if let NodeKind::Internal(children) = &mut self.arena.get_mut(target).kind {
            children.push(subtree);
        }
        let split = (self.arena.get(target).fill() > self.max_fill)
            .then(|| self.split_node(target));
        self.adjust_path(target, split);
    }

    /// Shrinks the tree: a single-child internal root is replaced by its
    /// child, an empty root clears the tree.
    fn collapse_root(&mut self) {
        while let Some(root) = self.root {
            match &self.arena.get(root).kind {
                NodeKind::Internal(children) if children.len() == 1 => {
                    let child = children[0];
                    self.arena.remove(root);
                    self.arena.get_mut(child).parent = None;
                    self.root = Some(child);
                    debug!("root demoted; tree shrank one level");
                }
                NodeKind::Leaf(entries) if entries.is_empty() => {
                    self.arena.remove(root);
                    self.root = None;
                    return;
                }
                _ => return,
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let NodeKind::Internal(children) = &mut self.arena.get_mut(parent).kind {
            children.retain(|&c| c != child);
        }
    }

    fn recompute_mbr(&mut self, id: NodeId) {
        let mbr = match &self.arena.get(id).kind {
            NodeKind::Leaf(entries) if !entries.is_empty() => {
                mbr_of(entries.iter().map(|e| &e.rect))
            }
            NodeKind::Internal(children) if !children.is_empty() => {
                mbr_of(children.iter().map(|&c| &self.arena.get(c).mbr))
            }
            _ => return,
        };
        self.arena.get_mut(id).mbr = mbr;
    }

    /// Height of a subtree: 0 for a leaf.
    fn height_of(&self, mut node: NodeId) -> usize {
        let mut height = 0;
        loop {
            match &self.arena.get(node).kind {
                NodeKind::Leaf(_) => return height,
                NodeKind::Internal(children) => {
                    node = children[0];
                    height += 1;
                }
            }
        }
    }

    /// Full structural audit of the invariants: equal leaf depth, fill
    /// bounds on non-root nodes, MBR coherence, parent links, and the
    /// entry count. Intended for tests; never required by the public
    /// operations.
    pub fn validate(&self) -> SpatialResult<()> {
        let Some(root) = self.root else {
            if self.len != 0 {
                return Err(SpatialError::InvariantViolation(format!(
                    "empty tree reports {} entries",
                    self.len
                )));
            }
            return Ok(());
        };
        if self.arena.get(root).parent.is_some() {
            return Err(SpatialError::InvariantViolation(
                "root has a parent link".into(),
            ));
        }

        let mut leaf_depth: Option<usize> = None;
        let mut entries = 0usize;
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.arena.get(id);
            if id != root {
                if node.fill() < self.min_fill || node.fill() > self.max_fill {
                    return Err(SpatialError::InvariantViolation(format!(
                        "node {id} fill {} outside [{}, {}]",
                        node.fill(),
                        self.min_fill,
                        self.max_fill
                    )));
                }
            } else if node.fill() == 0 {
                return Err(SpatialError::InvariantViolation("empty root node".into()));
            }
            match &node.kind {
                NodeKind::Leaf(leaf_entries) => {
                    match leaf_depth {
                        None => leaf_depth = Some(depth),
                        Some(d) if d != depth => {
                            return Err(SpatialError::InvariantViolation(format!(
                                "leaf {id} at depth {depth}, expected {d}"
                            )))
                        }
                        _ => {}
                    }
                    entries += leaf_entries.len();
                    let mbr = mbr_of(leaf_entries.iter().map(|e| &e.rect));
                    if !mbr.approx_eq(&node.mbr) {
                        return Err(SpatialError::InvariantViolation(format!(
                            "leaf {id} MBR does not cover its entries"
                        )));
                    }
                }
                NodeKind::Internal(children) => {
                    let mbr = mbr_of(children.iter().map(|&c| &self.arena.get(c).mbr));
                    if !mbr.approx_eq(&node.mbr) {
                        return Err(SpatialError::InvariantViolation(format!(
                            "internal {id} MBR does not cover its children"
                        )));
                    }
                    for &child in children {
                        if self.arena.get(child).parent != Some(id) {
                            return Err(SpatialError::InvariantViolation(format!(
                                "child {child} has a wrong parent link"
                            )));
                        }
                        stack.push((child, depth + 1));
                    }
                }
            }
        }
        if entries != self.len {
            return Err(SpatialError::InvariantViolation(format!(
                "tree holds {entries} entries but reports {}",
                self.len
            )));
        }
        Ok(())
    }
}

/// Union of a nonempty rectangle iterator.
fn mbr_of<'a, I: Iterator<Item = &'a Rect<f64>>>(mut rects: I) -> Rect<f64> {
    let mut mbr = rects.next().expect("MBR of an empty collection").clone();
    for rect in rects {
        mbr.expand(rect);
    }
    mbr
}

/// Splits `items` into the two groups named by the index partition.
fn partition_by_index<T>(items: Vec<T>, keep: &[usize], give: &[usize]) -> (Vec<T>, Vec<T>) {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let kept = keep
        .iter()
        .map(|&i| slots[i].take().expect("index used twice in partition"))
        .collect();
    let given = give
        .iter()
        .map(|&i| slots[i].take().expect("index used twice in partition"))
        .collect();
    (kept, given)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(lo: [f64; 2], hi: [f64; 2]) -> Rect<f64> {
        Rect::new(lo.to_vec(), hi.to_vec()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_fill_bounds() {
        assert!(GuttmanRTree::<i32>::new(3, 4).is_err());
        assert!(GuttmanRTree::<i32>::new(2, 4).is_ok());
    }

    #[test]
    fn test_insert_and_point_search() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        tree.insert(rect([0.0, 0.0], [1.0, 1.0]), 42).unwrap();
        let hits = tree.search(&rect([0.5, 0.5], [0.5, 0.5]));
        assert_eq!(hits, vec![&42]);
    }

    #[test]
    fn test_dimension_mismatch_on_second_insert() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        tree.insert(rect([0.0, 0.0], [1.0, 1.0]), 1).unwrap();
        let err = tree
            .insert(
                Rect::new(vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]).unwrap(),
                2,
            )
            .unwrap_err();
        assert!(matches!(err, SpatialError::DimensionMismatch { .. }));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_split_keeps_all_entries() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        for i in 0..10 {
            let f = i as f64;
            tree.insert(rect([f, f], [f + 0.5, f + 0.5]), i).unwrap();
        }
        let hits = tree.search(&rect([-1.0, -1.0], [20.0, 20.0]));
        assert_eq!(hits.len(), 10);
        tree.validate().unwrap();
    }

    #[test]
    fn test_remove_missing_is_silent() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        tree.insert(rect([0.0, 0.0], [1.0, 1.0]), 1).unwrap();
        tree.remove(&rect([10.0, 10.0], [11.0, 11.0]));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_remove_first_of_duplicates() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        let r = rect([5.0, 5.0], [10.0, 10.0]);
        for i in 0..5 {
            tree.insert(r.clone(), i).unwrap();
        }
        tree.remove(&r);
        tree.remove(&r);
        assert_eq!(tree.search(&r).len(), 3);
        tree.validate().unwrap();
    }

    #[test]
    fn test_insert_remove_restores_empty() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        let r = rect([0.0, 0.0], [1.0, 1.0]);
        tree.insert(r.clone(), 7).unwrap();
        tree.remove(&r);
        assert!(tree.is_empty());
        assert!(tree.search(&rect([-10.0, -10.0], [10.0, 10.0])).is_empty());
        tree.validate().unwrap();
    }

    #[test]
    fn test_zero_area_rectangle() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        tree.insert(rect([5.0, 5.0], [5.0, 5.0]), 1).unwrap();
        assert_eq!(tree.search(&rect([5.0, 5.0], [5.0, 5.0])).len(), 1);
    }

    #[test]
    fn test_five_dimensional_entries() {
        let mut tree = GuttmanRTree::new(2, 4).unwrap();
        for i in 0..6 {
            let f = i as f64;
            let r = Rect::new(vec![f; 5], vec![f + 1.0; 5]).unwrap();
            tree.insert(r, i).unwrap();
        }
        let all = Rect::new(vec![-1.0; 5], vec![10.0; 5]).unwrap();
        assert_eq!(tree.search(&all).len(), 6);
        tree.validate().unwrap();
    }
}
