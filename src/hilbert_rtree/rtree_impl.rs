//! HilbertRTree implementation.

use log::debug;

use super::rtree_types::{HilbertEntry, HilbertNode, HilbertNodeKind};
use crate::arena::{Arena, NodeId};
use crate::errors::{SpatialError, SpatialResult};
use crate::hilbert::HilbertCurve;
use crate::rect::Rect;

/// How many chain neighbors cooperate in a deferred split (the paper's
/// `s`, a 2-to-3 split policy).
const COOPERATING_SIBLINGS: usize = 2;

/// Hilbert R-tree over `i64` lattice coordinates.
///
/// Entries are ordered by the Hilbert index of their rectangle centroid
/// under the tree's curve; nodes of each level form a doubly-linked
/// sibling chain in that order. Rectangles must lie inside
/// `[0, 2^bits - 1]` in every dimension.
///
/// # Example
///
/// ```
/// use spatial_rtree::{HilbertRTree, Rect};
///
/// # fn main() -> spatial_rtree::SpatialResult<()> {
/// let mut tree = HilbertRTree::new(2, 4, 2, 16)?;
/// tree.insert(Rect::new(vec![0, 0], vec![10, 10])?, "a")?;
/// let hits = tree.search(&Rect::new(vec![5, 5], vec![5, 5])?);
/// assert_eq!(hits, vec![&"a"]);
/// # Ok(())
/// # }
/// ```
pub struct HilbertRTree<T> {
    arena: Arena<HilbertNode<T>>,
    root: Option<NodeId>,
    min_fill: usize,
    max_fill: usize,
    curve: HilbertCurve,
    len: usize,
}

impl<T> HilbertRTree<T> {
    /// Creates an empty tree with fill bounds `m` and `M` over a
    /// `dim`-dimensional curve of `bits` bits per dimension.
    ///
    /// Fails with `InvalidParameter` when `m > M / 2` or when the curve
    /// parameters are invalid.
    pub fn new(min_fill: usize, max_fill: usize, dim: u32, bits: u32) -> SpatialResult<Self> {
        if min_fill > max_fill / 2 {
            return Err(SpatialError::InvalidParameter(format!(
                "minimum fill {min_fill} must be at most half of maximum fill {max_fill}"
            )));
        }
        let curve = HilbertCurve::new(bits, dim)?;
        Ok(HilbertRTree {
            arena: Arena::new(),
            root: None,
            min_fill,
            max_fill,
            curve,
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

    /// Dimensionality, fixed by the curve at construction.
    pub fn dim(&self) -> usize {
        self.curve.dim() as usize
    }

    /// The curve keying this tree.
    pub fn curve(&self) -> &HilbertCurve {
        &self.curve
    }

    /// Adds an entry keyed by the Hilbert index of its centroid.
    ///
    /// Fails with `DimensionMismatch` for the wrong arity and with
    /// `OutOfRange` when the rectangle leaves the curve lattice.
    pub fn insert(&mut self, rect: Rect<i64>, payload: T) -> SpatialResult<()> {
        if rect.dim() != self.dim() {
            return Err(SpatialError::DimensionMismatch {
                expected: self.dim(),
                actual: rect.dim(),
            });
        }
        let max = self.curve.max_ordinate();
        for i in 0..rect.dim() {
            if rect.lo()[i] < 0 {
                return Err(SpatialError::OutOfRange {
                    value: rect.lo()[i],
                    max,
                });
            }
            if rect.hi()[i] > max {
                return Err(SpatialError::OutOfRange {
                    value: rect.hi()[i],
                    max,
                });
            }
        }
        let key = self.curve.index(&rect.center())?;
        let entry = HilbertEntry { rect, key, payload };

        let Some(root) = self.root else {
            let node = HilbertNode {
                parent: None,
                prev: None,
                next: None,
                mbr: entry.rect.clone(),
                lhv: entry.key,
                kind: HilbertNodeKind::Leaf(vec![entry]),
            };
            self.root = Some(self.arena.insert(node));
            self.len += 1;
            return Ok(());
        };

        let leaf = self.choose_leaf(root, key);
        let (new_node, affected) = if self.arena.get(leaf).fill() < self.max_fill {
            self.insert_leaf_entry(leaf, entry);
            (None, vec![leaf])
        } else {
            self.leaf_overflow(leaf, entry)
        };
        self.propagate_insert(leaf, new_node, affected);
        self.len += 1;
        Ok(())
    }

    /// Removes the first entry whose rectangle equals `rect` exactly.
    /// No-op when no such entry exists.
    pub fn remove(&mut self, rect: &Rect<i64>) {
        if rect.dim() != self.dim() {
            return;
        }
        let Some(root) = self.root else { return };
        let Some(leaf) = self.find_exact(root, rect) else {
            return;
        };
        let removed_entry = match &mut self.arena.get_mut(leaf).kind {
            HilbertNodeKind::Leaf(entries) => {
                match entries.iter().position(|e| e.rect.approx_eq(rect)) {
                    Some(pos) => {
                        entries.remove(pos);
                        true
                    }
                    None => false,
                }
            }
            HilbertNodeKind::Internal(_) => false,
        };
        if !removed_entry {
            return;
        }
        self.len -= 1;
        self.refresh(leaf);

        let underflowing = self.arena.get(leaf).fill() < self.min_fill
            && self.arena.get(leaf).parent.is_some();
        let (dropped, affected) = if underflowing {
            self.handle_underflow(leaf)
        } else {
            (None, vec![leaf])
        };
        self.condense(leaf, dropped, affected);
    }

    /// Returns the payloads of all entries overlapping `window`, in
    /// unspecified order.
    pub fn search(&self, window: &Rect<i64>) -> Vec<&T> {
        let mut out = Vec::new();
        let Some(root) = self.root else { return out };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match &self.arena.get(id).kind {
                HilbertNodeKind::Leaf(entries) => {
                    for entry in entries {
                        if entry.rect.overlaps(window) {
                            out.push(&entry.payload);
                        }
                    }
                }
                HilbertNodeKind::Internal(children) => {
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

    /// Descends into the first child whose `lhv` reaches the key; when
    /// every child is below it, into the last child.
    fn choose_leaf(&self, mut node: NodeId, key: u128) -> NodeId {
        loop {
            let children = match &self.arena.get(node).kind {
                HilbertNodeKind::Leaf(_) => return node,
                HilbertNodeKind::Internal(children) => children,
            };
            let chosen = children
                .iter()
                .copied()
                .find(|&c| self.arena.get(c).lhv >= key)
                .unwrap_or_else(|| children[children.len() - 1]);
            node = chosen;
        }
    }

    /// Inserts an entry into a non-full leaf at its key position.
    fn insert_leaf_entry(&mut self, leaf: NodeId, entry: HilbertEntry<T>) {
        if let HilbertNodeKind::Leaf(entries) = &mut self.arena.get_mut(leaf).kind {
            let pos = entries.partition_point(|e| e.key <= entry.key);
            entries.insert(pos, entry);
        }
        self.refresh(leaf);
    }

    /// Deferred split at a full leaf: pools the target with its next
    /// chain neighbor and redistributes; only when every cooperating
    /// sibling is full is a new node spliced into the chain.
    ///
    /// Returns the created node (if any) and the set of nodes whose
    /// contents changed.
    fn leaf_overflow(
        &mut self,
        target: NodeId,
        entry: HilbertEntry<T>,
    ) -> (Option<NodeId>, Vec<NodeId>) {
        let siblings = self.forward_siblings(target, COOPERATING_SIBLINGS);
        let mut pool: Vec<HilbertEntry<T>> = Vec::new();
        for &s in &siblings {
            if let HilbertNodeKind::Leaf(entries) = &mut self.arena.get_mut(s).kind {
                pool.append(entries);
            }
        }
        let pos = pool.partition_point(|e| e.key <= entry.key);
        pool.insert(pos, entry);

        let mut receivers = siblings;
        let mut created = None;
        if pool.len() > receivers.len() * self.max_fill {
            let id = self.alloc_empty_like(target);
            self.splice_before(id, target);
            receivers.insert(0, id);
            created = Some(id);
            debug!("leaf overflow at {target}: created sibling {id}");
        } else {
            debug!("leaf overflow at {target}: deferred split across {receivers:?}");
        }
        self.redistribute_leaf(pool, &receivers);
        (created, receivers)
    }

    /// Same deferral policy one level up: makes room for `new_child` in
    /// `target`'s level-(n+1) parent run. `anchor_child` is the chain
    /// successor of `new_child`, fixing its position in the pool.
    fn internal_overflow(
        &mut self,
        target: NodeId,
        new_child: NodeId,
        anchor_child: NodeId,
    ) -> (Option<NodeId>, Vec<NodeId>) {
        let siblings = self.forward_siblings(target, COOPERATING_SIBLINGS);
        let mut pool: Vec<NodeId> = Vec::new();
        for &s in &siblings {
            if let HilbertNodeKind::Internal(children) = &mut self.arena.get_mut(s).kind {
                pool.append(children);
            }
        }
        let pos = pool
            .iter()
            .position(|&c| c == anchor_child)
            .expect("anchor child must belong to the pooled run");
        pool.insert(pos, new_child);

        let mut receivers = siblings;
        let mut created = None;
        if pool.len() > receivers.len() * self.max_fill {
            let id = self.alloc_empty_like(target);
            self.splice_before(id, target);
            receivers.insert(0, id);
            created = Some(id);
            debug!("internal overflow at {target}: created sibling {id}");
        }
        self.redistribute_children(&pool, &receivers);
        (created, receivers)
    }

    /// Walks from the anchor to the root: refreshes MBR and `lhv` on
    /// every ancestor of every touched node, inserts freshly created
    /// siblings into their parents (recursing the deferred split), and
    /// grows a new root when the old one was split.
    fn propagate_insert(
        &mut self,
        mut anchor: NodeId,
        mut new_node: Option<NodeId>,
        mut affected: Vec<NodeId>,
    ) {
        loop {
            let Some(parent) = self.arena.get(anchor).parent else {
                if let Some(sibling) = new_node {
                    let (mbr, lhv) = {
                        let a = self.arena.get(sibling);
                        let b = self.arena.get(anchor);
                        (a.mbr.union(&b.mbr), a.lhv.max(b.lhv))
                    };
                    let root = self.arena.insert(HilbertNode {
                        parent: None,
                        prev: None,
                        next: None,
                        mbr,
                        lhv,
                        kind: HilbertNodeKind::Internal(vec![sibling, anchor]),
                    });
                    self.arena.get_mut(sibling).parent = Some(root);
                    self.arena.get_mut(anchor).parent = Some(root);
                    self.root = Some(root);
                    debug!("hilbert root split; tree grew one level");
                } else {
                    self.refresh(anchor);
                }
                return;
            };

            let mut parents: Vec<NodeId> = Vec::new();
            for &a in &affected {
                if let Some(ap) = self.arena.get(a).parent {
                    if !parents.contains(&ap) {
                        parents.push(ap);
                    }
                }
            }
            for &ap in &parents {
                self.refresh(ap);
            }

            if let Some(sibling) = new_node.take() {
                if self.arena.get(parent).fill() < self.max_fill {
                    self.insert_child_before(parent, sibling, anchor);
                    self.refresh(parent);
                    // Cross-parent receivers propagate through their own
                    // parents, not only through the anchor's.
                    if !parents.contains(&parent) {
                        parents.push(parent);
                    }
                    affected = parents;
                } else {
                    let (created, touched) = self.internal_overflow(parent, sibling, anchor);
                    new_node = created;
                    affected = touched;
                }
            } else {
                affected = parents;
            }
            anchor = parent;
        }
    }

    /// Places `child` into `parent`'s entry list directly before
    /// `anchor`, matching its chain position (binary search would be
    /// ambiguous when `lhv` values tie).
    fn insert_child_before(&mut self, parent: NodeId, child: NodeId, anchor: NodeId) {
        if let HilbertNodeKind::Internal(children) = &mut self.arena.get_mut(parent).kind {
            let pos = children
                .iter()
                .position(|&c| c == anchor)
                .expect("anchor must be a child of its parent");
            children.insert(pos, child);
        }
        self.arena.get_mut(child).parent = Some(parent);
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Exact-match descent: only children whose MBR contains the
    /// rectangle can host it.
    fn find_exact(&self, node: NodeId, rect: &Rect<i64>) -> Option<NodeId> {
        match &self.arena.get(node).kind {
            HilbertNodeKind::Leaf(entries) => entries
                .iter()
                .any(|e| e.rect.approx_eq(rect))
                .then_some(node),
            HilbertNodeKind::Internal(children) => {
                for &child in children {
                    if self.arena.get(child).mbr.contains(rect) {
                        if let Some(found) = self.find_exact(child, rect) {
                            return Some(found);
                        }
                    }
                }
                None
            }
        }
    }

    /// Symmetric counterpart of the deferred split: pools the target
    /// with up to `s` chain neighbors and either redistributes (borrow)
    /// or drops the chain-first node and redistributes across the rest
    /// (merge). The dropped node is unlinked from the chain here; its
    /// detachment from the parent happens in [`condense`](Self::condense).
    fn handle_underflow(&mut self, target: NodeId) -> (Option<NodeId>, Vec<NodeId>) {
        let siblings = self.sibling_run(target, COOPERATING_SIBLINGS + 1);
        let total: usize = siblings.iter().map(|&s| self.arena.get(s).fill()).sum();

        let mut receivers = siblings.clone();
        let mut dropped = None;
        if total < receivers.len() * self.min_fill && receivers.len() > 1 {
            dropped = Some(receivers.remove(0));
        }

        if self.arena.get(target).is_leaf() {
            let mut pool: Vec<HilbertEntry<T>> = Vec::new();
            for &s in &siblings {
                if let HilbertNodeKind::Leaf(entries) = &mut self.arena.get_mut(s).kind {
                    pool.append(entries);
                }
            }
            if let Some(d) = dropped {
                self.unlink(d);
                debug!("leaf underflow at {target}: merging away {d}");
            }
            self.redistribute_leaf(pool, &receivers);
        } else {
            let mut pool: Vec<NodeId> = Vec::new();
            for &s in &siblings {
                if let HilbertNodeKind::Internal(children) = &mut self.arena.get_mut(s).kind {
                    pool.append(children);
                }
            }
            if let Some(d) = dropped {
                self.unlink(d);
                debug!("internal underflow at {target}: merging away {d}");
            }
            self.redistribute_children(&pool, &receivers);
        }
        (dropped, receivers)
    }

    /// Walks from the anchor to the root after a removal: detaches
    /// merged-away nodes from their parents (cascading the underflow one
    /// level up when that detachment starves the parent) and refreshes
    /// MBR and `lhv` on every ancestor of every touched node.
    fn condense(&mut self, mut node: NodeId, mut dropped: Option<NodeId>, mut affected: Vec<NodeId>) {
        loop {
            let Some(parent) = self.arena.get(node).parent else {
                break;
            };
            let mut next_affected: Vec<NodeId> = Vec::new();

            if let Some(d) = dropped.take() {
                let dp = self
                    .arena
                    .get(d)
                    .parent
                    .expect("merged-away node must have a parent");
                self.remove_child(dp, d);
                self.arena.remove(d);
                if self.arena.get(dp).fill() < self.min_fill
                    && self.arena.get(dp).parent.is_some()
                {
                    let (next_dropped, touched) = self.handle_underflow(dp);
                    dropped = next_dropped;
                    next_affected = touched;
                } else {
                    self.refresh(dp);
                    next_affected.push(dp);
                }
            }

            for &a in &affected {
                if let Some(ap) = self.arena.get(a).parent {
                    self.refresh(ap);
                    if !next_affected.contains(&ap) {
                        next_affected.push(ap);
                    }
                }
            }
            if !next_affected.contains(&parent) {
                next_affected.push(parent);
            }

            affected = next_affected;
            node = parent;
        }

        self.refresh(node);
        self.collapse_root();
    }

    /// Shrinks the tree: a single-child internal root is replaced by its
    /// child, an empty root clears the tree.
    fn collapse_root(&mut self) {
        loop {
            let Some(root) = self.root else { return };
            if self.arena.get(root).fill() == 0 {
                self.arena.remove(root);
                self.root = None;
                return;
            }
            let child = match &self.arena.get(root).kind {
                HilbertNodeKind::Internal(children) if children.len() == 1 => children[0],
                _ => return,
            };
            self.arena.remove(root);
            let node = self.arena.get_mut(child);
            node.parent = None;
            node.prev = None;
            node.next = None;
            self.root = Some(child);
            debug!("hilbert root demoted; tree shrank one level");
        }
    }

    // ------------------------------------------------------------------
    // Redistribution and the sibling chain
    // ------------------------------------------------------------------

    /// Partitions a key-sorted entry pool into contiguous runs whose
    /// sizes differ by at most one, one run per receiver in chain order.
    fn redistribute_leaf(&mut self, pool: Vec<HilbertEntry<T>>, receivers: &[NodeId]) {
        let base = pool.len() / receivers.len();
        let extra = pool.len() % receivers.len();
        let mut items = pool.into_iter();
        for (i, &r) in receivers.iter().enumerate() {
            let take = base + usize::from(i < extra);
            let run: Vec<HilbertEntry<T>> = items.by_ref().take(take).collect();
            if let HilbertNodeKind::Leaf(entries) = &mut self.arena.get_mut(r).kind {
                *entries = run;
            }
            self.refresh(r);
        }
    }

    /// As [`redistribute_leaf`](Self::redistribute_leaf) for internal
    /// receivers: reassigns every child's parent pointer and rebuilds
    /// the child-level sibling chain from the new parent-entry order.
    fn redistribute_children(&mut self, pool: &[NodeId], receivers: &[NodeId]) {
        let base = pool.len() / receivers.len();
        let extra = pool.len() % receivers.len();
        let mut offset = 0;
        for (i, &r) in receivers.iter().enumerate() {
            let take = base + usize::from(i < extra);
            let run = pool[offset..offset + take].to_vec();
            offset += take;
            for &child in &run {
                self.arena.get_mut(child).parent = Some(r);
            }
            if let HilbertNodeKind::Internal(children) = &mut self.arena.get_mut(r).kind {
                *children = run;
            }
            self.refresh(r);
        }
        self.rebuild_child_links(receivers);
    }

    /// Rebuilds the child-level chain across a run of chain-consecutive
    /// internal parents from their entry order, never by patching
    /// individual neighbor pointers: the concatenated child lists are
    /// relinked wholesale and joined to the chain outside the run.
    fn rebuild_child_links(&mut self, parents: &[NodeId]) {
        let mut run: Vec<NodeId> = Vec::new();
        for &p in parents {
            if let HilbertNodeKind::Internal(children) = &self.arena.get(p).kind {
                run.extend(children.iter().copied());
            }
        }
        let Some(&last) = run.last() else { return };

        let left = self
            .arena
            .get(parents[0])
            .prev
            .and_then(|n| self.last_child(n));
        let right = self
            .arena
            .get(parents[parents.len() - 1])
            .next
            .and_then(|n| self.first_child(n));

        let mut prev = left;
        for &child in &run {
            self.arena.get_mut(child).prev = prev;
            if let Some(p) = prev {
                self.arena.get_mut(p).next = Some(child);
            }
            prev = Some(child);
        }
        self.arena.get_mut(last).next = right;
        if let Some(r) = right {
            self.arena.get_mut(r).prev = Some(last);
        }
    }

    /// The target plus up to `count - 1` chain successors, in chain
    /// order. The walk is bounded and stops on a self-reference.
    fn forward_siblings(&self, target: NodeId, count: usize) -> Vec<NodeId> {
        let mut out = vec![target];
        let mut cursor = self.arena.get(target).next;
        while out.len() < count {
            match cursor {
                Some(n) if n != target => {
                    out.push(n);
                    cursor = self.arena.get(n).next;
                }
                _ => break,
            }
        }
        out
    }

    /// Cooperating run for underflow handling: chain successors first,
    /// extended backward over `prev` when the chain ends early, so a
    /// node at the right edge of its level still finds partners.
    fn sibling_run(&self, target: NodeId, count: usize) -> Vec<NodeId> {
        let mut out = self.forward_siblings(target, count);
        let mut cursor = self.arena.get(target).prev;
        while out.len() < count {
            match cursor {
                Some(n) if n != target && !out.contains(&n) => {
                    out.insert(0, n);
                    cursor = self.arena.get(n).prev;
                }
                _ => break,
            }
        }
        out
    }

    /// Splices a fresh node into the chain directly before `target`.
    fn splice_before(&mut self, node: NodeId, target: NodeId) {
        let prev = self.arena.get(target).prev;
        {
            let n = self.arena.get_mut(node);
            n.prev = prev;
            n.next = Some(target);
        }
        self.arena.get_mut(target).prev = Some(node);
        if let Some(p) = prev {
            self.arena.get_mut(p).next = Some(node);
        }
    }

    /// Removes a node from the chain.
    fn unlink(&mut self, node: NodeId) {
        let (prev, next) = {
            let n = self.arena.get_mut(node);
            let links = (n.prev, n.next);
            n.prev = None;
            n.next = None;
            links
        };
        if let Some(p) = prev {
            self.arena.get_mut(p).next = next;
        }
        if let Some(n) = next {
            self.arena.get_mut(n).prev = prev;
        }
    }

    /// Fresh empty node of the same kind as `template`, not yet chained
    /// or parented.
    fn alloc_empty_like(&mut self, template: NodeId) -> NodeId {
        let (mbr, is_leaf) = {
            let node = self.arena.get(template);
            (node.mbr.clone(), node.is_leaf())
        };
        let kind = if is_leaf {
            HilbertNodeKind::Leaf(Vec::new())
        } else {
            HilbertNodeKind::Internal(Vec::new())
        };
        self.arena.insert(HilbertNode {
            parent: None,
            prev: None,
            next: None,
            mbr,
            lhv: 0,
            kind,
        })
    }

    fn first_child(&self, id: NodeId) -> Option<NodeId> {
        match &self.arena.get(id).kind {
            HilbertNodeKind::Internal(children) => children.first().copied(),
            HilbertNodeKind::Leaf(_) => None,
        }
    }

    fn last_child(&self, id: NodeId) -> Option<NodeId> {
        match &self.arena.get(id).kind {
            HilbertNodeKind::Internal(children) => children.last().copied(),
            HilbertNodeKind::Leaf(_) => None,
        }
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let HilbertNodeKind::Internal(children) = &mut self.arena.get_mut(parent).kind {
            children.retain(|&c| c != child);
        }
    }

    /// Recomputes a node's MBR and `lhv` from its direct contents.
    fn refresh(&mut self, id: NodeId) {
        let computed = match &self.arena.get(id).kind {
            HilbertNodeKind::Leaf(entries) => entries.split_first().map(|(first, rest)| {
                let mut mbr = first.rect.clone();
                let mut lhv = first.key;
                for e in rest {
                    mbr.expand(&e.rect);
                    lhv = lhv.max(e.key);
                }
                (mbr, lhv)
            }),
            HilbertNodeKind::Internal(children) => children.split_first().map(|(&first, rest)| {
                let head = self.arena.get(first);
                let mut mbr = head.mbr.clone();
                let mut lhv = head.lhv;
                for &c in rest {
                    let child = self.arena.get(c);
                    mbr.expand(&child.mbr);
                    lhv = lhv.max(child.lhv);
                }
                (mbr, lhv)
            }),
        };
        if let Some((mbr, lhv)) = computed {
            let node = self.arena.get_mut(id);
            node.mbr = mbr;
            node.lhv = lhv;
        }
    }

    // ------------------------------------------------------------------
    // Structural audit
    // ------------------------------------------------------------------

    /// Full structural audit: equal leaf depth, fill bounds, MBR and
    /// `lhv` coherence, in-node key order, parent links, the entry
    /// count, and — per level — that the sibling chain derived from
    /// parent-entry order matches the stored links exactly, with no
    /// cycles, omissions, or stray cross-parent links. Intended for
    /// tests; never required by the public operations.
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

        let mut entries = 0usize;
        let mut level: Vec<NodeId> = vec![root];
        while !level.is_empty() {
            let mut next_level: Vec<NodeId> = Vec::new();
            let mut leaves = 0usize;
            for &id in &level {
                let node = self.arena.get(id);
                if id != root && (node.fill() < self.min_fill || node.fill() > self.max_fill) {
                    return Err(SpatialError::InvariantViolation(format!(
                        "node {id} fill {} outside [{}, {}]",
                        node.fill(),
                        self.min_fill,
                        self.max_fill
                    )));
                }
                match &node.kind {
                    HilbertNodeKind::Leaf(leaf_entries) => {
                        leaves += 1;
                        entries += leaf_entries.len();
                        let mut mbr: Option<Rect<i64>> = None;
                        let mut lhv = 0u128;
                        for pair in leaf_entries.windows(2) {
                            if pair[0].key > pair[1].key {
                                return Err(SpatialError::InvariantViolation(format!(
                                    "leaf {id} entries out of key order"
                                )));
                            }
                        }
                        for e in leaf_entries {
                            let expect = self.curve.index(&e.rect.center()).map_err(|_| {
                                SpatialError::InvariantViolation(format!(
                                    "leaf {id} holds a rectangle off the lattice"
                                ))
                            })?;
                            if expect != e.key {
                                return Err(SpatialError::InvariantViolation(format!(
                                    "leaf {id} entry key drifted from its centroid"
                                )));
                            }
                            lhv = lhv.max(e.key);
                            match &mut mbr {
                                Some(m) => m.expand(&e.rect),
                                None => mbr = Some(e.rect.clone()),
                            }
                        }
                        if let Some(m) = mbr {
                            if !m.approx_eq(&node.mbr) || lhv != node.lhv {
                                return Err(SpatialError::InvariantViolation(format!(
                                    "leaf {id} MBR or lhv out of date"
                                )));
                            }
                        }
                    }
                    HilbertNodeKind::Internal(children) => {
                        if children.is_empty() {
                            return Err(SpatialError::InvariantViolation(format!(
                                "internal {id} has no children"
                            )));
                        }
                        let mut mbr: Option<Rect<i64>> = None;
                        let mut lhv = 0u128;
                        let mut last_lhv: Option<u128> = None;
                        for &c in children {
                            let child = self.arena.get(c);
                            if child.parent != Some(id) {
                                return Err(SpatialError::InvariantViolation(format!(
                                    "child {c} has a wrong parent link"
                                )));
                            }
                            if let Some(prev) = last_lhv {
                                if prev > child.lhv {
                                    return Err(SpatialError::InvariantViolation(format!(
                                        "internal {id} children out of lhv order"
                                    )));
                                }
                            }
                            last_lhv = Some(child.lhv);
                            lhv = lhv.max(child.lhv);
                            match &mut mbr {
                                Some(m) => m.expand(&child.mbr),
                                None => mbr = Some(child.mbr.clone()),
                            }
                        }
                        if let Some(m) = mbr {
                            if !m.approx_eq(&node.mbr) || lhv != node.lhv {
                                return Err(SpatialError::InvariantViolation(format!(
                                    "internal {id} MBR or lhv out of date"
                                )));
                            }
                        }
                        next_level.extend(children.iter().copied());
                    }
                }
            }
            if leaves != 0 && leaves != level.len() {
                return Err(SpatialError::InvariantViolation(
                    "leaves at mixed depths".into(),
                ));
            }

            self.validate_chain(&level)?;
            level = next_level;
        }

        if entries != self.len {
            return Err(SpatialError::InvariantViolation(format!(
                "tree holds {entries} entries but reports {}",
                self.len
            )));
        }
        Ok(())
    }

    /// Checks that the stored sibling chain reproduces the level exactly
    /// as derived from the tree, in order, with symmetric links.
    fn validate_chain(&self, level: &[NodeId]) -> SpatialResult<()> {
        if self.arena.get(level[0]).prev.is_some() {
            return Err(SpatialError::InvariantViolation(
                "level chain does not start at the leftmost node".into(),
            ));
        }
        let mut cursor = Some(level[0]);
        for (i, &expected) in level.iter().enumerate() {
            match cursor {
                Some(n) if n == expected => {
                    let back = self.arena.get(n).prev;
                    let expected_back = if i == 0 { None } else { Some(level[i - 1]) };
                    if back != expected_back {
                        return Err(SpatialError::InvariantViolation(format!(
                            "asymmetric sibling links at node {n}"
                        )));
                    }
                    cursor = self.arena.get(n).next;
                }
                _ => {
                    return Err(SpatialError::InvariantViolation(
                        "sibling chain diverges from the tree order".into(),
                    ))
                }
            }
        }
        if cursor.is_some() {
            return Err(SpatialError::InvariantViolation(
                "sibling chain runs past its level (possible cycle or cross-parent link)".into(),
            ));
        }
        Ok(())
    }
}
