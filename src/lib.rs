//! # spatial-rtree — in-memory multidimensional spatial indexing
//!
//! This crate stores axis-aligned hyper-rectangles with attached
//! payloads and answers window queries (every payload whose rectangle
//! intersects a query rectangle), supporting arbitrary interleavings of
//! insertion and deletion. Two coexisting balancing strategies are
//! provided over the same structural model:
//!
//! - **[`GuttmanRTree`]** — the classical R-tree: least-enlargement
//!   descent, quadratic split on overflow, condense-tree deletion with
//!   subtree re-grafting. `f64` coordinates, tolerant equality.
//! - **[`HilbertRTree`]** — the Hilbert R-tree: entries totally ordered
//!   by the Hilbert value of their centroid, deferred splitting across
//!   cooperating siblings, symmetric merge/borrow underflow handling.
//!   `i64` lattice coordinates, exact equality.
//!
//! The [`HilbertCurve`] itself is public: a d-dimensional point ⇄ index
//! bijection plus a bounded range-cover query.
//!
//! ## Quick start
//!
//! ```
//! use spatial_rtree::{GuttmanRTree, Rect};
//!
//! # fn main() -> spatial_rtree::SpatialResult<()> {
//! let mut tree = GuttmanRTree::new(2, 4)?;
//! tree.insert(Rect::new(vec![0.0, 0.0], vec![5.0, 5.0])?, "a")?;
//! tree.insert(Rect::new(vec![3.0, 3.0], vec![8.0, 8.0])?, "b")?;
//!
//! let window = Rect::new(vec![4.0, 4.0], vec![5.0, 5.0])?;
//! assert_eq!(tree.search(&window).len(), 2);
//!
//! tree.remove(&Rect::new(vec![0.0, 0.0], vec![5.0, 5.0])?);
//! assert_eq!(tree.search(&window).len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! The core is single-threaded and synchronous: every operation
//! completes before returning, nodes are owned by the tree, and payload
//! lifetimes are the caller's responsibility. Callers needing shared
//! access must serialize it externally.

#![forbid(unsafe_code)]

mod arena;

pub mod errors;
pub mod guttman_rtree;
pub mod hilbert;
pub mod hilbert_rtree;
pub mod rect;

pub use errors::{SpatialError, SpatialResult};
pub use guttman_rtree::GuttmanRTree;
pub use hilbert::{HilbertCurve, IndexRange};
pub use hilbert_rtree::HilbertRTree;
pub use rect::{Coord, Rect};
