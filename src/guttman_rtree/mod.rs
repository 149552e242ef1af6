//! Classical Guttman R-tree.
//!
//! Insertion descends by least area enlargement and resolves overflow
//! with the quadratic split; deletion condenses the tree, reinserting
//! orphaned leaf entries through the normal insert path and re-grafting
//! orphaned subtrees at the level matching their height, so all leaves
//! stay equidistant from the root under any insert/delete mix.

mod rtree_impl;
mod rtree_types;
mod split;

pub use rtree_impl::GuttmanRTree;
