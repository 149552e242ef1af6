//! Guttman R-tree integration tests: window-query correctness under
//! insert/delete churn, split and condense behavior, and structural
//! invariants.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use spatial_rtree::{GuttmanRTree, Rect};
use std::collections::BTreeSet;

fn rect(lo: [f64; 2], hi: [f64; 2]) -> Rect<f64> {
    Rect::new(lo.to_vec(), hi.to_vec()).unwrap()
}

fn ids(hits: Vec<&u64>) -> BTreeSet<u64> {
    hits.into_iter().copied().collect()
}

#[test]
fn point_query_hits_single_entry() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    tree.insert(rect([0.0, 0.0], [1.0, 1.0]), 0u64).unwrap();
    let hits = tree.search(&rect([0.5, 0.5], [0.5, 0.5]));
    assert_eq!(ids(hits), BTreeSet::from([0]));
}

#[test]
fn overlapping_center_finds_all_three() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    tree.insert(rect([0.0, 0.0], [5.0, 5.0]), 0u64).unwrap();
    tree.insert(rect([3.0, 3.0], [8.0, 8.0]), 1).unwrap();
    tree.insert(rect([4.0, 4.0], [6.0, 6.0]), 2).unwrap();

    let hits = tree.search(&rect([4.0, 4.0], [5.0, 5.0]));
    assert_eq!(ids(hits), BTreeSet::from([0, 1, 2]));
}

#[test]
fn split_preserves_every_entry() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    for i in 0..10u64 {
        let f = i as f64;
        tree.insert(rect([f, f], [f + 0.5, f + 0.5]), i).unwrap();
    }
    let hits = tree.search(&rect([-1.0, -1.0], [20.0, 20.0]));
    assert_eq!(hits.len(), 10);
    tree.validate().unwrap();
}

#[test]
fn remove_middle_entry() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    let mut rects = Vec::new();
    for i in 0..5u64 {
        let f = i as f64;
        let r = rect([f, f], [f + 1.0, f + 1.0]);
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }
    tree.remove(&rects[2]);

    let hits = ids(tree.search(&rect([0.0, 0.0], [10.0, 10.0])));
    assert_eq!(hits, BTreeSet::from([0, 1, 3, 4]));
    tree.validate().unwrap();
}

#[test]
fn search_empty_tree_is_empty() {
    let tree: GuttmanRTree<u64> = GuttmanRTree::new(2, 4).unwrap();
    assert!(tree.search(&rect([0.0, 0.0], [10.0, 10.0])).is_empty());
}

#[test]
fn remove_from_empty_tree_is_silent() {
    let mut tree: GuttmanRTree<u64> = GuttmanRTree::new(2, 4).unwrap();
    tree.remove(&rect([0.0, 0.0], [1.0, 1.0]));
    assert!(tree.is_empty());
}

#[test]
fn boundary_point_finds_touching_cells() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    for i in 0..3u64 {
        for j in 0..3u64 {
            let (x, y) = (j as f64, i as f64);
            tree.insert(rect([x, y], [x + 1.0, y + 1.0]), i * 3 + j)
                .unwrap();
        }
    }

    let hits = ids(tree.search(&rect([1.0, 1.0], [1.0, 1.0])));
    assert!(hits.is_superset(&BTreeSet::from([0, 1, 3, 4])));

    let hits = tree.search(&rect([0.5, 0.5], [2.5, 2.5]));
    assert_eq!(hits.len(), 9);
}

#[test]
fn duplicate_rectangles_coexist_and_remove_one_at_a_time() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    let r = rect([5.0, 5.0], [10.0, 10.0]);
    for i in 0..5u64 {
        tree.insert(r.clone(), i).unwrap();
    }
    assert_eq!(tree.search(&r).len(), 5);

    for _ in 0..3 {
        tree.remove(&r);
    }
    assert_eq!(tree.search(&r).len(), 2);
    assert_eq!(tree.len(), 2);
    tree.validate().unwrap();
}

#[test]
fn remove_with_tolerant_equality() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    tree.insert(rect([1.0, 1.0], [2.0, 2.0]), 0u64).unwrap();
    tree.remove(&rect([1.0 + 1e-9, 1.0], [2.0, 2.0 - 1e-9]));
    assert!(tree.is_empty());
}

#[test]
fn quadrant_deletion_leaves_other_quadrants_intact() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    let mut rects = Vec::new();
    for i in 0..20u64 {
        let quadrant = i / 5;
        let within = (i % 5) as f64;
        let base_x = (quadrant % 2) as f64 * 50.0;
        let base_y = (quadrant / 2) as f64 * 50.0;
        let r = rect(
            [base_x + within, base_y + within],
            [base_x + within + 0.5, base_y + within + 0.5],
        );
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }

    for r in &rects[0..5] {
        tree.remove(r);
    }

    assert!(tree.search(&rect([0.0, 0.0], [10.0, 10.0])).is_empty());
    assert_eq!(tree.search(&rect([50.0, 0.0], [60.0, 10.0])).len(), 5);
    assert_eq!(tree.search(&rect([0.0, 50.0], [10.0, 60.0])).len(), 5);
    assert_eq!(tree.search(&rect([50.0, 50.0], [60.0, 60.0])).len(), 5);
    tree.validate().unwrap();
}

#[test]
fn delete_majority_of_entries() {
    let mut tree = GuttmanRTree::new(3, 7).unwrap();
    let mut rects = Vec::new();
    for i in 0..1000u64 {
        let x = (i % 50) as f64 * 2.0;
        let y = (i / 50) as f64 * 2.0;
        let r = rect([x, y], [x + 1.0, y + 1.0]);
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }

    for r in &rects[0..900] {
        tree.remove(r);
    }

    let hits = ids(tree.search(&rect([-10.0, -10.0], [200.0, 200.0])));
    assert_eq!(hits.len(), 100);
    assert!(hits.iter().all(|&id| id >= 900));
    tree.validate().unwrap();
}

#[test]
fn deep_tree_condense_with_internal_orphans() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    let mut rects = Vec::new();
    for i in 0..100u64 {
        let cluster_x = (i / 25) as f64 * 10.0;
        let cluster_y = (i % 25) as f64 * 0.5;
        let x = cluster_x + (i % 5) as f64 * 0.1;
        let y = cluster_y;
        let r = rect([x, y], [x + 0.05, y + 0.05]);
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }

    let to_delete = [
        0, 1, 2, 3, 4, 25, 26, 27, 28, 29, 50, 51, 52, 53, 54, 75, 76, 77, 78, 79,
    ];
    for &idx in &to_delete {
        tree.remove(&rects[idx]);
    }

    let hits = ids(tree.search(&rect([-10.0, -10.0], [50.0, 50.0])));
    assert_eq!(hits.len(), 80);
    for idx in to_delete {
        assert!(!hits.contains(&(idx as u64)));
    }
    tree.validate().unwrap();
}

#[test]
fn clustered_condense_stress() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    let mut rects = Vec::new();
    for i in 0..200u64 {
        let cluster = (i / 20) as f64;
        let within = i % 20;
        let x = cluster * 5.0 + (within % 4) as f64 * 0.1;
        let y = cluster * 5.0 + (within / 4) as f64 * 0.1;
        let r = rect([x, y], [x + 0.05, y + 0.05]);
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }

    for cluster in (0..10).step_by(2) {
        for j in 0..20 {
            tree.remove(&rects[cluster * 20 + j]);
        }
    }

    let hits = tree.search(&rect([-5.0, -5.0], [60.0, 60.0]));
    assert_eq!(hits.len(), 100);
    assert_eq!(tree.len(), 100);
    tree.validate().unwrap();
}

#[test]
fn randomized_churn_matches_linear_oracle() {
    let mut rng = StdRng::seed_from_u64(12345);
    let mut tree = GuttmanRTree::new(3, 6).unwrap();
    let mut rects = Vec::new();

    for i in 0..200u64 {
        let x: f64 = rng.random_range(0.0..100.0);
        let y: f64 = rng.random_range(0.0..100.0);
        let w: f64 = rng.random_range(0.5..5.0);
        let h: f64 = rng.random_range(0.5..5.0);
        let r = rect([x, y], [x + w, y + h]);
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }

    let mut to_delete: Vec<usize> = (0..200).step_by(2).collect();
    to_delete.shuffle(&mut rng);
    let deleted: BTreeSet<usize> = to_delete.iter().copied().collect();
    for &idx in &to_delete {
        tree.remove(&rects[idx]);
    }
    tree.validate().unwrap();

    for _ in 0..50 {
        let x: f64 = rng.random_range(0.0..100.0);
        let y: f64 = rng.random_range(0.0..100.0);
        let window = rect([x, y], [x + 20.0, y + 20.0]);

        let expected: BTreeSet<u64> = rects
            .iter()
            .enumerate()
            .filter(|(i, r)| !deleted.contains(i) && r.overlaps(&window))
            .map(|(i, _)| i as u64)
            .collect();
        assert_eq!(ids(tree.search(&window)), expected);
    }
}

#[test]
fn delete_reinsert_cycles_keep_count() {
    let mut tree = GuttmanRTree::new(2, 4).unwrap();
    let mut rects = Vec::new();
    for i in 0..100u64 {
        let x = (i % 10) as f64 * 2.0;
        let y = (i / 10) as f64 * 2.0;
        let r = rect([x, y], [x + 1.0, y + 1.0]);
        rects.push(r.clone());
        tree.insert(r, i).unwrap();
    }

    for cycle in 0..50usize {
        let victims: Vec<usize> = ((cycle % 10)..100).step_by(10).collect();
        for &idx in &victims {
            tree.remove(&rects[idx]);
        }
        for &idx in &victims {
            tree.insert(rects[idx].clone(), idx as u64).unwrap();
        }
        assert_eq!(tree.len(), 100);
    }

    let hits = ids(tree.search(&rect([-10.0, -10.0], [30.0, 30.0])));
    assert_eq!(hits.len(), 100);
    tree.validate().unwrap();
}

#[test]
fn grid_delete_reinsert_stress() {
    const N: usize = 50_000;
    const CYCLES: usize = 20;
    const STRIDE: usize = 7;

    let mut tree = GuttmanRTree::new(8, 16).unwrap();
    let grid = (N as f64).sqrt().ceil() as usize;
    let mut rects = Vec::with_capacity(N);

    for i in 0..N {
        let x = (i % grid) as f64 * 1.2;
        let y = (i / grid) as f64 * 1.2;
        let r = rect([x, y], [x + 1.0, y + 1.0]);
        rects.push(r.clone());
        tree.insert(r, i as u64).unwrap();
    }

    let universe = rect([-1000.0, -1000.0], [grid as f64 * 2.0, grid as f64 * 2.0]);
    for cycle in 0..CYCLES {
        let victims: Vec<usize> = (cycle..N).step_by(STRIDE).collect();
        for &idx in &victims {
            tree.remove(&rects[idx]);
        }
        for &idx in victims.iter().rev() {
            tree.insert(rects[idx].clone(), idx as u64).unwrap();
        }
        assert_eq!(tree.search(&universe).len(), N, "cycle {cycle}");
    }
    tree.validate().unwrap();
}
