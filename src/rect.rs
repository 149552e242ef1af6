//! Axis-aligned hyper-rectangles and the coordinate scalar abstraction.
//!
//! `Rect` is the unit of geometry for both tree variants: the Guttman
//! tree indexes `Rect<f64>`, the Hilbert tree indexes `Rect<i64>` on the
//! curve's integer lattice. All area arithmetic is carried out in `f64`
//! regardless of the coordinate type.

use serde::{Deserialize, Serialize};

use crate::errors::{SpatialError, SpatialResult};

/// Relative tolerance used for floating-point coordinate equality.
const REL_EPSILON: f64 = 1e-7;

/// A coordinate scalar usable in a [`Rect`].
///
/// Implemented for `f64` (tolerant equality) and `i64` (exact equality).
pub trait Coord: Copy + PartialOrd + std::fmt::Debug {
    /// The smaller of two coordinates.
    fn min_of(a: Self, b: Self) -> Self;

    /// The larger of two coordinates.
    fn max_of(a: Self, b: Self) -> Self;

    /// The componentwise midpoint, used for rectangle centroids.
    fn midpoint(a: Self, b: Self) -> Self;

    /// Widens to `f64` for area and enlargement arithmetic.
    fn to_f64(self) -> f64;

    /// Coordinate equality: relative-epsilon for floats, exact for ints.
    fn coord_eq(a: Self, b: Self) -> bool;
}

impl Coord for f64 {
    fn min_of(a: Self, b: Self) -> Self {
        a.min(b)
    }

    fn max_of(a: Self, b: Self) -> Self {
        a.max(b)
    }

    fn midpoint(a: Self, b: Self) -> Self {
        (a + b) / 2.0
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn coord_eq(a: Self, b: Self) -> bool {
        (a - b).abs() <= REL_EPSILON * (a.abs() + b.abs())
    }
}

impl Coord for i64 {
    fn min_of(a: Self, b: Self) -> Self {
        a.min(b)
    }

    fn max_of(a: Self, b: Self) -> Self {
        a.max(b)
    }

    fn midpoint(a: Self, b: Self) -> Self {
        ((a as i128 + b as i128) / 2) as i64
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn coord_eq(a: Self, b: Self) -> bool {
        a == b
    }
}

/// A d-dimensional axis-aligned rectangle given by its lower and upper
/// corners, with `lo[i] <= hi[i]` in every dimension.
///
/// Construction normalizes any out-of-order coordinate pair, so a
/// degenerate (zero-extent) rectangle is just a point and is valid in
/// every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect<S> {
    lo: Vec<S>,
    hi: Vec<S>,
}

impl<S: Coord> Rect<S> {
    /// Creates a rectangle from two corner points.
    ///
    /// Out-of-order coordinate pairs are swapped per dimension. Fails
    /// with `DimensionMismatch` when the corners disagree in arity and
    /// with `InvalidParameter` for zero-dimensional input.
    pub fn new(lo: Vec<S>, hi: Vec<S>) -> SpatialResult<Self> {
        if lo.len() != hi.len() {
            return Err(SpatialError::DimensionMismatch {
                expected: lo.len(),
                actual: hi.len(),
            });
        }
        if lo.is_empty() {
            return Err(SpatialError::InvalidParameter(
                "rectangle must have at least one dimension".into(),
            ));
        }
        let mut lo = lo;
        let mut hi = hi;
        for i in 0..lo.len() {
            if hi[i] < lo[i] {
                std::mem::swap(&mut lo[i], &mut hi[i]);
            }
        }
        Ok(Rect { lo, hi })
    }

    /// Creates a zero-extent rectangle (a point).
    pub fn point(coords: Vec<S>) -> SpatialResult<Self> {
        Rect::new(coords.clone(), coords)
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.lo.len()
    }

    /// Lower corner coordinates.
    pub fn lo(&self) -> &[S] {
        &self.lo
    }

    /// Upper corner coordinates.
    pub fn hi(&self) -> &[S] {
        &self.hi
    }

    /// Area (hyper-volume): the product of the extents. Zero when any
    /// dimension has zero extent.
    pub fn area(&self) -> f64 {
        self.lo
            .iter()
            .zip(&self.hi)
            .map(|(&l, &h)| h.to_f64() - l.to_f64())
            .product()
    }

    /// The centroid, componentwise midpoint of the corners.
    pub fn center(&self) -> Vec<S> {
        self.lo
            .iter()
            .zip(&self.hi)
            .map(|(&l, &h)| S::midpoint(l, h))
            .collect()
    }

    /// The minimum bounding rectangle of `self` and `other`.
    pub fn union(&self, other: &Rect<S>) -> Rect<S> {
        let lo = self
            .lo
            .iter()
            .zip(&other.lo)
            .map(|(&a, &b)| S::min_of(a, b))
            .collect();
        let hi = self
            .hi
            .iter()
            .zip(&other.hi)
            .map(|(&a, &b)| S::max_of(a, b))
            .collect();
        Rect { lo, hi }
    }

    /// Grows `self` in place to cover `other`.
    pub fn expand(&mut self, other: &Rect<S>) {
        for i in 0..self.lo.len() {
            self.lo[i] = S::min_of(self.lo[i], other.lo[i]);
            self.hi[i] = S::max_of(self.hi[i], other.hi[i]);
        }
    }

    /// Closed-rectangle intersection test: touching edges overlap.
    ///
    /// Rectangles of different dimensionality never overlap.
    pub fn overlaps(&self, other: &Rect<S>) -> bool {
        if self.dim() != other.dim() {
            return false;
        }
        self.lo
            .iter()
            .zip(&self.hi)
            .zip(other.lo.iter().zip(&other.hi))
            .all(|((&l, &h), (&ol, &oh))| l <= oh && h >= ol)
    }

    /// Whether `self` fully contains `other` (closed bounds).
    pub fn contains(&self, other: &Rect<S>) -> bool {
        if self.dim() != other.dim() {
            return false;
        }
        self.lo
            .iter()
            .zip(&self.hi)
            .zip(other.lo.iter().zip(&other.hi))
            .all(|((&l, &h), (&ol, &oh))| l <= ol && oh <= h)
    }

    /// Componentwise equality under the scalar's tolerance.
    pub fn approx_eq(&self, other: &Rect<S>) -> bool {
        if self.dim() != other.dim() {
            return false;
        }
        self.lo
            .iter()
            .zip(&other.lo)
            .all(|(&a, &b)| S::coord_eq(a, b))
            && self
                .hi
                .iter()
                .zip(&other.hi)
                .all(|(&a, &b)| S::coord_eq(a, b))
    }

    /// Area growth needed for `self` to also cover `other`.
    pub fn enlargement(&self, other: &Rect<S>) -> f64 {
        self.union(other).area() - self.area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(lo: Vec<f64>, hi: Vec<f64>) -> Rect<f64> {
        Rect::new(lo, hi).unwrap()
    }

    #[test]
    fn test_new_swaps_corners() {
        let r = rect(vec![5.0, 0.0], vec![1.0, 4.0]);
        assert_eq!(r.lo(), &[1.0, 0.0]);
        assert_eq!(r.hi(), &[5.0, 4.0]);
    }

    #[test]
    fn test_new_dimension_mismatch() {
        let err = Rect::new(vec![0.0], vec![1.0, 1.0]).unwrap_err();
        assert!(matches!(err, SpatialError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_new_empty_rejected() {
        let err = Rect::<f64>::new(vec![], vec![]).unwrap_err();
        assert!(matches!(err, SpatialError::InvalidParameter(_)));
    }

    #[test]
    fn test_area() {
        assert_eq!(rect(vec![0.0, 0.0], vec![10.0, 5.0]).area(), 50.0);
        assert_eq!(rect(vec![0.0, 0.0, 0.0], vec![2.0, 3.0, 4.0]).area(), 24.0);
    }

    #[test]
    fn test_zero_area_point() {
        let p = Rect::point(vec![5.0, 5.0]).unwrap();
        assert_eq!(p.area(), 0.0);
        assert!(p.overlaps(&p));
        assert!(p.contains(&p));
    }

    #[test]
    fn test_center() {
        assert_eq!(rect(vec![0.0, 0.0], vec![10.0, 10.0]).center(), vec![5.0, 5.0]);
        let r = Rect::new(vec![1i64, 3], vec![4, 5]).unwrap();
        assert_eq!(r.center(), vec![2, 4]);
    }

    #[test]
    fn test_union() {
        let u = rect(vec![0.0, 0.0], vec![5.0, 5.0]).union(&rect(vec![3.0, 3.0], vec![10.0, 10.0]));
        assert_eq!(u.lo(), &[0.0, 0.0]);
        assert_eq!(u.hi(), &[10.0, 10.0]);
    }

    #[test]
    fn test_expand() {
        let mut r = rect(vec![0.0, 0.0], vec![5.0, 5.0]);
        r.expand(&rect(vec![-1.0, 2.0], vec![3.0, 8.0]));
        assert_eq!(r.lo(), &[-1.0, 0.0]);
        assert_eq!(r.hi(), &[5.0, 8.0]);
    }

    #[test]
    fn test_overlaps() {
        let a = rect(vec![0.0, 0.0], vec![10.0, 10.0]);
        let b = rect(vec![5.0, 5.0], vec![15.0, 15.0]);
        let c = rect(vec![20.0, 20.0], vec![30.0, 30.0]);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_overlaps_touching_edges() {
        let a = rect(vec![0.0, 0.0], vec![10.0, 10.0]);
        let corner = rect(vec![10.0, 10.0], vec![20.0, 20.0]);
        assert!(a.overlaps(&corner));
    }

    #[test]
    fn test_contains() {
        let outer = rect(vec![0.0, 0.0], vec![10.0, 10.0]);
        let inner = rect(vec![2.0, 2.0], vec![8.0, 8.0]);
        let partial = rect(vec![5.0, 5.0], vec![15.0, 15.0]);
        assert!(outer.contains(&inner));
        assert!(!outer.contains(&partial));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_approx_eq_float_tolerance() {
        let a = rect(vec![1.0, 1.0], vec![2.0, 2.0]);
        let b = rect(vec![1.0 + 1e-9, 1.0], vec![2.0, 2.0 - 1e-9]);
        let c = rect(vec![1.0 + 1e-3, 1.0], vec![2.0, 2.0]);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }

    #[test]
    fn test_approx_eq_int_exact() {
        let a = Rect::new(vec![1i64, 1], vec![2, 2]).unwrap();
        let b = Rect::new(vec![1i64, 1], vec![2, 2]).unwrap();
        let c = Rect::new(vec![1i64, 1], vec![2, 3]).unwrap();
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }

    #[test]
    fn test_enlargement() {
        let a = rect(vec![0.0, 0.0], vec![5.0, 5.0]);
        let b = rect(vec![5.0, 0.0], vec![10.0, 5.0]);
        assert_eq!(a.enlargement(&b), 25.0);
        assert_eq!(a.enlargement(&a), 0.0);
    }

    #[test]
    fn test_midpoint_negative_int() {
        let r = Rect::new(vec![-4i64], vec![-1]).unwrap();
        assert_eq!(r.center(), vec![-2]);
    }

    #[test]
    fn test_serde_round_trip() {
        let r = rect(vec![1.5, 2.5], vec![3.5, 4.5]);
        let json = serde_json::to_string(&r).unwrap();
        let back: Rect<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
