//! d-dimensional Hilbert curve: a bijection between integer lattice
//! points and positions along a space-filling curve.
//!
//! The Hilbert curve preserves spatial locality: consecutive curve
//! indices map to lattice points at Manhattan distance 1. The Hilbert
//! R-tree keys every data rectangle by the curve index of its centroid,
//! which is what keeps entries in each node totally ordered.
//!
//! The point ⇄ index conversion is the transpose formulation (Skilling's
//! algorithm): coordinates are Gray-coded and exchanged axis by axis,
//! then the transposed axes are interleaved big-endian into a single
//! index. Indices are `u128`, so up to 128 total bits (`bits * dim`) are
//! supported; ordinates are `i64`, capping `bits` at 63.

use serde::{Deserialize, Serialize};

use crate::errors::{SpatialError, SpatialResult};

/// Largest bridgeable gap between two perimeter indices when coalescing
/// query ranges.
const MAX_RANGE_GAP: u128 = 100;

/// A closed interval `[start, end]` of Hilbert indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: u128,
    pub end: u128,
}

impl IndexRange {
    /// Creates a range, rejecting `start > end` with `InvalidParameter`.
    pub fn new(start: u128, end: u128) -> SpatialResult<Self> {
        if start > end {
            return Err(SpatialError::InvalidParameter(
                "range end must not be less than range start".into(),
            ));
        }
        Ok(IndexRange { start, end })
    }
}

/// A d-dimensional Hilbert curve over the lattice `[0, 2^bits - 1]^dim`.
#[derive(Debug, Clone)]
pub struct HilbertCurve {
    bits: u32,
    dim: u32,
    len: u32,
}

impl HilbertCurve {
    /// Creates a curve with `bits` bits per dimension over `dim`
    /// dimensions.
    ///
    /// Fails with `InvalidParameter` when either parameter is less than
    /// one, when `bits` exceeds 63 (ordinates are `i64`) or when
    /// `bits * dim` exceeds 128 (indices are `u128`).
    pub fn new(bits: u32, dim: u32) -> SpatialResult<Self> {
        if bits < 1 || dim < 1 {
            return Err(SpatialError::InvalidParameter(
                "curve bits and dimensions must both be at least 1".into(),
            ));
        }
        if bits > 63 {
            return Err(SpatialError::InvalidParameter(format!(
                "curve bits {bits} exceed the 63-bit ordinate limit"
            )));
        }
        if bits * dim > 128 {
            return Err(SpatialError::InvalidParameter(format!(
                "total curve length {} bits exceeds the 128-bit index limit",
                bits * dim
            )));
        }
        Ok(HilbertCurve {
            bits,
            dim,
            len: bits * dim,
        })
    }

    /// Bits per dimension.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of dimensions.
    pub fn dim(&self) -> u32 {
        self.dim
    }

    /// Total index length in bits (`bits * dim`).
    pub fn length(&self) -> u32 {
        self.len
    }

    /// Largest coordinate value on the lattice, `2^bits - 1`.
    pub fn max_ordinate(&self) -> i64 {
        ((1u128 << self.bits) - 1) as i64
    }

    /// Largest curve index, `2^(bits*dim) - 1`.
    pub fn max_index(&self) -> u128 {
        if self.len == 128 {
            u128::MAX
        } else {
            (1u128 << self.len) - 1
        }
    }

    /// Maps a lattice point to its curve index.
    ///
    /// Fails with `DimensionMismatch` for the wrong arity and
    /// `OutOfRange` for any coordinate outside `[0, max_ordinate]`.
    pub fn index(&self, point: &[i64]) -> SpatialResult<u128> {
        if point.len() != self.dim as usize {
            return Err(SpatialError::DimensionMismatch {
                expected: self.dim as usize,
                actual: point.len(),
            });
        }
        let max = self.max_ordinate();
        let mut axes = Vec::with_capacity(point.len());
        for &c in point {
            if c < 0 || c > max {
                return Err(SpatialError::OutOfRange { value: c, max });
            }
            axes.push(c as u64);
        }
        self.axes_to_transposed(&mut axes);
        Ok(self.transposed_to_index(&axes))
    }

    /// Maps a curve index back to its lattice point. Exact inverse of
    /// [`index`](Self::index) over the full domain.
    pub fn point(&self, index: u128) -> Vec<i64> {
        let mut axes = self.index_to_transposed(index);
        self.transposed_to_axes(&mut axes);
        axes.into_iter().map(|a| a as i64).collect()
    }

    /// Covers the box `[lo, hi]` with at most `max_ranges` contiguous
    /// index ranges (`max_ranges == 0` means unlimited).
    ///
    /// Perimeter cells of the box are mapped to indices, sorted, and
    /// coalesced into runs; a gap of up to 100 indices is bridged when
    /// every intermediate point falls inside the box. The union of the
    /// returned ranges covers every point of the box and may include
    /// points outside it. Fails with `InvalidParameter` when
    /// `buffer_size <= max_ranges` or when more than `buffer_size`
    /// ranges accumulate before truncation.
    pub fn query(
        &self,
        lo: &[i64],
        hi: &[i64],
        max_ranges: usize,
        buffer_size: usize,
    ) -> SpatialResult<Vec<IndexRange>> {
        if buffer_size <= max_ranges {
            return Err(SpatialError::InvalidParameter(
                "buffer size must be larger than the max range count".into(),
            ));
        }
        for side in [lo, hi] {
            if side.len() != self.dim as usize {
                return Err(SpatialError::DimensionMismatch {
                    expected: self.dim as usize,
                    actual: side.len(),
                });
            }
        }

        let mut indices = Vec::new();
        let mut cell = vec![0i64; self.dim as usize];
        self.collect_perimeter(lo, hi, 0, &mut cell, &mut indices)?;
        indices.sort_unstable();

        let mut ranges: Vec<IndexRange> = Vec::new();
        let Some(&first) = indices.first() else {
            return Ok(ranges);
        };

        let mut start = first;
        let mut end = first;
        for &idx in &indices[1..] {
            if idx == end {
                continue;
            }
            if idx - end <= MAX_RANGE_GAP && self.gap_inside_box(end, idx, lo, hi) {
                end = idx;
            } else {
                push_range(&mut ranges, start, end, buffer_size)?;
                start = idx;
                end = idx;
            }
        }
        push_range(&mut ranges, start, end, buffer_size)?;

        if max_ranges > 0 && ranges.len() > max_ranges {
            ranges.truncate(max_ranges);
        }
        Ok(ranges)
    }

    /// True when every index strictly between `from` and `to` maps to a
    /// point inside the box.
    fn gap_inside_box(&self, from: u128, to: u128, lo: &[i64], hi: &[i64]) -> bool {
        let mut idx = from + 1;
        while idx < to {
            let p = self.point(idx);
            let inside = p
                .iter()
                .zip(lo.iter().zip(hi))
                .all(|(&c, (&l, &h))| c >= l && c <= h);
            if !inside {
                return false;
            }
            idx += 1;
        }
        true
    }

    /// Enumerates the indices of every box cell lying on the perimeter
    /// (at least one coordinate equal to a box bound).
    fn collect_perimeter(
        &self,
        lo: &[i64],
        hi: &[i64],
        depth: usize,
        cell: &mut Vec<i64>,
        out: &mut Vec<u128>,
    ) -> SpatialResult<()> {
        if depth == self.dim as usize {
            let on_perimeter = cell
                .iter()
                .zip(lo.iter().zip(hi))
                .any(|(&c, (&l, &h))| c == l || c == h);
            if on_perimeter {
                out.push(self.index(cell)?);
            }
            return Ok(());
        }
        for x in lo[depth]..=hi[depth] {
            cell[depth] = x;
            self.collect_perimeter(lo, hi, depth + 1, cell, out)?;
        }
        Ok(())
    }

    /// Gray-codes and exchanges the axes in place into the transposed
    /// Hilbert representation.
    fn axes_to_transposed(&self, x: &mut [u64]) {
        let n = x.len();
        let m = 1u64 << (self.bits - 1);

        let mut q = m;
        while q > 1 {
            let p = q - 1;
            for i in 0..n {
                if x[i] & q != 0 {
                    x[0] ^= p;
                } else {
                    let t = (x[0] ^ x[i]) & p;
                    x[0] ^= t;
                    x[i] ^= t;
                }
            }
            q >>= 1;
        }

        for i in 1..n {
            let prev = x[i - 1];
            x[i] ^= prev;
        }

        let mut t = 0;
        let mut q = m;
        while q > 1 {
            if x[n - 1] & q != 0 {
                t ^= q - 1;
            }
            q >>= 1;
        }
        for v in x.iter_mut() {
            *v ^= t;
        }
    }

    /// Inverse of [`axes_to_transposed`](Self::axes_to_transposed).
    fn transposed_to_axes(&self, x: &mut [u64]) {
        let n = x.len();
        let top = 1u64 << self.bits;

        let t = x[n - 1] >> 1;
        for i in (1..n).rev() {
            let prev = x[i - 1];
            x[i] ^= prev;
        }
        x[0] ^= t;

        let mut q = 2u64;
        while q != top {
            let p = q - 1;
            for i in (0..n).rev() {
                if x[i] & q != 0 {
                    x[0] ^= p;
                } else {
                    let t = (x[0] ^ x[i]) & p;
                    x[0] ^= t;
                    x[i] ^= t;
                }
            }
            q <<= 1;
        }
    }

    /// Interleaves the transposed axes big-endian into a single index.
    fn transposed_to_index(&self, x: &[u64]) -> u128 {
        let mut index = 0u128;
        let mut bit = self.len as i64 - 1;
        let mut mask = 1u64 << (self.bits - 1);

        for _ in 0..self.bits {
            for axis in x {
                if axis & mask != 0 {
                    index |= 1u128 << bit;
                }
                bit -= 1;
            }
            mask >>= 1;
        }
        index
    }

    /// Inverse of [`transposed_to_index`](Self::transposed_to_index).
    fn index_to_transposed(&self, index: u128) -> Vec<u64> {
        let dim = self.dim as usize;
        let bits = self.bits as usize;
        let len = self.len as usize;
        let mut x = vec![0u64; dim];

        for bit in 0..len {
            if index & (1u128 << bit) != 0 {
                let d = (len - bit - 1) % dim;
                let s = (bit / dim) % bits;
                x[d] |= 1u64 << s;
            }
        }
        x
    }
}

fn push_range(
    ranges: &mut Vec<IndexRange>,
    start: u128,
    end: u128,
    buffer_size: usize,
) -> SpatialResult<()> {
    if ranges.len() >= buffer_size {
        return Err(SpatialError::InvalidParameter(
            "range buffer capacity exceeded".into(),
        ));
    }
    ranges.push(IndexRange::new(start, end)?);
    Ok(())
}
