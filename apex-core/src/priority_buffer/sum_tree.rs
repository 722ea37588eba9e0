//! Sum tree for prioritized sampling.
//!
//! Leaves hold priorities and every internal node holds the sum of its two
//! children, so the root is the total priority mass. The tree is stored as an
//! array of `2 * capacity - 1` nodes with the leaves at the end.
use segment_tree::{
    ops::{MaxIgnoreNaN, MinIgnoreNaN},
    SegmentPoint,
};

#[derive(Debug)]
pub struct SumTree {
    capacity: usize,
    tree: Vec<f64>,
    min_tree: SegmentPoint<f64, MinIgnoreNaN>,
    max_tree: SegmentPoint<f64, MaxIgnoreNaN>,
}

impl SumTree {
    /// `capacity` must be positive.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            tree: vec![0f64; 2 * capacity - 1],
            min_tree: SegmentPoint::build(vec![f64::INFINITY; capacity], MinIgnoreNaN),
            max_tree: SegmentPoint::build(vec![0f64; capacity], MaxIgnoreNaN),
        }
    }

    #[inline]
    fn leaf(&self, slot: usize) -> usize {
        slot + self.capacity - 1
    }

    /// Total priority mass.
    pub fn total(&self) -> f64 {
        self.tree[0]
    }

    /// Largest priority among used leaves, `0` if none is used.
    pub fn max(&self) -> f64 {
        self.max_tree.query(0, self.capacity)
    }

    /// Smallest priority among used leaves, infinity if none is used.
    pub fn min(&self) -> f64 {
        self.min_tree.query(0, self.capacity)
    }

    /// Priority at `slot`.
    pub fn priority(&self, slot: usize) -> f64 {
        self.tree[self.leaf(slot)]
    }

    /// Sets the priority at `slot` and recomputes its ancestors up to the root.
    ///
    /// Parents are recomputed from both children instead of adding the
    /// difference, so rounding errors do not accumulate over updates.
    pub fn set(&mut self, slot: usize, p: f64) {
        debug_assert!(slot < self.capacity);
        debug_assert!(p.is_finite() && p > 0.0);

        self.min_tree.modify(slot, p);
        self.max_tree.modify(slot, p);

        let mut ix = self.leaf(slot);
        self.tree[ix] = p;
        while ix > 0 {
            ix = (ix - 1) / 2;
            self.tree[ix] = self.tree[2 * ix + 1] + self.tree[2 * ix + 2];
        }
    }

    /// Returns the slot whose cumulative priority range `[c_{i-1}, c_i)` contains `s`.
    ///
    /// A value equal to the mass of a left subtree descends to the right. The
    /// descent never enters a subtree with zero mass, so unused leaves are
    /// never returned while the total is positive.
    pub fn find(&self, mut s: f64) -> usize {
        let n_internal = self.capacity - 1;
        let mut ix = 0;

        while ix < n_internal {
            let left = 2 * ix + 1;
            let right = left + 1;
            if s < self.tree[left] || self.tree[right] <= 0.0 {
                ix = left;
            } else {
                s -= self.tree[left];
                ix = right;
            }
        }

        ix - n_internal
    }
}

#[cfg(test)]
mod tests {
    use super::SumTree;

    fn filled(data: &[f64], capacity: usize) -> SumTree {
        let mut sum_tree = SumTree::new(capacity);
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.set(ix, p);
        }
        sum_tree
    }

    fn assert_internal_sums(sum_tree: &SumTree) {
        for ix in 0..sum_tree.capacity - 1 {
            let s = sum_tree.tree[2 * ix + 1] + sum_tree.tree[2 * ix + 2];
            assert!((sum_tree.tree[ix] - s).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sum_tree_odd() {
        let data = vec![0.5f64, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let sum_tree = filled(&data, 8);

        assert!((sum_tree.total() - data.iter().sum::<f64>()).abs() < 1e-9);
        assert_eq!(sum_tree.find(0.0), 0);
        assert_eq!(sum_tree.find(0.4), 0);
        assert_eq!(sum_tree.find(0.5), 1);
        assert_eq!(sum_tree.find(0.6), 1);
        assert_eq!(sum_tree.find(1.2), 2);
        assert_eq!(sum_tree.find(1.6), 3);
        assert_eq!(sum_tree.find(2.0), 4);
        assert_eq!(sum_tree.find(2.8), 4);
        assert_eq!(sum_tree.find(9.0), 6);

        // Past the end of the mass still lands on a used leaf.
        assert_eq!(sum_tree.find(100.0), 6);
        assert_internal_sums(&sum_tree);
    }

    #[test]
    fn test_sum_tree_non_power_of_two() {
        let data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0];
        let sum_tree = filled(&data, 5);
        assert!((sum_tree.total() - 15.0).abs() < 1e-9);
        assert_internal_sums(&sum_tree);

        let mut counts = vec![0usize; 5];
        let n = 15_000;
        for k in 0..n {
            let s = (k as f64 + 0.5) * 15.0 / n as f64;
            counts[sum_tree.find(s)] += 1;
        }
        for (ix, &c) in counts.iter().enumerate() {
            assert_eq!(c, (ix + 1) * 1000);
        }
    }

    #[test]
    fn test_min_max() {
        let mut sum_tree = filled(&[0.5, 3.0, 1.5], 4);
        assert_eq!(sum_tree.max(), 3.0);
        assert_eq!(sum_tree.min(), 0.5);

        sum_tree.set(1, 0.25);
        assert_eq!(sum_tree.max(), 1.5);
        assert_eq!(sum_tree.min(), 0.25);
        assert!((sum_tree.total() - 2.25).abs() < 1e-12);
    }

    #[test]
    fn test_capacity_one() {
        let mut sum_tree = SumTree::new(1);
        sum_tree.set(0, 2.0);
        assert_eq!(sum_tree.total(), 2.0);
        assert_eq!(sum_tree.find(1.9), 0);
    }
}
