//! Sum tree for prioritized sampling.
//!
//! Leaves are stored in the last level of a flat heap array. The leaf level is
//! padded to a power of two so that every leaf sits at the same depth; padding
//! leaves keep priority zero and are never selected.
use crate::error::CaresError;
use anyhow::Result;
use rand::Rng;

/// A binary tree whose internal nodes hold the sum of their children.
#[derive(Debug, Clone)]
pub struct SumTree {
    capacity: usize,
    n_leaves: usize,
    tree: Vec<f64>,
}

impl SumTree {
    /// Creates a tree with `capacity` leaves, all of priority zero.
    pub fn new(capacity: usize) -> Self {
        let n_leaves = capacity.max(1).next_power_of_two();
        Self {
            capacity,
            n_leaves,
            tree: vec![0f64; 2 * n_leaves - 1],
        }
    }

    /// Number of usable leaves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total priority mass, the value at the root.
    pub fn total(&self) -> f64 {
        self.tree[0]
    }

    /// Priority of the `ix`-th leaf.
    pub fn get(&self, ix: usize) -> f64 {
        self.tree[ix + self.n_leaves - 1]
    }

    /// Priorities of all usable leaves.
    pub fn leaves(&self) -> &[f64] {
        let offset = self.n_leaves - 1;
        &self.tree[offset..offset + self.capacity]
    }

    fn check(&self, ix: usize, p: f64) -> Result<()> {
        if ix >= self.capacity {
            return Err(CaresError::IndexOutOfRange {
                index: ix,
                len: self.capacity,
            }
            .into());
        }
        if p.is_nan() || p < 0.0 {
            return Err(CaresError::InvalidPriority {
                index: ix,
                priority: p,
            }
            .into());
        }
        Ok(())
    }

    fn set_unchecked(&mut self, ix: usize, p: f64) {
        let mut node = ix + self.n_leaves - 1;
        self.tree[node] = p;
        while node > 0 {
            node = (node - 1) / 2;
            self.tree[node] = self.tree[2 * node + 1] + self.tree[2 * node + 2];
        }
    }

    /// Sets the priority of the `ix`-th leaf and updates its ancestors.
    ///
    /// # Errors
    ///
    /// Fails without modifying the tree if `ix` is out of range or `p` is
    /// negative or NaN.
    pub fn set(&mut self, ix: usize, p: f64) -> Result<()> {
        self.check(ix, p)?;
        self.set_unchecked(ix, p);
        Ok(())
    }

    /// Applies [`SumTree::set`] to each pair in order.
    ///
    /// Duplicated indices take the last value. All pairs are validated before
    /// the tree is touched.
    pub fn batch_set(&mut self, ixs: &[usize], ps: &[f64]) -> Result<()> {
        if ixs.len() != ps.len() {
            return Err(CaresError::LengthMismatch(ixs.len(), ps.len()).into());
        }
        for (&ix, &p) in ixs.iter().zip(ps.iter()) {
            self.check(ix, p)?;
        }
        for (&ix, &p) in ixs.iter().zip(ps.iter()) {
            self.set_unchecked(ix, p);
        }
        Ok(())
    }

    /// Returns the leaf whose cumulative priority range contains `value`.
    ///
    /// A subtree with zero mass is never entered, so a zero-priority leaf is
    /// never returned while the total is positive.
    fn retrieve(&self, mut value: f64) -> usize {
        let mut node = 0;
        while node < self.n_leaves - 1 {
            let left = 2 * node + 1;
            let right = left + 1;
            if value < self.tree[left] || self.tree[right] <= 0.0 {
                node = left;
            } else {
                value -= self.tree[left];
                node = right;
            }
        }
        node + 1 - self.n_leaves
    }

    fn positive_total(&self) -> Result<f64> {
        let total = self.total();
        if total > 0.0 {
            Ok(total)
        } else {
            Err(CaresError::ZeroPriorityMass.into())
        }
    }

    /// Draws `batch_size` leaves with independent uniform values over the
    /// total mass.
    pub fn sample_simple<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<usize>> {
        let total = self.positive_total()?;
        Ok((0..batch_size)
            .map(|_| self.retrieve(total * rng.gen::<f64>()))
            .collect())
    }

    /// Draws one leaf from each of `batch_size` equal-width strata of the
    /// total mass.
    pub fn sample_stratified<R: Rng>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let total = self.positive_total()?;
        let seg = total / batch_size as f64;
        Ok((0..batch_size)
            .map(|i| self.retrieve(seg * (i as f64 + rng.gen::<f64>())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn assert_sums_consistent(tree: &SumTree) {
        for node in 0..tree.n_leaves - 1 {
            let sum = tree.tree[2 * node + 1] + tree.tree[2 * node + 2];
            assert!((tree.tree[node] - sum).abs() < 1e-9, "node {}", node);
        }
        let leaves: f64 = tree.leaves().iter().sum();
        assert!((tree.total() - leaves).abs() < 1e-9);
    }

    #[test]
    fn test_sums_after_updates() {
        let mut tree = SumTree::new(7);
        let data = [0.5, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        for (ix, p) in data.iter().enumerate() {
            tree.set(ix, *p).unwrap();
            assert_sums_consistent(&tree);
        }
        tree.batch_set(&[1, 3, 1], &[4.0, 0.0, 2.0]).unwrap();
        assert_sums_consistent(&tree);
        assert_eq!(tree.get(1), 2.0);
        assert_eq!(tree.get(3), 0.0);
        assert!((tree.total() - 10.8).abs() < 1e-9);
    }

    #[test]
    fn test_retrieve() {
        let mut tree = SumTree::new(8);
        let data = [0.5, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        tree.batch_set(&(0..7).collect::<Vec<_>>(), &data).unwrap();

        assert_eq!(tree.retrieve(0.0), 0);
        assert_eq!(tree.retrieve(0.4), 0);
        assert_eq!(tree.retrieve(0.6), 1);
        assert_eq!(tree.retrieve(1.2), 2);
        assert_eq!(tree.retrieve(1.6), 3);
        assert_eq!(tree.retrieve(2.0), 4);
        // Overshooting the total never lands on the empty last leaf.
        assert_eq!(tree.retrieve(100.0), 6);
    }

    #[test]
    fn test_invalid_priority() {
        let mut tree = SumTree::new(4);
        assert!(tree.set(0, -1.0).is_err());
        assert!(tree.set(0, f64::NAN).is_err());
        assert!(tree.set(4, 1.0).is_err());
        assert!(tree.batch_set(&[0, 1], &[1.0, -2.0]).is_err());
        assert_eq!(tree.total(), 0.0);
        assert!(tree.batch_set(&[0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_zero_mass_fails() {
        let tree = SumTree::new(4);
        let mut rng = StdRng::seed_from_u64(0);
        let err = tree.sample_simple(2, &mut rng).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CaresError>(),
            Some(&CaresError::ZeroPriorityMass)
        );
        assert!(tree.sample_stratified(2, &mut rng).is_err());
    }

    #[test]
    fn test_simple_distribution() {
        let mut tree = SumTree::new(4);
        tree.batch_set(&[0, 1, 2, 3], &[1.0; 4]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 40_000;
        let ixs = tree.sample_simple(n, &mut rng).unwrap();
        for leaf in 0..4 {
            let freq = ixs.iter().filter(|&&ix| ix == leaf).count() as f64 / n as f64;
            assert!((freq - 0.25).abs() < 0.02, "leaf {}: {}", leaf, freq);
        }
    }

    #[test]
    fn test_stratified_coverage() {
        let mut tree = SumTree::new(4);
        tree.batch_set(&[0, 1, 2, 3], &[1.0; 4]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let ixs = tree.sample_stratified(4, &mut rng).unwrap();
            assert_eq!(ixs, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_unwritten_leaves_are_not_sampled() {
        let mut tree = SumTree::new(10);
        tree.batch_set(&[0, 1, 2], &[1.0, 1e-12, 3.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let ixs = tree.sample_simple(10_000, &mut rng).unwrap();
        assert!(ixs.iter().all(|&ix| ix < 3));
    }
}
