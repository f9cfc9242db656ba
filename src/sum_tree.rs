use num_traits::{Num, ToPrimitive};

/// Weighted sampling over a fixed number of leaves.
///
/// The weights live in the leaves of an implicit complete binary tree whose
/// inner nodes hold the sums of their subtrees, so updates and draws take
/// logarithmic time.
#[derive(Debug, Clone, PartialEq)]
pub struct SumTree<T> {
    size: usize,
    // number of leaves of the complete tree, a power of two
    capacity: usize,
    nodes: Vec<T>,
}

impl<T: Copy + PartialOrd + Num + ToPrimitive> SumTree<T> {
    pub fn new(weights: &[T]) -> Self {
        let capacity = weights.len().next_power_of_two();
        let mut nodes = vec![T::zero(); 2 * capacity];

        nodes[capacity..capacity + weights.len()].copy_from_slice(weights);
        for node in (1..capacity).rev() {
            nodes[node] = nodes[2 * node] + nodes[2 * node + 1];
        }

        Self {
            size: weights.len(),
            capacity,
            nodes,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total(&self) -> T {
        if self.size == 0 { T::zero() } else { self.nodes[1] }
    }

    pub fn weight(&self, leaf: usize) -> T {
        assert!(leaf < self.size, "leaf {} out of bounds", leaf);
        self.nodes[self.capacity + leaf]
    }

    pub fn add(&mut self, leaf: usize, delta: T) {
        let weight = self.weight(leaf);
        self.set(leaf, weight + delta);
    }

    pub fn set(&mut self, leaf: usize, weight: T) {
        assert!(leaf < self.size, "leaf {} out of bounds", leaf);

        let mut node = self.capacity + leaf;
        self.nodes[node] = weight;

        while node > 1 {
            node /= 2;
            self.nodes[node] = self.nodes[2 * node] + self.nodes[2 * node + 1];
        }
    }

    /// The leaf covering the fraction `u` in [0, 1) of the total weight, or
    /// `None` if there is no weight to draw from
    pub fn sample(&self, u: f64) -> Option<usize> {
        let total = self.total().to_f64()?;
        if self.size == 0 || total <= 0.0 {
            return None;
        }

        let mut target = u * total;
        let mut node = 1;

        while node < self.capacity {
            let left = self.nodes[2 * node].to_f64()?;
            let right = self.nodes[2 * node + 1];

            if target < left || right == T::zero() {
                node *= 2;
            } else {
                target -= left;
                node = 2 * node + 1;
            }
        }

        Some((node - self.capacity).min(self.size - 1))
    }
}
