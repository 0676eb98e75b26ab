use serde::{Deserialize, Serialize};

use crate::rings::Ring;

/// Amount of correlated randomness consumed by a computation.
/// Counts follow the cost of the circuits in `crate::circuits`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPlan {
    pub beaver_triples: usize,
    pub matrix_triples: Vec<[usize; 3]>,
    pub truncation_pairs: usize,
    pub comparison_masks: usize,
}

impl MaterialPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elementwise multiplication of `count` pairs.
    pub fn mul(&mut self, count: usize) -> &mut Self {
        self.beaver_triples += count;
        self
    }

    /// Product of m×k and k×n matrices.
    pub fn matmul(&mut self, dims: [usize; 3]) -> &mut Self {
        self.matrix_triples.push(dims);
        self
    }

    /// Probabilistic truncation of `count` elements.
    pub fn truncate(&mut self, count: usize) -> &mut Self {
        self.truncation_pairs += count;
        self
    }

    /// Sign extraction of `count` elements: one mask each plus the bitwise comparison tree,
    /// which combines SAFE_BITS-1 leaves with two multiplications per combine.
    pub fn compare<R: Ring>(&mut self, count: usize) -> &mut Self {
        let leaves = (R::SAFE_BITS - 1) as usize;
        self.comparison_masks += count;
        self.mul(2 * (leaves - 1) * count)
    }

    /// ReLU of `count` elements.
    pub fn relu<R: Ring>(&mut self, count: usize) -> &mut Self {
        self.compare::<R>(count).mul(count)
    }

    /// Argmax over `classes` columns for `rows` rows.
    pub fn argmax<R: Ring>(&mut self, rows: usize, classes: usize) -> &mut Self {
        let matches = classes.saturating_sub(1) * rows;
        self.compare::<R>(matches).mul(2 * matches)
    }

    /// Equality test of `count` integer pairs.
    pub fn equal<R: Ring>(&mut self, count: usize) -> &mut Self {
        self.compare::<R>(2 * count)
    }

    /// Append requirements of another plan.
    pub fn extend(&mut self, other: &MaterialPlan) -> &mut Self {
        self.beaver_triples += other.beaver_triples;
        self.matrix_triples.extend_from_slice(&other.matrix_triples);
        self.truncation_pairs += other.truncation_pairs;
        self.comparison_masks += other.comparison_masks;
        self
    }

    /// Plan repeated `times` times.
    pub fn repeat(&self, times: usize) -> Self {
        let mut plan = Self::new();
        for _ in 0..times {
            plan.extend(self);
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::Z64;

    #[test]
    fn test_relu_cost() {
        let mut plan = MaterialPlan::new();
        plan.relu::<Z64>(10);
        assert_eq!(plan.comparison_masks, 10);
        assert_eq!(plan.beaver_triples, 10 * 2 * 46 + 10);
    }

    #[test]
    fn test_repeat() {
        let mut plan = MaterialPlan::new();
        plan.matmul([1, 2, 3]).truncate(3);
        let repeated = plan.repeat(2);
        assert_eq!(repeated.matrix_triples, vec![[1, 2, 3], [1, 2, 3]]);
        assert_eq!(repeated.truncation_pairs, 6);
        assert!(MaterialPlan::new().is_empty());
    }
}
