use ndarray::{Array2, ArrayD};
use rand::Rng;
use tracing::{debug, info};

use crate::{
    rings::{self, Ring},
    share::AdditiveShare,
    tensor::SecureTensor,
};

use super::{
    BeaverTriple, ComparisonMask, MatrixTriple, MaterialPlan, PrecomputedMaterial, TruncationPair,
};

/// Trusted generator of correlated randomness.
/// Every sampled secret is split among parties and dropped; the provider keeps nothing.
/// It must not collude with any computation party.
pub struct CryptoProvider<G> {
    num_parties: usize,
    rng: G,
}

impl<G: Rng> CryptoProvider<G> {
    pub fn new(num_parties: usize, rng: G) -> Self {
        assert!(num_parties > 0, "Provider needs at least one party");
        Self { num_parties, rng }
    }

    pub fn num_parties(&self) -> usize {
        self.num_parties
    }

    /// Per-party Beaver triples, one per element of `shape`.
    pub fn generate_mul_triples<R: Ring>(&mut self, shape: &[usize]) -> Vec<Vec<BeaverTriple<R>>> {
        let count = shape.iter().product();
        let mut parts = self.per_party(count);
        for _ in 0..count {
            let a = R::random(&mut self.rng);
            let b = R::random(&mut self.rng);
            let shares_a = self.share(a);
            let shares_b = self.share(b);
            let shares_c = self.share(a * b);
            for (i, part) in parts.iter_mut().enumerate() {
                part.push(BeaverTriple {
                    a: shares_a[i],
                    b: shares_b[i],
                    c: shares_c[i],
                });
            }
        }
        parts
    }

    /// Per-party sharing of random A (m×k), B (k×n) and C = A·B.
    pub fn generate_matrix_triple<R: Ring>(&mut self, [m, k, n]: [usize; 3]) -> Vec<MatrixTriple<R>> {
        let a = Array2::from_shape_simple_fn((m, k), || R::random(&mut self.rng));
        let b = Array2::from_shape_simple_fn((k, n), || R::random(&mut self.rng));
        let c = rings::matmul(a.view(), b.view());
        let shares_a = self.share_tensor(a.into_dyn());
        let shares_b = self.share_tensor(b.into_dyn());
        let shares_c = self.share_tensor(c.into_dyn());
        itertools::izip!(shares_a, shares_b, shares_c)
            .map(|(a, b, c)| MatrixTriple { a, b, c })
            .collect()
    }

    /// Per-party truncation pairs, one per element of `shape`.
    pub fn generate_truncation_material<R: Ring>(
        &mut self,
        shape: &[usize],
        precision: u32,
    ) -> Vec<Vec<TruncationPair<R>>> {
        let count = shape.iter().product();
        let mut parts = self.per_party(count);
        for _ in 0..count {
            let mask = R::random_below_power_of_two(&mut self.rng, R::BITS - 1);
            let shares_mask = self.share(mask);
            let shares_shifted = self.share(mask.shift_right(precision));
            for (i, part) in parts.iter_mut().enumerate() {
                part.push(TruncationPair {
                    mask: shares_mask[i],
                    mask_shifted: shares_shifted[i],
                });
            }
        }
        parts
    }

    /// Per-party comparison masks, one per element of `shape`.
    pub fn generate_comparison_material<R: Ring>(
        &mut self,
        shape: &[usize],
    ) -> Vec<Vec<ComparisonMask<R>>> {
        let count = shape.iter().product();
        let low_len = R::SAFE_BITS - 1;
        let mut parts = self.per_party(count);
        for _ in 0..count {
            let high = R::random_below_power_of_two(&mut self.rng, R::BITS - R::SAFE_BITS);
            let shares_high = self.share(high);
            let mut masks: Vec<_> = shares_high
                .into_iter()
                .map(|high| ComparisonMask {
                    high,
                    low_bits: Vec::with_capacity(low_len as usize),
                })
                .collect();
            for _ in 0..low_len {
                let bit = R::from_bool(self.rng.gen());
                for (mask, share) in masks.iter_mut().zip(self.share(bit)) {
                    mask.low_bits.push(share);
                }
            }
            for (part, mask) in parts.iter_mut().zip(masks) {
                part.push(mask);
            }
        }
        parts
    }

    /// Generate complete per-party material for given plan.
    pub fn generate<R: Ring>(
        &mut self,
        plan: &MaterialPlan,
        precision: u32,
    ) -> Vec<PrecomputedMaterial<R>> {
        info!(
            parties = self.num_parties,
            triples = plan.beaver_triples,
            matrix_triples = plan.matrix_triples.len(),
            truncations = plan.truncation_pairs,
            comparisons = plan.comparison_masks,
            "Generating precomputed material"
        );

        let mut data: Vec<_> = (0..self.num_parties)
            .map(|party_id| PrecomputedMaterial::empty(self.num_parties, party_id, precision))
            .collect();

        for (party, triples) in data
            .iter_mut()
            .zip(self.generate_mul_triples(&[plan.beaver_triples]))
        {
            party.beaver_triples.extend(triples);
        }

        for &dims in &plan.matrix_triples {
            debug!(?dims, "Generating matrix triple");
            for (party, triple) in data.iter_mut().zip(self.generate_matrix_triple(dims)) {
                party.matrix_triples.push_back(triple);
            }
        }

        for (party, pairs) in data
            .iter_mut()
            .zip(self.generate_truncation_material(&[plan.truncation_pairs], precision))
        {
            party.truncation_pairs.extend(pairs);
        }

        for (party, masks) in data
            .iter_mut()
            .zip(self.generate_comparison_material(&[plan.comparison_masks]))
        {
            party.comparison_masks.extend(masks);
        }

        data
    }

    fn per_party<T>(&self, capacity: usize) -> Vec<Vec<T>> {
        (0..self.num_parties)
            .map(|_| Vec::with_capacity(capacity))
            .collect()
    }

    fn share<R: Ring>(&mut self, value: R) -> Vec<AdditiveShare<R>> {
        AdditiveShare::share(value, self.num_parties, &mut self.rng)
    }

    fn share_tensor<R: Ring>(&mut self, plain: ArrayD<R>) -> Vec<SecureTensor<R>> {
        SecureTensor::share(plain.view(), self.num_parties, &mut self.rng)
    }
}
