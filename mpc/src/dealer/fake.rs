use std::sync::{Mutex, PoisonError};

use rand::{rngs::SmallRng, SeedableRng};

use crate::{error::Result, rings::Ring, MpcContext, MpcDealer};

use super::{BeaverTriple, ComparisonMask, CryptoProvider, MatrixTriple, TruncationPair};

/// Insecure dealer for tests. Every party runs the same seeded provider
/// and keeps its own share, so material is consistent without an extra process.
pub struct FakeDealer<R> {
    party_id: usize,
    provider: Mutex<CryptoProvider<SmallRng>>,
    _ring: std::marker::PhantomData<R>,
}

impl<R: Ring> FakeDealer<R> {
    /// Create new instance. All parties must use the same seed.
    pub fn new(num_parties: usize, party_id: usize, seed: u64) -> Self {
        assert!(party_id < num_parties, "Party ID out of range");
        Self {
            party_id,
            provider: Mutex::new(CryptoProvider::new(
                num_parties,
                SmallRng::seed_from_u64(seed),
            )),
            _ring: std::marker::PhantomData,
        }
    }

    fn generate<T>(&self, f: impl FnOnce(&mut CryptoProvider<SmallRng>) -> Vec<T>) -> T {
        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut provider).swap_remove(self.party_id)
    }
}

impl<R: Ring> MpcContext for FakeDealer<R> {
    type Ring = R;

    fn num_parties(&self) -> usize {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .num_parties()
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

impl<R: Ring> MpcDealer for FakeDealer<R> {
    fn next_beaver_triples(&self, count: usize) -> Result<Vec<BeaverTriple<R>>> {
        Ok(self.generate(|p| p.generate_mul_triples(&[count])))
    }

    fn next_matrix_triple(&self, dims: [usize; 3]) -> Result<MatrixTriple<R>> {
        Ok(self.generate(|p| p.generate_matrix_triple(dims)))
    }

    fn next_truncation_pairs(&self, count: usize, precision: u32) -> Result<Vec<TruncationPair<R>>> {
        Ok(self.generate(|p| p.generate_truncation_material(&[count], precision)))
    }

    fn next_comparison_masks(&self, count: usize) -> Result<Vec<ComparisonMask<R>>> {
        Ok(self.generate(|p| p.generate_comparison_material(&[count])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rings::Z64, share::AdditiveShare};

    #[test]
    fn test_parties_get_consistent_triples() {
        let dealers: Vec<_> = (0..3).map(|id| FakeDealer::<Z64>::new(3, id, 42)).collect();
        let triples: Vec<_> = dealers
            .iter()
            .map(|d| d.next_beaver_triples(4).unwrap())
            .collect();
        for i in 0..4 {
            let open = |f: fn(&BeaverTriple<Z64>) -> AdditiveShare<Z64>| {
                let shares: Vec<_> = triples.iter().map(|t| f(&t[i])).collect();
                AdditiveShare::reveal(&shares, 3).unwrap()
            };
            assert_eq!(open(|t| t.a) * open(|t| t.b), open(|t| t.c));
        }
    }
}
