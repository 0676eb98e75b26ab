use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{MaterialKind, MpcError, Result},
    rings::Ring,
    MpcContext, MpcDealer,
};

use super::{BeaverTriple, ComparisonMask, MatrixTriple, TruncationPair};

/// Precomputed material of a single party.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PrecomputedMaterial<R> {
    pub num_parties: usize,
    pub party_id: usize,
    pub precision: u32,
    pub beaver_triples: VecDeque<BeaverTriple<R>>,
    pub matrix_triples: VecDeque<MatrixTriple<R>>,
    pub truncation_pairs: VecDeque<TruncationPair<R>>,
    pub comparison_masks: VecDeque<ComparisonMask<R>>,
}

impl<R> PrecomputedMaterial<R> {
    /// Empty material for given party.
    pub fn empty(num_parties: usize, party_id: usize, precision: u32) -> Self {
        Self {
            num_parties,
            party_id,
            precision,
            beaver_triples: VecDeque::new(),
            matrix_triples: VecDeque::new(),
            truncation_pairs: VecDeque::new(),
            comparison_masks: VecDeque::new(),
        }
    }
}

impl<R> PrecomputedMaterial<R>
where
    R: Serialize + DeserializeOwned,
{
    /// Load precomputed material from file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Save precomputed material to file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(bincode::serialize_into(writer, self)?)
    }
}

/// Remaining units of each kind of material.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemainingMaterial {
    pub beaver_triples: usize,
    pub matrix_triples: usize,
    pub truncation_pairs: usize,
    pub comparison_masks: usize,
}

/// Dealer that serves precomputed material. Every unit is removed from the pool when claimed.
pub struct PrecomputedDealer<R> {
    num_parties: usize,
    party_id: usize,
    precision: u32,
    pool: Mutex<PrecomputedMaterial<R>>,
}

impl<R: Ring> PrecomputedDealer<R> {
    /// Create new dealer given precomputed material.
    pub fn new(data: PrecomputedMaterial<R>) -> Self {
        Self {
            num_parties: data.num_parties,
            party_id: data.party_id,
            precision: data.precision,
            pool: Mutex::new(data),
        }
    }

    /// Create new dealer from file with precomputed material.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(PrecomputedMaterial::load_file(path)?))
    }

    /// Precision the truncation pairs were generated for.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn remaining(&self) -> RemainingMaterial {
        let pool = self.pool();
        RemainingMaterial {
            beaver_triples: pool.beaver_triples.len(),
            matrix_triples: pool.matrix_triples.len(),
            truncation_pairs: pool.truncation_pairs.len(),
            comparison_masks: pool.comparison_masks.len(),
        }
    }

    fn pool(&self) -> MutexGuard<'_, PrecomputedMaterial<R>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Claim `count` units from the front of the queue, or nothing if there are too few.
fn claim<T>(queue: &mut VecDeque<T>, kind: MaterialKind, count: usize) -> Result<Vec<T>> {
    if queue.len() < count {
        return Err(MpcError::InsufficientPrecompute {
            kind,
            requested: count,
            available: queue.len(),
        });
    }
    debug!(?kind, count, left = queue.len() - count, "Claimed precomputed material");
    Ok(queue.drain(..count).collect())
}

impl<R: Ring> MpcContext for PrecomputedDealer<R> {
    type Ring = R;

    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

impl<R: Ring> MpcDealer for PrecomputedDealer<R> {
    fn next_beaver_triples(&self, count: usize) -> Result<Vec<BeaverTriple<R>>> {
        claim(&mut self.pool().beaver_triples, MaterialKind::BeaverTriple, count)
    }

    fn next_matrix_triple(&self, dims: [usize; 3]) -> Result<MatrixTriple<R>> {
        let mut pool = self.pool();
        let available = pool.matrix_triples.len();
        pool.matrix_triples
            .iter()
            .position(|triple| triple.dims() == dims)
            .and_then(|index| pool.matrix_triples.remove(index))
            .ok_or(MpcError::InsufficientPrecompute {
                kind: MaterialKind::MatrixTriple,
                requested: 1,
                available,
            })
    }

    fn next_truncation_pairs(&self, count: usize, precision: u32) -> Result<Vec<TruncationPair<R>>> {
        if precision != self.precision {
            return Err(MpcError::InvalidConfig(format!(
                "truncation pairs were generated for precision {}, requested {}",
                self.precision, precision
            )));
        }
        claim(&mut self.pool().truncation_pairs, MaterialKind::TruncationPair, count)
    }

    fn next_comparison_masks(&self, count: usize) -> Result<Vec<ComparisonMask<R>>> {
        claim(&mut self.pool().comparison_masks, MaterialKind::ComparisonMask, count)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::{
        dealer::{CryptoProvider, MaterialPlan},
        rings::Z64,
    };

    fn dealers(plan: &MaterialPlan) -> Vec<PrecomputedDealer<Z64>> {
        CryptoProvider::new(2, SmallRng::seed_from_u64(5))
            .generate::<Z64>(plan, 12)
            .into_iter()
            .map(PrecomputedDealer::new)
            .collect()
    }

    #[test]
    fn test_units_are_claimed_once() {
        let mut plan = MaterialPlan::new();
        plan.mul(5);
        let dealers = dealers(&plan);
        let dealer = &dealers[0];
        let first = dealer.next_beaver_triples(3).unwrap();
        let second = dealer.next_beaver_triples(2).unwrap();
        assert!(first.iter().all(|t| !second.contains(t)));
        assert!(matches!(
            dealer.next_beaver_triples(1),
            Err(MpcError::InsufficientPrecompute {
                kind: MaterialKind::BeaverTriple,
                requested: 1,
                available: 0
            })
        ));
    }

    #[test]
    fn test_failed_claim_keeps_pool() {
        let mut plan = MaterialPlan::new();
        plan.compare::<Z64>(2);
        let dealers = dealers(&plan);
        let dealer = &dealers[1];
        assert!(dealer.next_comparison_masks(3).is_err());
        assert_eq!(dealer.remaining().comparison_masks, 2);
        assert_eq!(dealer.next_comparison_masks(2).unwrap().len(), 2);
    }

    #[test]
    fn test_matrix_triples_by_shape() {
        let mut plan = MaterialPlan::new();
        plan.matmul([2, 3, 4]).matmul([4, 1, 2]);
        let dealers = dealers(&plan);
        let dealer = &dealers[0];
        assert_eq!(dealer.next_matrix_triple([4, 1, 2]).unwrap().dims(), [4, 1, 2]);
        assert!(dealer.next_matrix_triple([4, 1, 2]).is_err());
        assert_eq!(dealer.next_matrix_triple([2, 3, 4]).unwrap().dims(), [2, 3, 4]);
    }

    #[test]
    fn test_precision_is_checked() {
        let mut plan = MaterialPlan::new();
        plan.truncate(1);
        let dealers = dealers(&plan);
        let dealer = &dealers[0];
        assert!(matches!(
            dealer.next_truncation_pairs(1, 16),
            Err(MpcError::InvalidConfig(_))
        ));
        assert!(dealer.next_truncation_pairs(1, 12).is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let mut plan = MaterialPlan::new();
        plan.mul(3).matmul([1, 2, 1]).truncate(2).compare::<Z64>(1);
        let data = CryptoProvider::new(2, SmallRng::seed_from_u64(5)).generate::<Z64>(&plan, 8);
        let path = std::env::temp_dir().join(format!("precomp-{}.bin", std::process::id()));
        data[1].save_file(&path).unwrap();
        let loaded = PrecomputedDealer::<Z64>::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.party_id(), 1);
        assert_eq!(loaded.precision(), 8);
        assert_eq!(loaded.remaining().beaver_triples, data[1].beaver_triples.len());
        assert_eq!(loaded.remaining().matrix_triples, 1);
    }
}
