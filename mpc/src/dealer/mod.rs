mod fake;
pub use fake::FakeDealer;

mod plan;
pub use plan::MaterialPlan;

mod precomputed;
pub use precomputed::{PrecomputedDealer, PrecomputedMaterial, RemainingMaterial};

mod provider;
pub use provider::CryptoProvider;

use serde::{Deserialize, Serialize};

use crate::{share::AdditiveShare, tensor::SecureTensor};

/// Share of a random triple (a, b, c) with c = a * b.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaverTriple<R> {
    pub a: AdditiveShare<R>,
    pub b: AdditiveShare<R>,
    pub c: AdditiveShare<R>,
}

/// Share of random matrices A (m×k), B (k×n) and C = A·B.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixTriple<R> {
    pub a: SecureTensor<R>,
    pub b: SecureTensor<R>,
    pub c: SecureTensor<R>,
}

impl<R: crate::rings::Ring> MatrixTriple<R> {
    /// Dimensions [m, k, n].
    pub fn dims(&self) -> [usize; 3] {
        let a = self.a.shape();
        let b = self.b.shape();
        [a[0], a[1], b[1]]
    }
}

/// Share of random r in [0; 2^(BITS-1)) together with share of r >> precision.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationPair<R> {
    pub mask: AdditiveShare<R>,
    pub mask_shifted: AdditiveShare<R>,
}

/// Share of random r = high * 2^m + low with m = SAFE_BITS-1.
/// Bits of `low` are shared individually, least significant first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonMask<R> {
    pub high: AdditiveShare<R>,
    pub low_bits: Vec<AdditiveShare<R>>,
}
