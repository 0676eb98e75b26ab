use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MpcError, Result},
    rings::Ring,
};

/// One party's additive share of a ring element: x = sum of all shares.
/// Supports linear operations without communication.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditiveShare<R>(R);

impl<R: Ring> AdditiveShare<R> {
    /// Wrap raw share value received from transport or dealer.
    pub fn wrap(raw: R) -> Self {
        Self(raw)
    }

    /// Unwrapped share value. Only transport and reveal should look at it.
    pub fn raw(self) -> R {
        self.0
    }

    /// Sharing of zero.
    pub fn zero() -> Self {
        Self(R::zero())
    }

    /// Share of a public constant: party 0 holds the value, others hold zero.
    pub fn public(party_id: usize, value: R) -> Self {
        if party_id == 0 {
            Self(value)
        } else {
            Self::zero()
        }
    }

    /// Add public constant. Only party 0 modifies its share.
    pub fn add_public(self, party_id: usize, value: R) -> Self {
        self + Self::public(party_id, value)
    }

    /// Split secret into `num_parties` shares. First n-1 shares are uniformly random.
    pub fn share<G: Rng + ?Sized>(secret: R, num_parties: usize, rng: &mut G) -> Vec<Self> {
        assert!(num_parties > 0, "Cannot share among zero parties");
        let mut shares: Vec<_> = (1..num_parties).map(|_| Self(R::random(rng))).collect();
        let sum = shares.iter().fold(R::zero(), |acc, x| acc + x.0);
        shares.push(Self(secret - sum));
        shares
    }

    /// Reconstruct secret from all shares.
    pub fn reveal(shares: &[Self], num_parties: usize) -> Result<R> {
        if shares.len() < num_parties {
            return Err(MpcError::IncompleteShareSet {
                expected: num_parties,
                actual: shares.len(),
            });
        }
        Ok(shares.iter().fold(R::zero(), |acc, x| acc + x.0))
    }
}

impl<R: Ring> Add for AdditiveShare<R> {
    type Output = AdditiveShare<R>;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl<R: Ring> Sub for AdditiveShare<R> {
    type Output = AdditiveShare<R>;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl<R: Ring> Neg for AdditiveShare<R> {
    type Output = AdditiveShare<R>;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl<R: Ring> Mul<R> for AdditiveShare<R> {
    type Output = AdditiveShare<R>;
    fn mul(self, rhs: R) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl<R: Ring> AddAssign for AdditiveShare<R> {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl<R: Ring> SubAssign for AdditiveShare<R> {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::rings::{Z128, Z64};

    #[test]
    fn test_share_and_reveal() {
        let mut rng = SmallRng::seed_from_u64(7);
        for num_parties in 2..6 {
            for secret in [0, 1, -1, 1337, i64::MAX, i64::MIN] {
                let secret = Z64::from_i64(secret);
                let shares = AdditiveShare::share(secret, num_parties, &mut rng);
                assert_eq!(shares.len(), num_parties);
                assert_eq!(AdditiveShare::reveal(&shares, num_parties).unwrap(), secret);
            }
        }
    }

    #[test]
    fn test_reveal_requires_all_shares() {
        let mut rng = SmallRng::seed_from_u64(7);
        let shares = AdditiveShare::share(Z128(42), 3, &mut rng);
        assert!(matches!(
            AdditiveShare::reveal(&shares[..2], 3),
            Err(MpcError::IncompleteShareSet {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_local_operations() {
        let mut rng = SmallRng::seed_from_u64(1);
        let xs = AdditiveShare::share(Z64(100), 2, &mut rng);
        let ys = AdditiveShare::share(Z64::from_i64(-30), 2, &mut rng);

        let sums: Vec<_> = xs.iter().zip(&ys).map(|(&x, &y)| x + y).collect();
        assert_eq!(AdditiveShare::reveal(&sums, 2).unwrap(), Z64(70));

        let diffs: Vec<_> = xs.iter().zip(&ys).map(|(&x, &y)| x - y).collect();
        assert_eq!(AdditiveShare::reveal(&diffs, 2).unwrap(), Z64(130));

        let shifted: Vec<_> = xs
            .iter()
            .enumerate()
            .map(|(id, &x)| (x * Z64(3)).add_public(id, Z64(5)))
            .collect();
        assert_eq!(AdditiveShare::reveal(&shifted, 2).unwrap(), Z64(305));
    }

    #[test]
    fn test_single_share_is_uniform() {
        // Low byte of the first share should be spread evenly regardless of the secret.
        let mut rng = SmallRng::seed_from_u64(99);
        let samples = 64_000;
        for secret in [Z64(0), Z64(u64::MAX), Z64(1 << 40)] {
            let mut buckets = [0usize; 16];
            for _ in 0..samples {
                let share = AdditiveShare::share(secret, 2, &mut rng)[0];
                buckets[(share.raw().0 & 0xf) as usize] += 1;
            }
            let expected = samples / 16;
            for count in buckets {
                assert!(count.abs_diff(expected) < expected / 10, "{buckets:?}");
            }
        }
    }
}
