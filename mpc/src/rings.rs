use std::{
    fmt::Debug,
    hash::Hash,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use ndarray::{Array2, ArrayView2, Zip};
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Ring of integers modulo 2^BITS. All arithmetic wraps around.
pub trait Ring:
    'static
    + Copy
    + Clone
    + Debug
    + Default
    + PartialEq
    + Eq
    + Hash
    + Send
    + Sync
    + Unpin
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + SubAssign
    + Serialize
    + DeserializeOwned
{
    /// Bit width of the ring.
    const BITS: u32;

    /// Values passed to truncation and comparison must satisfy |x| < 2^(SAFE_BITS-1).
    /// Masked openings hide such values statistically with BITS-1-SAFE_BITS bits.
    const SAFE_BITS: u32;

    fn zero() -> Self;

    fn one() -> Self;

    fn from_u64(value: u64) -> Self;

    /// Embed signed integer, negative values wrap to the top of the ring.
    fn from_i128(value: i128) -> Self;

    /// Interpret element as two's complement signed integer.
    fn to_i128(self) -> i128;

    /// 2^k, or zero if k >= BITS.
    fn power_of_two(k: u32) -> Self;

    /// Logical shift to the right.
    fn shift_right(self, k: u32) -> Self;

    /// Remainder modulo 2^k.
    fn low_bits(self, k: u32) -> Self;

    /// Uniformly random element.
    fn random<G: Rng + ?Sized>(rng: &mut G) -> Self;

    fn from_i64(value: i64) -> Self {
        Self::from_i128(value as i128)
    }

    fn from_bool(value: bool) -> Self {
        if value {
            Self::one()
        } else {
            Self::zero()
        }
    }

    fn bit(self, i: u32) -> bool {
        self.shift_right(i).low_bits(1) == Self::one()
    }

    fn double(self) -> Self {
        self + self
    }

    /// Uniformly random element in range [0; 2^k).
    fn random_below_power_of_two<G: Rng + ?Sized>(rng: &mut G, k: u32) -> Self {
        Self::random(rng).low_bits(k)
    }
}

macro_rules! ring_type {
    ($(#[$meta:meta])* $name:ident, $uint:ty, $int:ty, $safe_bits:expr) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $uint);

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: Self) -> Self::Output {
                $name(self.0.wrapping_add(rhs.0))
            }
        }

        impl Sub for $name {
            type Output = $name;
            fn sub(self, rhs: Self) -> Self::Output {
                $name(self.0.wrapping_sub(rhs.0))
            }
        }

        impl Neg for $name {
            type Output = $name;
            fn neg(self) -> Self::Output {
                $name(self.0.wrapping_neg())
            }
        }

        impl Mul for $name {
            type Output = $name;
            fn mul(self, rhs: Self) -> Self::Output {
                $name(self.0.wrapping_mul(rhs.0))
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value as $uint)
            }
        }

        impl Ring for $name {
            const BITS: u32 = <$uint>::BITS;
            const SAFE_BITS: u32 = $safe_bits;

            fn zero() -> Self {
                $name(0)
            }

            fn one() -> Self {
                $name(1)
            }

            fn from_u64(value: u64) -> Self {
                $name(value as $uint)
            }

            fn from_i128(value: i128) -> Self {
                $name(value as $uint)
            }

            fn to_i128(self) -> i128 {
                self.0 as $int as i128
            }

            fn power_of_two(k: u32) -> Self {
                $name((1 as $uint).checked_shl(k).unwrap_or(0))
            }

            fn shift_right(self, k: u32) -> Self {
                $name(self.0.checked_shr(k).unwrap_or(0))
            }

            fn low_bits(self, k: u32) -> Self {
                if k >= Self::BITS {
                    self
                } else {
                    $name(self.0 & (((1 as $uint) << k) - 1))
                }
            }

            fn random<G: Rng + ?Sized>(rng: &mut G) -> Self {
                $name(rng.gen())
            }
        }
    };
}

ring_type!(
    /// Integers modulo 2^64.
    Z64,
    u64,
    i64,
    48
);

ring_type!(
    /// Integers modulo 2^128.
    Z128,
    u128,
    i128,
    96
);

/// Plaintext matrix product over the ring. Inner dimensions must agree.
pub fn matmul<R: Ring>(a: ArrayView2<R>, b: ArrayView2<R>) -> Array2<R> {
    let (m, k) = a.dim();
    let (inner, n) = b.dim();
    assert_eq!(k, inner, "Inner matrix dimensions differ");

    let mut out = Array2::from_elem((m, n), R::zero());
    for (a_row, mut out_row) in a.outer_iter().zip(out.outer_iter_mut()) {
        for (&coef, b_row) in a_row.iter().zip(b.outer_iter()) {
            if coef == R::zero() {
                continue;
            }
            Zip::from(&mut out_row)
                .and(&b_row)
                .for_each(|acc, &x| *acc += coef * x);
        }
    }
    out
}
