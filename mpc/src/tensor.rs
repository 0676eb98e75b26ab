use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MpcError, Result},
    rings::Ring,
    share::AdditiveShare,
};

/// Local view of a tensor whose elements are additively shared among all parties.
/// Shape is public and identical on every party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureTensor<R> {
    shares: ArrayD<AdditiveShare<R>>,
}

impl<R: Ring> SecureTensor<R> {
    pub fn wrap(shares: ArrayD<AdditiveShare<R>>) -> Self {
        Self { shares }
    }

    /// Wrap raw share values of current party.
    pub fn from_raw(raw: ArrayD<R>) -> Self {
        Self::wrap(raw.mapv(AdditiveShare::wrap))
    }

    /// Build tensor from flat raw share values in row-major order.
    pub fn from_flat(shape: &[usize], raw: Vec<R>) -> Result<Self> {
        let len = raw.len();
        ArrayD::from_shape_vec(IxDyn(shape), raw)
            .map(Self::from_raw)
            .map_err(|_| MpcError::shape_mismatch("from_flat", shape, &[len]))
    }

    /// Sharing of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::wrap(ArrayD::from_elem(IxDyn(shape), AdditiveShare::zero()))
    }

    /// Sharing of public tensor: party 0 holds the values, others hold zeros.
    pub fn public(party_id: usize, values: ArrayViewD<R>) -> Self {
        Self::wrap(values.mapv(|x| AdditiveShare::public(party_id, x)))
    }

    /// Split plaintext tensor into one tensor of fresh shares per party.
    pub fn share<G: Rng + ?Sized>(
        plain: ArrayViewD<R>,
        num_parties: usize,
        rng: &mut G,
    ) -> Vec<Self> {
        let mut parts: Vec<Vec<R>> = (0..num_parties)
            .map(|_| Vec::with_capacity(plain.len()))
            .collect();
        for &x in plain.iter() {
            for (part, share) in parts
                .iter_mut()
                .zip(AdditiveShare::share(x, num_parties, rng))
            {
                part.push(share.raw());
            }
        }
        parts
            .into_iter()
            .map(|raw| {
                Self::from_raw(
                    ArrayD::from_shape_vec(plain.raw_dim(), raw)
                        .expect("Share count matches tensor length"),
                )
            })
            .collect()
    }

    /// Reconstruct plaintext from tensors held by every party.
    pub fn reveal(parts: &[Self], num_parties: usize) -> Result<ArrayD<R>> {
        let (first, rest) = match parts.split_first() {
            Some(split) if parts.len() >= num_parties => split,
            _ => {
                return Err(MpcError::IncompleteShareSet {
                    expected: num_parties.max(1),
                    actual: parts.len(),
                })
            }
        };
        let mut sum = first.raw();
        for part in rest {
            if part.shape() != sum.shape() {
                return Err(MpcError::shape_mismatch("reveal", sum.shape(), part.shape()));
            }
            Zip::from(&mut sum)
                .and(&part.shares)
                .for_each(|acc, share| *acc += share.raw());
        }
        Ok(sum)
    }

    pub fn shape(&self) -> &[usize] {
        self.shares.shape()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn shares(&self) -> &ArrayD<AdditiveShare<R>> {
        &self.shares
    }

    /// Raw share values of current party.
    pub fn raw(&self) -> ArrayD<R> {
        self.shares.mapv(AdditiveShare::raw)
    }

    /// Raw share values in row-major order.
    pub fn to_flat(&self) -> Vec<R> {
        self.shares.iter().map(|x| x.raw()).collect()
    }

    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        let from = self.shape().to_vec();
        self.shares
            .into_shape(IxDyn(shape))
            .map(Self::wrap)
            .map_err(|_| MpcError::shape_mismatch("reshape", &from, shape))
    }

    /// Sub-tensor at given index along axis.
    pub fn index_axis(&self, axis: usize, index: usize) -> Self {
        Self::wrap(self.shares.index_axis(Axis(axis), index).to_owned())
    }

    /// Stack tensors of equal shape along a new axis.
    pub fn stack(axis: usize, parts: &[Self]) -> Result<Self> {
        let views: Vec<_> = parts.iter().map(|x| x.shares.view()).collect();
        ndarray::stack(Axis(axis), &views).map(Self::wrap).map_err(|_| {
            MpcError::shape_mismatch(
                "stack",
                parts.first().map(|x| x.shape()).unwrap_or(&[]),
                parts.last().map(|x| x.shape()).unwrap_or(&[]),
            )
        })
    }

    /// Local addition of shares, no communication.
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.zip_with("add", rhs, |x, y| x + y)
    }

    /// Local subtraction of shares, no communication.
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.zip_with("sub", rhs, |x, y| x - y)
    }

    pub fn neg(&self) -> Self {
        Self::wrap(self.shares.mapv(|x| -x))
    }

    /// Add shared tensor broadcast to shape of self, e.g. bias row to every sample.
    pub fn add_broadcast(&self, rhs: &Self) -> Result<Self> {
        let rhs_view = rhs
            .shares
            .broadcast(self.shares.raw_dim())
            .ok_or_else(|| MpcError::shape_mismatch("add_broadcast", self.shape(), rhs.shape()))?;
        Ok(Self::wrap(
            Zip::from(&self.shares)
                .and(&rhs_view)
                .map_collect(|&x, &y| x + y),
        ))
    }

    /// Add public tensor of the same shape.
    pub fn add_public(&self, party_id: usize, values: ArrayViewD<R>) -> Result<Self> {
        if self.shape() != values.shape() {
            return Err(MpcError::shape_mismatch("add_public", self.shape(), values.shape()));
        }
        Ok(Self::wrap(
            Zip::from(&self.shares)
                .and(&values)
                .map_collect(|&x, &y| x.add_public(party_id, y)),
        ))
    }

    /// Add the same public constant to every element.
    pub fn add_public_scalar(&self, party_id: usize, value: R) -> Self {
        Self::wrap(self.shares.mapv(|x| x.add_public(party_id, value)))
    }

    /// Elementwise product with public tensor of the same shape.
    pub fn mul_public(&self, values: ArrayViewD<R>) -> Result<Self> {
        if self.shape() != values.shape() {
            return Err(MpcError::shape_mismatch("mul_public", self.shape(), values.shape()));
        }
        Ok(Self::wrap(
            Zip::from(&self.shares)
                .and(&values)
                .map_collect(|&x, &y| x * y),
        ))
    }

    /// Multiply every element by public scalar.
    pub fn scale(&self, value: R) -> Self {
        Self::wrap(self.shares.mapv(|x| x * value))
    }

    fn zip_with<F>(&self, op: &'static str, rhs: &Self, f: F) -> Result<Self>
    where
        F: Fn(AdditiveShare<R>, AdditiveShare<R>) -> AdditiveShare<R>,
    {
        if self.shape() != rhs.shape() {
            return Err(MpcError::shape_mismatch(op, self.shape(), rhs.shape()));
        }
        Ok(Self::wrap(
            Zip::from(&self.shares)
                .and(&rhs.shares)
                .map_collect(|&x, &y| f(x, y)),
        ))
    }
}
