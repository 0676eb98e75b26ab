use ndarray::{ArrayView2, ArrayViewD, Ix2, Zip};

use crate::{
    error::{MpcError, Result},
    executor::MpcExecutor,
    rings::{self, Ring},
    tensor::SecureTensor,
    try_join_circuits, MpcContext, MpcDealer, MpcEngine,
};

/// Multiply two shared tensors elementwise.
/// Cost: 1 Beaver triple per element, 2 partial openings, 1 communication round.
pub async fn mul<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    y: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    if x.shape() != y.shape() {
        return Err(MpcError::shape_mismatch("mul", x.shape(), y.shape()));
    }
    let shape = x.shape();
    let triples = ctx.dealer().next_beaver_triples(x.len())?;
    let a = SecureTensor::from_flat(shape, triples.iter().map(|t| t.a.raw()).collect())?;
    let b = SecureTensor::from_flat(shape, triples.iter().map(|t| t.b.raw()).collect())?;
    let c = SecureTensor::from_flat(shape, triples.iter().map(|t| t.c.raw()).collect())?;

    let masked_x = x.sub(&a)?;
    let masked_y = y.sub(&b)?;
    let (d, e) = try_join_circuits!(ctx.open(&masked_x), ctx.open(&masked_y))?;

    let de = Zip::from(&d).and(&e).map_collect(|&d, &e| d * e);
    c.add(&b.mul_public(d.view())?)?
        .add(&a.mul_public(e.view())?)?
        .add_public(ctx.party_id(), de.view())
}

/// Product of shared m×k and k×n matrices, without rescaling.
/// Cost: 1 matrix triple, m·k + k·n partial openings, 1 communication round.
pub async fn matmul<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    y: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    if x.shape().len() != 2 || y.shape().len() != 2 || x.shape()[1] != y.shape()[0] {
        return Err(MpcError::shape_mismatch("matmul", x.shape(), y.shape()));
    }
    let dims = [x.shape()[0], x.shape()[1], y.shape()[1]];
    let triple = ctx.dealer().next_matrix_triple(dims)?;

    let masked_x = x.sub(&triple.a)?;
    let masked_y = y.sub(&triple.b)?;
    let (e, f) = try_join_circuits!(ctx.open(&masked_x), ctx.open(&masked_y))?;

    // Z = C + E·B + A·F + E·F, where E·F is public.
    let a = triple.a.raw();
    let b = triple.b.raw();
    let mut z = as_matrix(triple.c.raw().view())?.to_owned();
    z += &rings::matmul(as_matrix(e.view())?, as_matrix(b.view())?);
    z += &rings::matmul(as_matrix(a.view())?, as_matrix(f.view())?);
    if ctx.party_id() == 0 {
        z += &rings::matmul(as_matrix(e.view())?, as_matrix(f.view())?);
    }
    Ok(SecureTensor::from_raw(z.into_dyn()))
}

/// Divide fixed-point values by 2^precision, rounding down with error at most 1.
/// Values must satisfy |x| < 2^(SAFE_BITS-1), which for the output of `mul` or `matmul`
/// means every accumulated product below `FixedPointCodec::max_magnitude` in real terms.
/// Larger values wrap silently.
/// Cost: 1 truncation pair per element, 1 partial opening, 1 communication round.
pub async fn truncate<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    precision: u32,
) -> Result<SecureTensor<E::Ring>> {
    let party_id = ctx.party_id();
    let shape = x.shape();
    let offset_bits = E::Ring::SAFE_BITS - 1;
    let pairs = ctx
        .dealer()
        .next_truncation_pairs(x.len(), precision)?;
    let mask = SecureTensor::from_flat(shape, pairs.iter().map(|p| p.mask.raw()).collect())?;
    let mask_shifted =
        SecureTensor::from_flat(shape, pairs.iter().map(|p| p.mask_shifted.raw()).collect())?;

    // Shift x to be non-negative, so the opened sum never wraps around.
    let masked = x
        .add(&mask)?
        .add_public_scalar(party_id, E::Ring::power_of_two(offset_bits));
    let opened = ctx.open(&masked).await?;

    let shifted = opened.mapv(|z| z.shift_right(precision));
    Ok(SecureTensor::public(party_id, shifted.view())
        .sub(&mask_shifted)?
        .add_public_scalar(party_id, -E::Ring::power_of_two(offset_bits - precision)))
}

/// Fixed-point product of shared matrices: matmul followed by truncation.
/// Cost: 2 communication rounds.
pub async fn matmul_fixed<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    y: &SecureTensor<E::Ring>,
    precision: u32,
) -> Result<SecureTensor<E::Ring>> {
    let product = matmul(ctx, x, y).await?;
    truncate(ctx, &product, precision).await
}

/// Fixed-point elementwise product: mul followed by truncation.
/// Cost: 2 communication rounds.
pub async fn mul_fixed<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    y: &SecureTensor<E::Ring>,
    precision: u32,
) -> Result<SecureTensor<E::Ring>> {
    let product = mul(ctx, x, y).await?;
    truncate(ctx, &product, precision).await
}

fn as_matrix<R>(view: ArrayViewD<'_, R>) -> Result<ArrayView2<'_, R>> {
    let shape = view.shape().to_vec();
    view.into_dimensionality::<Ix2>()
        .map_err(|_| MpcError::shape_mismatch("matmul", &shape, &[0, 0]))
}
