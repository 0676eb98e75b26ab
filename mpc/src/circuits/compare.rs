use crate::{
    error::{MpcError, Result},
    executor::MpcExecutor,
    rings::Ring,
    tensor::SecureTensor,
    MpcContext, MpcDealer, MpcEngine,
};

use super::bitwise_less_than;

/// Sharing of [x >= 0] for every element, as ring 0 or 1.
/// Values must satisfy |x| < 2^(SAFE_BITS-1).
/// Cost: 1 comparison mask and 2·(SAFE_BITS-2) Beaver triples per element,
/// 1 + ceil(log_2(SAFE_BITS-1)) communication rounds.
pub async fn greater_eq_zero<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    let party_id = ctx.party_id();
    let shape = x.shape().to_vec();
    let count = x.len();
    let low_len = E::Ring::SAFE_BITS - 1;
    let masks = ctx.dealer().next_comparison_masks(count)?;
    if let Some(mask) = masks.iter().find(|m| m.low_bits.len() != low_len as usize) {
        return Err(MpcError::InvalidConfig(format!(
            "comparison mask has {} bits, expected {}",
            mask.low_bits.len(),
            low_len
        )));
    }

    // Mask r = high·2^m + low, with bits of low shared individually.
    let high = SecureTensor::from_flat(&[count], masks.iter().map(|m| m.high.raw()).collect())?;
    let low_bits = (0..low_len as usize)
        .map(|i| {
            SecureTensor::from_flat(&[count], masks.iter().map(|m| m.low_bits[i].raw()).collect())
        })
        .collect::<Result<Vec<_>>>()?;
    let mut mask = high.scale(E::Ring::power_of_two(low_len));
    for (i, bits) in low_bits.iter().enumerate() {
        mask = mask.add(&bits.scale(E::Ring::power_of_two(i as u32)))?;
    }

    // Open z = x + 2^m + r. Bit m of x + 2^m is [x >= 0].
    let flat = x.clone().reshape(&[count])?;
    let masked = flat
        .add(&mask)?
        .add_public_scalar(party_id, E::Ring::power_of_two(low_len));
    let opened = ctx.open(&masked).await?;

    // z >> m = [x >= 0] + high + [(z mod 2^m) < low].
    let low_opened: Vec<_> = opened.iter().map(|z| z.low_bits(low_len)).collect();
    let carry = bitwise_less_than(ctx, &low_opened, &low_bits).await?;
    let high_opened = opened.mapv(|z| z.shift_right(low_len));
    SecureTensor::public(party_id, high_opened.view())
        .sub(&high)?
        .sub(&carry)?
        .reshape(&shape)
}

/// Sharing of [x < 0] for every element.
pub async fn less_than_zero<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    let is_non_negative = greater_eq_zero(ctx, x).await?;
    Ok(not(ctx, &is_non_negative))
}

/// Sharing of [x < y] for every element.
pub async fn less_than<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    y: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    less_than_zero(ctx, &x.sub(y)?).await
}

/// Sharing of sign(x) in {-1, 1}. Zero counts as positive.
pub async fn sign<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    let is_non_negative = greater_eq_zero(ctx, x).await?;
    Ok(is_non_negative
        .scale(E::Ring::from_u64(2))
        .add_public_scalar(ctx.party_id(), -E::Ring::one()))
}

/// Negation of shared bits: 1 - b.
pub fn not<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    bits: &SecureTensor<E::Ring>,
) -> SecureTensor<E::Ring> {
    bits.neg().add_public_scalar(ctx.party_id(), E::Ring::one())
}
