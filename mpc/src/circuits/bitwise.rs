use crate::{
    error::{MpcError, Result},
    executor::MpcExecutor,
    rings::Ring,
    tensor::SecureTensor,
    try_join_circuits, MpcContext, MpcEngine,
};

use super::{mul, try_fold_tree};

/// Pair of shared bits ([lhs < rhs], [lhs == rhs]) for a range of bit positions.
struct Comparison<R> {
    less: SecureTensor<R>,
    equal: SecureTensor<R>,
}

/// Compare public unsigned integers with hidden integers, given sharings of their individual bits.
/// `lhs` holds one integer per element; `rhs_bits[i]` holds bit i of every hidden integer,
/// least significant first. Returns sharing of [lhs < rhs] for every element.
/// Cost: 2 multiplications per bit, ceil(log_2(bits)) communication rounds.
pub async fn bitwise_less_than<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    lhs: &[E::Ring],
    rhs_bits: &[SecureTensor<E::Ring>],
) -> Result<SecureTensor<E::Ring>> {
    let party_id = ctx.party_id();
    let shape = [lhs.len()];

    // 1. Compare individual bits:
    //    [l < r] = (1 - l)·r,
    //    [l == r] = (1 - l) + (2l - 1)·r.
    let base_cases = rhs_bits
        .iter()
        .enumerate()
        .map(|(i, bits)| {
            let lhs_bits: Vec<bool> = lhs.iter().map(|x| x.bit(i as u32)).collect();
            let not_lhs = public_flat(&lhs_bits, |bit| E::Ring::from_bool(!bit));
            let signs = public_flat(&lhs_bits, |bit| {
                if bit {
                    E::Ring::one()
                } else {
                    -E::Ring::one()
                }
            });
            Ok(Comparison {
                less: bits.mul_public(not_lhs.view())?,
                equal: bits.mul_public(signs.view())?.add_public(party_id, not_lhs.view())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // 2. Fold from least to most significant bits. Higher bits decide unless they are equal:
    //    less = less_high + equal_high·less_low,
    //    equal = equal_high·equal_low.
    let empty = Comparison {
        less: SecureTensor::zeros(&shape),
        equal: SecureTensor::zeros(&shape).add_public_scalar(party_id, E::Ring::one()),
    };
    let result = try_fold_tree(base_cases, empty, |low, high| async move {
        let (less, equal) = try_join_circuits!(
            mul(ctx, &high.equal, &low.less),
            mul(ctx, &high.equal, &low.equal)
        )?;
        Ok::<_, MpcError>(Comparison {
            less: high.less.add(&less)?,
            equal,
        })
    })
    .await?;

    Ok(result.less)
}

fn public_flat<R: Ring>(bits: &[bool], f: impl Fn(bool) -> R) -> ndarray::ArrayD<R> {
    ndarray::Array1::from_iter(bits.iter().map(|&bit| f(bit))).into_dyn()
}

#[cfg(test)]
mod tests {
    use crate::{
        circuits::{testing::*, *},
        rings::{Ring, Z64},
        tensor::SecureTensor,
        MpcContext,
    };

    #[tokio::test]
    async fn test_bitwise_less_than() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let cases = [(100, 100), (100, 101), (101, 100), (100, 200), (200, 100), (0, 255)];
                let lhs: Vec<_> = cases.iter().map(|&(l, _)| Z64(l)).collect();
                let rhs_bits: Vec<_> = (0..8)
                    .map(|i| {
                        let bits = ndarray::Array1::from_iter(
                            cases.iter().map(|&(_, r)| Z64((r >> i) & 1)),
                        );
                        SecureTensor::public(ctx.party_id(), bits.into_dyn().view())
                    })
                    .collect();

                let result = bitwise_less_than(ctx, &lhs, &rhs_bits).await?;
                let opened = ctx.open(&result).await?;
                for (&(l, r), &bit) in cases.iter().zip(opened.iter()) {
                    assert_eq!(bit, Z64::from_bool(l < r));
                }
                Ok(())
            })
        })
        .await;
    }
}
