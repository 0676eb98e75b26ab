use crate::{
    error::{MpcError, Result},
    executor::MpcExecutor,
    rings::Ring,
    tensor::SecureTensor,
    try_join_circuits, MpcContext, MpcEngine,
};

use super::{greater_eq_zero, mul, try_fold_tree};

/// Elementwise max(x, 0). Works for integers and fixed-point values alike.
/// Cost: 1 comparison and 1 multiplication per element.
pub async fn relu<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    let is_positive = greater_eq_zero(ctx, x).await?;
    mul(ctx, x, &is_positive).await
}

/// Shared position and value of the maximum of every row.
pub struct Argmax<R> {
    /// Column index of the maximum, as ring integer.
    pub index: SecureTensor<R>,
    pub value: SecureTensor<R>,
}

/// Position of the maximum along the last axis of a rows×classes matrix.
/// Ties resolve to the lower index.
/// Values must satisfy |x| < 2^(SAFE_BITS-2), so that differences of two values stay
/// within the bound of `greater_eq_zero`. Larger values give wrong results silently.
/// Cost: classes-1 comparisons and 2·(classes-1) multiplications per row,
/// ceil(log_2(classes)) tournament levels.
pub async fn argmax<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
) -> Result<Argmax<E::Ring>> {
    if x.shape().len() != 2 || x.shape()[1] == 0 {
        return Err(MpcError::shape_mismatch("argmax", x.shape(), &[x.len(), 1]));
    }
    let party_id = ctx.party_id();
    let rows = x.shape()[0];
    let classes = x.shape()[1];

    let candidates = (0..classes).map(|j| Argmax {
        index: SecureTensor::zeros(&[rows]).add_public_scalar(party_id, E::Ring::from_u64(j as u64)),
        value: x.index_axis(1, j),
    });
    let empty = Argmax {
        index: SecureTensor::zeros(&[rows]),
        value: SecureTensor::zeros(&[rows]),
    };

    // Each match keeps the first candidate unless the second one is strictly greater.
    try_fold_tree(candidates, empty, |first, second| async move {
        let value_diff = first.value.sub(&second.value)?;
        let index_diff = first.index.sub(&second.index)?;
        let keep_first = greater_eq_zero(ctx, &value_diff).await?;
        let (value, index) = try_join_circuits!(
            mul(ctx, &keep_first, &value_diff),
            mul(ctx, &keep_first, &index_diff)
        )?;
        Ok(Argmax {
            index: second.index.add(&index)?,
            value: second.value.add(&value)?,
        })
    })
    .await
}

/// Sharing of [x == y] for integer tensors.
/// Cost: 2 comparisons per element, no multiplications.
pub async fn equal<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    x: &SecureTensor<E::Ring>,
    y: &SecureTensor<E::Ring>,
) -> Result<SecureTensor<E::Ring>> {
    let diff = x.sub(y)?;
    let both = SecureTensor::stack(0, &[diff.clone(), diff.neg()])?;
    let signs = greater_eq_zero(ctx, &both).await?;
    // [d >= 0] + [-d >= 0] is 2 for d = 0 and 1 otherwise.
    Ok(signs
        .index_axis(0, 0)
        .add(&signs.index_axis(0, 1))?
        .add_public_scalar(ctx.party_id(), -E::Ring::one()))
}

#[cfg(test)]
mod tests {
    use ndarray::{array, ArrayD};

    use crate::{
        circuits::{testing::*, *},
        fixed_point::FixedPointCodec,
        rings::{Ring, Z64},
        try_join_circuits, MpcContext,
    };

    fn ints(values: ArrayD<i64>) -> ArrayD<Z64> {
        values.mapv(Z64::from_i64)
    }

    #[tokio::test]
    async fn test_relu() {
        let codec = FixedPointCodec::new(16);
        let input = array![-2.5, -0.0001, 0.0, 0.75, 1000.125].into_dyn();
        let outputs = run_parties::<Z64, _, _>(2, |ctx| {
            let encoded = codec.encode_array::<Z64>(input.view());
            Box::pin(async move {
                let encoded = encoded?;
                let provided = (ctx.party_id() == 0).then(|| encoded.view());
                let x = ctx.input(0, provided, &[5]).await?;
                let y = relu(ctx, &x).await?;
                Ok(codec.decode_array(ctx.open(&y).await?.view()))
            })
        })
        .await;
        for output in outputs {
            assert_eq!(output.unwrap(), array![0.0, 0.0, 0.0, 0.75, 1000.125].into_dyn());
        }
    }

    #[tokio::test]
    async fn test_argmax() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let x = ints(array![[1, 5, 3], [7, 7, 2], [-4, -9, -1], [0, 0, 0]].into_dyn());
                let result = argmax(ctx, &ctx.public(x.view())).await?;
                let (index, value) =
                    try_join_circuits!(ctx.open(&result.index), ctx.open(&result.value))?;
                assert_eq!(index, ints(array![1, 0, 2, 0].into_dyn()));
                assert_eq!(value, ints(array![5, 7, -1, 0].into_dyn()));
                Ok(())
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_argmax_near_value_bound() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let limit = (1i64 << 46) - 1;
                let x = ints(array![[-limit, limit], [limit, -limit], [limit, limit]].into_dyn());
                let result = argmax(ctx, &ctx.public(x.view())).await?;
                assert_eq!(
                    ctx.open(&result.index).await?,
                    ints(array![1, 0, 0].into_dyn())
                );
                Ok(())
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_argmax_rejects_vectors() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let x = ctx.public(ints(array![1, 2].into_dyn()).view());
                assert!(argmax(ctx, &x).await.is_err());
                Ok(())
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_equal() {
        let stats = test_circuit(|ctx| {
            Box::pin(async move {
                let x = ctx.public(ints(array![3, 4, -1, 0].into_dyn()).view());
                let y = ctx.public(ints(array![3, 5, -1, -2].into_dyn()).view());
                let result = equal(ctx, &x, &y).await?;
                assert_eq!(ctx.open(&result).await?, ints(array![1, 0, 1, 0].into_dyn()));
                Ok(())
            })
        })
        .await;
        assert_eq!(stats.rounds, 8);
    }
}
