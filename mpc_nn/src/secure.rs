use mpc::{
    circuits::{matmul_fixed, relu, try_join_circuits_all},
    dealer::MaterialPlan,
    executor::MpcExecutor,
    fixed_point::FixedPointCodec,
    tensor::SecureTensor,
    try_join_circuits, MpcContext, MpcEngine, Ring,
};
use ndarray::ArrayD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ModelError, Result},
    model::{Architecture, Layer, LayerShape, Model},
};

/// Layer with secret-shared parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecureLayer<R> {
    Linear {
        weights: SecureTensor<R>,
        bias: SecureTensor<R>,
    },
    Relu,
}

/// Model whose weights are additively shared among all parties at fixed-point scale.
/// Built once and reused for any number of forward passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureModel<R> {
    layers: Vec<SecureLayer<R>>,
    architecture: Architecture,
    precision: u32,
}

impl<R: Ring> SecureModel<R> {
    /// Split model into one share per party, for delivery by an owner outside the computation.
    pub fn share<G: Rng + ?Sized>(
        model: &Model,
        codec: FixedPointCodec,
        num_parties: usize,
        rng: &mut G,
    ) -> Result<Vec<Self>> {
        let architecture = model.architecture()?;
        let mut parts: Vec<_> = (0..num_parties)
            .map(|_| Vec::with_capacity(model.layers.len()))
            .collect();

        for layer in &model.layers {
            match layer {
                Layer::Linear { weights, bias } => {
                    let weights = codec.encode_array::<R>(weights.view().into_dyn())?;
                    let bias = codec.encode_array::<R>(bias.view().into_dyn())?;
                    let weight_shares = SecureTensor::share(weights.view(), num_parties, rng);
                    let bias_shares = SecureTensor::share(bias.view(), num_parties, rng);
                    for ((part, weights), bias) in parts.iter_mut().zip(weight_shares).zip(bias_shares)
                    {
                        part.push(SecureLayer::Linear { weights, bias });
                    }
                }
                Layer::Relu => {
                    for part in parts.iter_mut() {
                        part.push(SecureLayer::Relu);
                    }
                }
            }
        }

        Ok(parts
            .into_iter()
            .map(|layers| Self {
                layers,
                architecture: architecture.clone(),
                precision: codec.precision(),
            })
            .collect())
    }

    /// Share model provided by party `owner` within the computation.
    /// All parties pass the same public architecture; only the owner passes the model.
    /// Cost: 1 communication round.
    pub async fn input<E>(
        ctx: &MpcExecutor<'_, E>,
        owner: usize,
        model: Option<&Model>,
        architecture: &Architecture,
        codec: FixedPointCodec,
    ) -> Result<Self>
    where
        E: MpcEngine<Ring = R>,
    {
        architecture.validate()?;
        let encoded: Vec<Option<(ArrayD<R>, ArrayD<R>)>> = if ctx.party_id() == owner {
            let model = model.ok_or(ModelError::MissingInput {
                party: owner,
                what: "model",
            })?;
            if model.architecture()? != *architecture {
                return Err(ModelError::invalid(
                    "model does not match the agreed architecture",
                ));
            }
            model
                .layers
                .iter()
                .map(|layer| match layer {
                    Layer::Linear { weights, bias } => Ok(Some((
                        codec.encode_array(weights.view().into_dyn())?,
                        codec.encode_array(bias.view().into_dyn())?,
                    ))),
                    Layer::Relu => Ok(None),
                })
                .collect::<Result<_>>()?
        } else {
            vec![None; architecture.layers.len()]
        };

        let layers = try_join_circuits_all(
            architecture
                .layers
                .iter()
                .zip(&encoded)
                .map(|(shape, values)| input_layer(ctx, owner, *shape, values.as_ref())),
        )
        .await?;

        debug!(owner, layers = layers.len(), "Model shared");
        Ok(Self {
            layers,
            architecture: architecture.clone(),
            precision: codec.precision(),
        })
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Number of fractional bits of the weights.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn layers(&self) -> &[SecureLayer<R>] {
        &self.layers
    }

    /// Secure forward pass of a batch of samples (batch×inputs) at fixed-point scale.
    /// Cost per layer: linear 2 rounds, ReLU 1 + ceil(log_2(SAFE_BITS-1)) + 1 rounds.
    pub async fn forward<E>(
        &self,
        ctx: &MpcExecutor<'_, E>,
        samples: &SecureTensor<R>,
    ) -> Result<SecureTensor<R>>
    where
        E: MpcEngine<Ring = R>,
    {
        let mut x = samples.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            debug!(layer = i, shape = ?x.shape(), "Secure forward layer");
            x = match layer {
                SecureLayer::Linear { weights, bias } => {
                    matmul_fixed(ctx, &x, weights, self.precision)
                        .await?
                        .add_broadcast(bias)?
                }
                SecureLayer::Relu => relu(ctx, &x).await?,
            };
        }
        Ok(x)
    }
}

async fn input_layer<E: MpcEngine>(
    ctx: &MpcExecutor<'_, E>,
    owner: usize,
    shape: LayerShape,
    values: Option<&(ArrayD<E::Ring>, ArrayD<E::Ring>)>,
) -> mpc::Result<SecureLayer<E::Ring>> {
    match shape {
        LayerShape::Linear { inputs, outputs } => {
            let weights = values.map(|(weights, _)| weights.view());
            let bias = values.map(|(_, bias)| bias.view());
            let weights_shape = [inputs, outputs];
            let bias_shape = [outputs];
            let (weights, bias) = try_join_circuits!(
                ctx.input(owner, weights, &weights_shape),
                ctx.input(owner, bias, &bias_shape)
            )?;
            Ok(SecureLayer::Linear { weights, bias })
        }
        LayerShape::Relu { .. } => Ok(SecureLayer::Relu),
    }
}

/// What a session computes for each batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Workload {
    /// Forward pass and argmax.
    Classify,
    /// Forward pass, argmax and comparison with labels.
    Evaluate,
}

/// Dealer material consumed by one forward pass of a batch.
pub fn forward_plan<R: Ring>(architecture: &Architecture, batch_size: usize) -> MaterialPlan {
    let mut plan = MaterialPlan::new();
    for layer in &architecture.layers {
        match *layer {
            LayerShape::Linear { inputs, outputs } => {
                plan.matmul([batch_size, inputs, outputs])
                    .truncate(batch_size * outputs);
            }
            LayerShape::Relu { width } => {
                plan.relu::<R>(batch_size * width);
            }
        }
    }
    plan
}

/// Dealer material consumed by `batches` batches of given workload.
pub fn material_plan<R: Ring>(
    architecture: &Architecture,
    batch_size: usize,
    batches: usize,
    workload: Workload,
) -> MaterialPlan {
    let mut plan = forward_plan::<R>(architecture, batch_size);
    plan.argmax::<R>(batch_size, architecture.output_size());
    if workload == Workload::Evaluate {
        plan.equal::<R>(batch_size);
    }
    plan.repeat(batches)
}
