use mpc::{
    circuits::{argmax, equal},
    config::ProtocolConfig,
    dealer::MaterialPlan,
    executor::MpcExecutor,
    fixed_point::FixedPointCodec,
    tensor::SecureTensor,
    try_join_circuits, MpcContext, MpcEngine, MpcError, Ring,
};
use ndarray::{Array1, ArrayView2};
use tracing::info;

use crate::{
    error::{ModelError, Result},
    model::{Architecture, Model},
    secure::{material_plan, SecureModel, Workload},
};

/// Which party plays which part in a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roles {
    /// Provides the plaintext model.
    pub model_owner: usize,
    /// Provides samples and labels.
    pub data_owner: usize,
    /// Only party that learns predictions or scores.
    pub output_party: usize,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            model_owner: 0,
            data_owner: 1,
            output_party: 1,
        }
    }
}

/// Secure inference session.
/// Holds everything parties agree on before a run; protocol calls take the executor explicitly.
#[derive(Clone, Debug)]
pub struct Session {
    config: ProtocolConfig,
    roles: Roles,
    codec: FixedPointCodec,
}

impl Session {
    pub fn new(config: ProtocolConfig, roles: Roles) -> Result<Self> {
        config.validate()?;
        config.check_party(roles.model_owner)?;
        config.check_party(roles.data_owner)?;
        config.check_party(roles.output_party)?;
        Ok(Self {
            codec: FixedPointCodec::new(config.precision),
            config,
            roles,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    pub fn codec(&self) -> FixedPointCodec {
        self.codec
    }

    /// Dealer material for `batches` batches of given workload.
    pub fn material_plan<R: Ring>(
        &self,
        architecture: &Architecture,
        batches: usize,
        workload: Workload,
    ) -> MaterialPlan {
        material_plan::<R>(architecture, self.config.batch_size, batches, workload)
    }

    /// Share the model owner's model. Only the model owner passes `model`.
    pub async fn share_model<E: MpcEngine>(
        &self,
        ctx: &MpcExecutor<'_, E>,
        model: Option<&Model>,
        architecture: &Architecture,
    ) -> Result<SecureModel<E::Ring>> {
        self.check_context(ctx)?;
        info!(
            owner = self.roles.model_owner,
            layers = architecture.layers.len(),
            "Sharing model"
        );
        SecureModel::input(ctx, self.roles.model_owner, model, architecture, self.codec).await
    }

    /// Predicted class of every sample of one batch.
    /// Only the data owner passes `samples`; only the output party gets predictions.
    pub async fn classify<E: MpcEngine>(
        &self,
        ctx: &MpcExecutor<'_, E>,
        model: &SecureModel<E::Ring>,
        samples: Option<ArrayView2<'_, f64>>,
    ) -> Result<Option<Vec<usize>>> {
        self.check_context(ctx)?;
        self.check_model(model)?;
        let encoded = self.encode_samples::<E::Ring>(ctx, model.architecture(), samples)?;
        let shape = [self.config.batch_size, model.architecture().input_size()];
        let x = ctx
            .input(self.roles.data_owner, encoded.as_ref().map(|x| x.view()), &shape)
            .await?;

        let predictions = self.predict(ctx, model, &x).await?;
        let revealed = ctx.reveal_to(self.roles.output_party, &predictions).await?;
        info!(batch = shape[0], "Batch classified");
        Ok(revealed.map(|values| values.iter().map(|&v| v.to_i128() as usize).collect()))
    }

    /// Number of correctly classified samples of one batch.
    /// Only the data owner passes `samples` and `labels`; only the output party gets the score.
    pub async fn evaluate<E: MpcEngine>(
        &self,
        ctx: &MpcExecutor<'_, E>,
        model: &SecureModel<E::Ring>,
        samples: Option<ArrayView2<'_, f64>>,
        labels: Option<&[usize]>,
    ) -> Result<Option<usize>> {
        self.check_context(ctx)?;
        self.check_model(model)?;
        let batch_size = self.config.batch_size;
        let encoded = self.encode_samples::<E::Ring>(ctx, model.architecture(), samples)?;
        let encoded_labels = if ctx.party_id() == self.roles.data_owner {
            let labels = labels.ok_or(ModelError::MissingInput {
                party: self.roles.data_owner,
                what: "labels",
            })?;
            if labels.len() != batch_size {
                return Err(MpcError::shape_mismatch("labels", &[labels.len()], &[batch_size]).into());
            }
            Some(Array1::from_iter(labels.iter().map(|&l| E::Ring::from_u64(l as u64))).into_dyn())
        } else {
            None
        };

        let shape = [batch_size, model.architecture().input_size()];
        let labels_shape = [batch_size];
        let (x, labels) = try_join_circuits!(
            ctx.input(self.roles.data_owner, encoded.as_ref().map(|x| x.view()), &shape),
            ctx.input(
                self.roles.data_owner,
                encoded_labels.as_ref().map(|l| l.view()),
                &labels_shape
            )
        )?;

        let predictions = self.predict(ctx, model, &x).await?;
        let hits = equal(ctx, &predictions, &labels).await?;
        let total = hits
            .to_flat()
            .into_iter()
            .fold(E::Ring::zero(), |acc, x| acc + x);
        let correct = SecureTensor::from_flat(&[1], vec![total])?;
        let revealed = ctx.reveal_to(self.roles.output_party, &correct).await?;
        info!(batch = batch_size, "Batch evaluated");
        Ok(revealed.and_then(|values| values.iter().next().map(|v| v.to_i128() as usize)))
    }

    /// Shared predicted class indices of shared samples.
    async fn predict<E: MpcEngine>(
        &self,
        ctx: &MpcExecutor<'_, E>,
        model: &SecureModel<E::Ring>,
        x: &SecureTensor<E::Ring>,
    ) -> Result<SecureTensor<E::Ring>> {
        let logits = model.forward(ctx, x).await?;
        Ok(argmax(ctx, &logits).await?.index)
    }

    fn encode_samples<R: Ring>(
        &self,
        ctx: &impl MpcContext,
        architecture: &Architecture,
        samples: Option<ArrayView2<'_, f64>>,
    ) -> Result<Option<ndarray::ArrayD<R>>> {
        if ctx.party_id() != self.roles.data_owner {
            return Ok(None);
        }
        let samples = samples.ok_or(ModelError::MissingInput {
            party: self.roles.data_owner,
            what: "samples",
        })?;
        let expected = [self.config.batch_size, architecture.input_size()];
        if samples.shape() != &expected[..] {
            return Err(MpcError::shape_mismatch("samples", samples.shape(), &expected).into());
        }
        Ok(Some(self.codec.encode_array(samples.into_dyn())?))
    }

    fn check_context(&self, ctx: &impl MpcContext) -> Result<()> {
        if ctx.num_parties() != self.config.num_parties {
            return Err(MpcError::InvalidConfig(format!(
                "session expects {} parties, engine has {}",
                self.config.num_parties,
                ctx.num_parties()
            ))
            .into());
        }
        Ok(())
    }

    fn check_model<R: Ring>(&self, model: &SecureModel<R>) -> Result<()> {
        if R::BITS != self.config.ring_bits {
            return Err(MpcError::InvalidConfig(format!(
                "session uses a {}-bit ring, engine uses {} bits",
                self.config.ring_bits,
                R::BITS
            ))
            .into());
        }
        if model.precision() != self.config.precision {
            return Err(ModelError::invalid(format!(
                "model shared with precision {}, session uses {}",
                model.precision(),
                self.config.precision
            )));
        }
        Ok(())
    }
}
