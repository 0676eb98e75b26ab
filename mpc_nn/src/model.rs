use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use mpc::MpcError;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Plaintext layer of a feed-forward network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// y = x·weights + bias, weights are inputs×outputs.
    Linear {
        weights: Array2<f64>,
        bias: Array1<f64>,
    },
    Relu,
}

/// Public shape of a layer. This is everything parties learn about the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerShape {
    Linear { inputs: usize, outputs: usize },
    Relu { width: usize },
}

/// Sequence of layer shapes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub layers: Vec<LayerShape>,
}

impl Architecture {
    /// Fully connected network with ReLU between consecutive linear layers,
    /// e.g. `[784, 500, 10]`.
    pub fn dense(sizes: &[usize]) -> Result<Self> {
        if sizes.len() < 2 || sizes.contains(&0) {
            return Err(ModelError::invalid(format!("invalid layer sizes {:?}", sizes)));
        }
        let mut layers = Vec::new();
        for (i, pair) in sizes.windows(2).enumerate() {
            if i > 0 {
                layers.push(LayerShape::Relu { width: pair[0] });
            }
            layers.push(LayerShape::Linear {
                inputs: pair[0],
                outputs: pair[1],
            });
        }
        Ok(Self { layers })
    }

    /// Check that layers chain together.
    pub fn validate(&self) -> Result<()> {
        let mut width = None;
        for (i, layer) in self.layers.iter().enumerate() {
            width = Some(match (*layer, width) {
                (LayerShape::Linear { inputs, outputs }, None) => {
                    if inputs == 0 || outputs == 0 {
                        return Err(ModelError::invalid(format!("layer {} is empty", i)));
                    }
                    outputs
                }
                (LayerShape::Linear { inputs, outputs }, Some(prev)) => {
                    if inputs != prev || outputs == 0 {
                        return Err(ModelError::invalid(format!(
                            "layer {} expects {} inputs, previous layer has {} outputs",
                            i, inputs, prev
                        )));
                    }
                    outputs
                }
                (LayerShape::Relu { width: relu_width }, Some(prev)) if relu_width == prev => prev,
                (LayerShape::Relu { .. }, _) => {
                    return Err(ModelError::invalid(format!(
                        "activation at layer {} does not follow a linear layer",
                        i
                    )))
                }
            });
        }
        if width.is_none() {
            return Err(ModelError::invalid("model has no layers"));
        }
        Ok(())
    }

    pub fn input_size(&self) -> usize {
        match self.layers.first() {
            Some(LayerShape::Linear { inputs, .. }) => *inputs,
            Some(LayerShape::Relu { width }) => *width,
            None => 0,
        }
    }

    pub fn output_size(&self) -> usize {
        match self.layers.last() {
            Some(LayerShape::Linear { outputs, .. }) => *outputs,
            Some(LayerShape::Relu { width }) => *width,
            None => 0,
        }
    }
}

/// Plaintext feed-forward classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub layers: Vec<Layer>,
}

impl Model {
    /// Create model with validated layer chaining.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        let model = Self { layers };
        model.architecture()?;
        Ok(model)
    }

    /// Model with given architecture and weights uniform in [-scale; scale].
    pub fn random<G: Rng + ?Sized>(
        architecture: &Architecture,
        scale: f64,
        rng: &mut G,
    ) -> Result<Self> {
        architecture.validate()?;
        let layers = architecture
            .layers
            .iter()
            .map(|shape| match *shape {
                LayerShape::Linear { inputs, outputs } => Layer::Linear {
                    weights: Array2::from_shape_simple_fn((inputs, outputs), || {
                        rng.gen_range(-scale..=scale)
                    }),
                    bias: Array1::from_shape_simple_fn(outputs, || rng.gen_range(-scale..=scale)),
                },
                LayerShape::Relu { .. } => Layer::Relu,
            })
            .collect();
        Ok(Self { layers })
    }

    /// Load model from JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let model: Model = serde_json::from_reader(reader)?;
        model.architecture()?;
        Ok(model)
    }

    /// Save model to JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        Ok(serde_json::to_writer(writer, self)?)
    }

    /// Public shapes of all layers. Fails if layers do not chain together.
    pub fn architecture(&self) -> Result<Architecture> {
        let mut width = 0;
        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let shape = match layer {
                Layer::Linear { weights, bias } => {
                    let (inputs, outputs) = weights.dim();
                    if bias.len() != outputs {
                        return Err(ModelError::invalid(format!(
                            "layer {} has {} outputs and {} biases",
                            i,
                            outputs,
                            bias.len()
                        )));
                    }
                    width = outputs;
                    LayerShape::Linear { inputs, outputs }
                }
                Layer::Relu => LayerShape::Relu { width },
            };
            layers.push(shape);
        }
        let architecture = Architecture { layers };
        architecture.validate()?;
        Ok(architecture)
    }

    /// Evaluate network on a batch of samples, one per row.
    pub fn forward(&self, samples: ArrayView2<f64>) -> Result<Array2<f64>> {
        let architecture = self.architecture()?;
        if samples.ncols() != architecture.input_size() {
            return Err(MpcError::shape_mismatch(
                "forward",
                samples.shape(),
                &[samples.nrows(), architecture.input_size()],
            )
            .into());
        }
        let mut x = samples.to_owned();
        for layer in &self.layers {
            x = match layer {
                Layer::Linear { weights, bias } => x.dot(weights) + bias,
                Layer::Relu => x.mapv(|v| v.max(0.0)),
            };
        }
        Ok(x)
    }

    /// Predicted class of every sample. The first maximum wins.
    pub fn predict(&self, samples: ArrayView2<f64>) -> Result<Vec<usize>> {
        let logits = self.forward(samples)?;
        Ok(logits.axis_iter(Axis(0)).map(|row| argmax(row.iter())).collect())
    }
}

/// Position of the first maximum.
pub fn argmax<'a>(values: impl IntoIterator<Item = &'a f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &value) in values.into_iter().enumerate() {
        if value > best.1 {
            best = (i, value);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    fn tiny_model() -> Model {
        Model::new(vec![
            Layer::Linear {
                weights: array![[1.0, -1.0], [0.5, 2.0]],
                bias: array![0.0, -1.0],
            },
            Layer::Relu,
            Layer::Linear {
                weights: array![[1.0, 0.0, 2.0], [0.0, 1.0, -1.0]],
                bias: array![0.5, 0.0, 0.0],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_forward_and_predict() {
        let model = tiny_model();
        let samples = array![[1.0, 2.0], [2.0, 0.0]];
        // Hidden: [2, 2] and [2, -3] -> [2, 0].
        let logits = model.forward(samples.view()).unwrap();
        assert_eq!(logits, array![[2.5, 2.0, 2.0], [2.5, 0.0, 4.0]]);
        assert_eq!(model.predict(samples.view()).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_architecture() {
        let architecture = tiny_model().architecture().unwrap();
        assert_eq!(
            architecture.layers,
            vec![
                LayerShape::Linear {
                    inputs: 2,
                    outputs: 2
                },
                LayerShape::Relu { width: 2 },
                LayerShape::Linear {
                    inputs: 2,
                    outputs: 3
                },
            ]
        );
        assert_eq!(Architecture::dense(&[2, 2, 3]).unwrap(), architecture);
        assert_eq!(architecture.input_size(), 2);
        assert_eq!(architecture.output_size(), 3);
    }

    #[test]
    fn test_invalid_models() {
        let broken_chain = Model::new(vec![
            Layer::Linear {
                weights: Array2::zeros((2, 3)),
                bias: Array1::zeros(3),
            },
            Layer::Linear {
                weights: Array2::zeros((2, 3)),
                bias: Array1::zeros(3),
            },
        ]);
        assert!(matches!(broken_chain, Err(ModelError::InvalidModel(_))));

        let bad_bias = Model::new(vec![Layer::Linear {
            weights: Array2::zeros((2, 3)),
            bias: Array1::zeros(2),
        }]);
        assert!(bad_bias.is_err());

        assert!(Model::new(vec![Layer::Relu]).is_err());
        assert!(Model::new(vec![]).is_err());
        assert!(Architecture::dense(&[5]).is_err());
    }

    #[test]
    fn test_random_model() {
        let mut rng = SmallRng::seed_from_u64(1);
        let architecture = Architecture::dense(&[4, 3, 2]).unwrap();
        let model = Model::random(&architecture, 0.5, &mut rng).unwrap();
        assert_eq!(model.architecture().unwrap(), architecture);
        for layer in &model.layers {
            if let Layer::Linear { weights, .. } = layer {
                assert!(weights.iter().all(|w| w.abs() <= 0.5));
            }
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let model = tiny_model();
        let architecture = model.architecture().unwrap();
        let path = std::env::temp_dir().join(format!("model-{}.json", std::process::id()));
        model.save(&path).unwrap();
        let loaded = Model::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(loaded.architecture().unwrap(), architecture);
    }

    #[test]
    fn test_forward_shape_check() {
        let samples = Array2::zeros((1, 5));
        assert!(matches!(
            tiny_model().forward(samples.view()),
            Err(ModelError::Mpc(MpcError::ShapeMismatch { .. }))
        ));
    }
}
