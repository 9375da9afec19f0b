use serde::{Deserialize, Serialize};

use super::ConfigUpdate;
use crate::{Result, VisErr};

pub const MAX_LAYERS: usize = 10;
pub const MAX_NEURONS: usize = 1024;
pub const MAX_EPOCHS: usize = 1000;
pub const MAX_BATCH_SIZE: usize = 1024;
pub const MAX_VALIDATION_SPLIT: f32 = 0.5;

/// The elementwise activation applied after every hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    /// Applies the activation to a single value.
    pub fn f(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.),
            Activation::Sigmoid => 1. / (1. + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
    Rmsprop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LossKind {
    #[default]
    CategoricalCrossentropy,
    MeanSquaredError,
    BinaryCrossentropy,
}

/// The canonical hyperparameter record of a session.
///
/// `neurons_per_layer.len() == layer_count` holds for every value handed out by
/// the [`ConfigManager`](super::ConfigManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub layer_count: usize,
    pub neurons_per_layer: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub loss_function: LossKind,
    pub validation_split: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            layer_count: 3,
            neurons_per_layer: vec![4, 5, 3],
            activation: Activation::Relu,
            learning_rate: 0.01,
            epochs: 50,
            batch_size: 32,
            optimizer: OptimizerKind::Adam,
            loss_function: LossKind::CategoricalCrossentropy,
            validation_split: 0.2,
        }
    }
}

impl NetworkConfig {
    /// Computes the config that results from applying `update` to this one.
    ///
    /// # Arguments
    /// * `update` - A single field change.
    ///
    /// # Returns
    /// The new config, or a `Validation` error if the value is out of range.
    pub fn apply(&self, update: ConfigUpdate) -> Result<Self> {
        let mut next = self.clone();

        match update {
            ConfigUpdate::LayerCount(n) => {
                check_layer_count(n)?;
                next.resize_layers(n);
            }
            ConfigUpdate::NeuronsPerLayer(neurons) => {
                check_layer_count(neurons.len())?;
                for &n in &neurons {
                    check_neurons(n)?;
                }
                next.layer_count = neurons.len();
                next.neurons_per_layer = neurons;
            }
            ConfigUpdate::LayerNeurons { index, neurons } => {
                check_neurons(neurons)?;
                let slot = next
                    .neurons_per_layer
                    .get_mut(index)
                    .ok_or_else(|| VisErr::Validation {
                        field: "neuronsPerLayer",
                        reason: format!("layer {index} does not exist"),
                    })?;
                *slot = neurons;
            }
            ConfigUpdate::AddLayer => {
                check_layer_count(self.layer_count + 1)?;
                next.resize_layers(self.layer_count + 1);
            }
            ConfigUpdate::RemoveLayer => {
                check_layer_count(self.layer_count.saturating_sub(1))?;
                next.resize_layers(self.layer_count - 1);
            }
            ConfigUpdate::Activation(activation) => next.activation = activation,
            ConfigUpdate::LearningRate(lr) => {
                check_learning_rate(lr)?;
                next.learning_rate = lr;
            }
            ConfigUpdate::Epochs(epochs) => {
                check_range("epochs", epochs, 1, MAX_EPOCHS)?;
                next.epochs = epochs;
            }
            ConfigUpdate::BatchSize(batch_size) => {
                check_range("batchSize", batch_size, 1, MAX_BATCH_SIZE)?;
                next.batch_size = batch_size;
            }
            ConfigUpdate::Optimizer(optimizer) => next.optimizer = optimizer,
            ConfigUpdate::LossFunction(loss) => next.loss_function = loss,
            ConfigUpdate::ValidationSplit(split) => {
                check_validation_split(split)?;
                next.validation_split = split;
            }
        }

        Ok(next)
    }

    /// Checks every field of the config, including the length invariant.
    ///
    /// Used for configs that didn't go through [`NetworkConfig::apply`], like the
    /// ones read from disk.
    pub fn validate(&self) -> Result<()> {
        check_layer_count(self.layer_count)?;
        if self.neurons_per_layer.len() != self.layer_count {
            return Err(VisErr::Validation {
                field: "neuronsPerLayer",
                reason: format!(
                    "has {} entries but layerCount is {}",
                    self.neurons_per_layer.len(),
                    self.layer_count
                ),
            });
        }

        for &n in &self.neurons_per_layer {
            check_neurons(n)?;
        }

        check_learning_rate(self.learning_rate)?;
        check_range("epochs", self.epochs, 1, MAX_EPOCHS)?;
        check_range("batchSize", self.batch_size, 1, MAX_BATCH_SIZE)?;
        check_validation_split(self.validation_split)
    }

    /// Sets the layer count, truncating from the tail or padding with 1.
    fn resize_layers(&mut self, n: usize) {
        self.layer_count = n;
        self.neurons_per_layer.resize(n, 1);
    }
}

fn check_range(field: &'static str, value: usize, low: usize, high: usize) -> Result<()> {
    if value < low || value > high {
        return Err(VisErr::Validation {
            field,
            reason: format!("{value} is not in [{low}, {high}]"),
        });
    }

    Ok(())
}

fn check_layer_count(n: usize) -> Result<()> {
    check_range("layerCount", n, 1, MAX_LAYERS)
}

fn check_neurons(n: usize) -> Result<()> {
    check_range("neuronsPerLayer", n, 1, MAX_NEURONS)
}

fn check_learning_rate(lr: f32) -> Result<()> {
    if !lr.is_finite() || lr <= 0. || lr > 1. {
        return Err(VisErr::Validation {
            field: "learningRate",
            reason: format!("{lr} is not in (0, 1]"),
        });
    }

    Ok(())
}

fn check_validation_split(split: f32) -> Result<()> {
    if !(0. ..=MAX_VALIDATION_SPLIT).contains(&split) {
        return Err(VisErr::Validation {
            field: "validationSplit",
            reason: format!("{split} is not in [0, {MAX_VALIDATION_SPLIT}]"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_count_resize_pads_and_truncates() {
        let config = NetworkConfig::default();

        for n in 1..=MAX_LAYERS {
            let next = config.apply(ConfigUpdate::LayerCount(n)).unwrap();
            assert_eq!(next.layer_count, n);
            assert_eq!(next.neurons_per_layer.len(), n);

            for (i, &neurons) in next.neurons_per_layer.iter().enumerate() {
                let expected = config.neurons_per_layer.get(i).copied().unwrap_or(1);
                assert_eq!(neurons, expected);
            }
        }
    }

    #[test]
    fn grow_to_five_layers() {
        let next = NetworkConfig::default()
            .apply(ConfigUpdate::LayerCount(5))
            .unwrap();
        assert_eq!(next.neurons_per_layer, vec![4, 5, 3, 1, 1]);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = NetworkConfig::default();

        let cases = [
            ConfigUpdate::LayerCount(0),
            ConfigUpdate::LayerCount(MAX_LAYERS + 1),
            ConfigUpdate::LearningRate(0.),
            ConfigUpdate::LearningRate(1.5),
            ConfigUpdate::LearningRate(f32::NAN),
            ConfigUpdate::Epochs(0),
            ConfigUpdate::Epochs(MAX_EPOCHS + 1),
            ConfigUpdate::BatchSize(2048),
            ConfigUpdate::ValidationSplit(0.75),
            ConfigUpdate::LayerNeurons {
                index: 0,
                neurons: 0,
            },
            ConfigUpdate::LayerNeurons {
                index: 7,
                neurons: 2,
            },
            ConfigUpdate::NeuronsPerLayer(vec![]),
        ];

        for update in cases {
            let err = config.apply(update.clone()).unwrap_err();
            assert!(
                matches!(err, VisErr::Validation { .. }),
                "{update:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn neurons_per_layer_sets_layer_count() {
        let next = NetworkConfig::default()
            .apply(ConfigUpdate::NeuronsPerLayer(vec![2, 2]))
            .unwrap();
        assert_eq!(next.layer_count, 2);
        assert_eq!(next.neurons_per_layer, vec![2, 2]);
    }

    #[test]
    fn remove_layer_stops_at_one() {
        let single = NetworkConfig::default()
            .apply(ConfigUpdate::LayerCount(1))
            .unwrap();
        assert!(single.apply(ConfigUpdate::RemoveLayer).is_err());

        let two = NetworkConfig::default()
            .apply(ConfigUpdate::RemoveLayer)
            .unwrap();
        assert_eq!(two.neurons_per_layer, vec![4, 5]);
    }

    #[test]
    fn validate_catches_length_drift() {
        let mut config = NetworkConfig::default();
        config.neurons_per_layer.push(2);
        assert!(config.validate().is_err());
        assert!(NetworkConfig::default().validate().is_ok());
    }

    #[test]
    fn activation_values() {
        assert_eq!(Activation::Relu.f(-1.), 0.);
        assert_eq!(Activation::Relu.f(2.), 2.);
        assert!((Activation::Sigmoid.f(0.) - 0.5).abs() < f32::EPSILON);
        assert!(Activation::Tanh.f(0.).abs() < f32::EPSILON);
    }
}
