use serde::Serialize;

use crate::{
    config::{Activation, NetworkConfig, MAX_NEURONS},
    dataset::Dataset,
};

/// The activation a layer of the resolved topology ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerActivation {
    Relu,
    Sigmoid,
    Tanh,
    /// Fixed for the output layer when a dataset is present.
    Softmax,
}

impl From<Activation> for LayerActivation {
    fn from(act: Activation) -> Self {
        match act {
            Activation::Relu => LayerActivation::Relu,
            Activation::Sigmoid => LayerActivation::Sigmoid,
            Activation::Tanh => LayerActivation::Tanh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerSpec {
    pub neuron_count: usize,
    pub activation: LayerActivation,
}

/// A validated, render ready network structure.
///
/// Always recomputed from scratch and replaced, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub layers: Vec<LayerSpec>,
    /// The width of the vector fed into the first layer.
    pub input_size: usize,
}

impl Topology {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Returns the neuron count of every layer, in order.
    pub fn sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.neuron_count).collect()
    }

    /// Returns the total amount of neurons in the network.
    pub fn neuron_count(&self) -> usize {
        self.layers.iter().map(|l| l.neuron_count).sum()
    }

    /// Returns the amount of connections between adjacent layers.
    pub fn connection_count(&self) -> usize {
        self.layers
            .windows(2)
            .map(|w| w[0].neuron_count * w[1].neuron_count)
            .sum()
    }
}

/// Derives the topology for the given config and optional dataset.
///
/// Pure and total: the neuron list is padded with 1 or truncated to
/// `layer_count`, counts are clamped to at least 1, and a dataset forces the
/// first layer to its feature count and the last one to its class count with a
/// softmax output. With a single layer the output override wins.
///
/// # Arguments
/// * `config` - The committed config.
/// * `dataset` - The loaded dataset, if any.
///
/// # Returns
/// A freshly computed topology.
pub fn resolve(config: &NetworkConfig, dataset: Option<&Dataset>) -> Topology {
    let layer_count = config.layer_count.max(1);
    let hidden = LayerActivation::from(config.activation);

    let mut layers: Vec<LayerSpec> = (0..layer_count)
        .map(|i| LayerSpec {
            neuron_count: config.neurons_per_layer.get(i).copied().unwrap_or(1).max(1),
            activation: hidden,
        })
        .collect();

    let Some(dataset) = dataset else {
        let input_size = layers[0].neuron_count;
        return Topology { layers, input_size };
    };

    layers[0].neuron_count = dataset.input_shape()[0];
    if let Some(last) = layers.last_mut() {
        last.neuron_count = dataset.output_shape()[0];
        last.activation = LayerActivation::Softmax;
    }

    Topology {
        layers,
        input_size: dataset.input_shape()[0],
    }
}

/// Suggests a three layer shape for a freshly loaded dataset:
/// `[features, round((features + classes) / 2), classes]`.
///
/// Every entry is clamped to `[1, MAX_NEURONS]` so the suggestion is always a
/// valid config. With the dataset loaded, [`resolve`] sizes the first and last
/// layers from the dataset anyway, so a wide one-hot encoded input still gets
/// its real width even when the config shows the clamped count.
pub fn recommend(dataset: &Dataset) -> Vec<usize> {
    let features = dataset.feature_count();
    let classes = dataset.class_count();
    let hidden = (features + classes).div_ceil(2);

    [features, hidden, classes]
        .into_iter()
        .map(|n| n.clamp(1, MAX_NEURONS))
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn dataset(features: usize, classes: usize) -> Dataset {
        Dataset::new(
            "test",
            Array2::zeros((2, features)),
            Array2::zeros((2, classes)),
        )
        .unwrap()
    }

    #[test]
    fn without_dataset_counts_follow_the_config() {
        let topology = resolve(&NetworkConfig::default(), None);

        assert_eq!(topology.sizes(), vec![4, 5, 3]);
        assert_eq!(topology.input_size, 4);
        assert!(topology
            .layers
            .iter()
            .all(|l| l.activation == LayerActivation::Relu));
    }

    #[test]
    fn dataset_overrides_the_boundary_layers() {
        let config = NetworkConfig {
            activation: Activation::Tanh,
            ..Default::default()
        };
        let topology = resolve(&config, Some(&dataset(6, 2)));

        assert_eq!(topology.sizes(), vec![6, 5, 2]);
        assert_eq!(topology.layers[1].activation, LayerActivation::Tanh);
        assert_eq!(topology.layers[2].activation, LayerActivation::Softmax);
        assert_eq!(topology.input_size, 6);
    }

    #[test]
    fn single_layer_takes_the_output_shape() {
        let config = NetworkConfig {
            layer_count: 1,
            neurons_per_layer: vec![7],
            ..Default::default()
        };
        let topology = resolve(&config, Some(&dataset(4, 3)));

        assert_eq!(topology.sizes(), vec![3]);
        assert_eq!(topology.layers[0].activation, LayerActivation::Softmax);
        assert_eq!(topology.input_size, 4);
    }

    #[test]
    fn inconsistent_lists_are_padded_and_clamped() {
        let config = NetworkConfig {
            layer_count: 4,
            neurons_per_layer: vec![0, 2],
            ..Default::default()
        };
        let topology = resolve(&config, None);

        assert_eq!(topology.sizes(), vec![1, 2, 1, 1]);
        assert_eq!(topology.connection_count(), 2 + 2 + 1);
    }

    #[test]
    fn clamped_recommendation_keeps_the_real_input_width() {
        let wide = dataset(MAX_NEURONS + 476, 2);
        let neurons = recommend(&wide);
        assert_eq!(neurons, vec![MAX_NEURONS, 751, 2]);

        let config = NetworkConfig {
            layer_count: 3,
            neurons_per_layer: neurons,
            ..Default::default()
        };
        let topology = resolve(&config, Some(&wide));

        assert!(config.validate().is_ok());
        assert_eq!(topology.sizes(), vec![MAX_NEURONS + 476, 751, 2]);
        assert_eq!(topology.input_size, MAX_NEURONS + 476);
    }

    #[test]
    fn recommend_rounds_half_up() {
        assert_eq!(recommend(&dataset(4, 3)), vec![4, 4, 3]);
        assert_eq!(recommend(&dataset(6, 2)), vec![6, 4, 2]);
    }
}
