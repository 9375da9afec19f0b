use super::{Activation, LossKind, OptimizerKind};

/// A single user-originated change to the [`NetworkConfig`](super::NetworkConfig).
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    /// Resizes `neuronsPerLayer` along with the count.
    LayerCount(usize),
    /// Replaces the whole list, the layer count follows its length.
    NeuronsPerLayer(Vec<usize>),
    LayerNeurons { index: usize, neurons: usize },
    AddLayer,
    RemoveLayer,
    Activation(Activation),
    LearningRate(f32),
    Epochs(usize),
    BatchSize(usize),
    Optimizer(OptimizerKind),
    LossFunction(LossKind),
    ValidationSplit(f32),
}

impl ConfigUpdate {
    /// Parses a comma separated neuron list such as `"4, 5, 3"`.
    ///
    /// Tokens that aren't integers are skipped, an input without any valid token
    /// yields a single layer of one neuron.
    pub fn parse_neurons(input: &str) -> Self {
        let neurons: Vec<usize> = input
            .split(',')
            .filter_map(|token| token.trim().parse().ok())
            .collect();

        if neurons.is_empty() {
            return Self::NeuronsPerLayer(vec![1]);
        }

        Self::NeuronsPerLayer(neurons)
    }

    /// The config field touched by this update, as named in the JSON config.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigUpdate::LayerCount(_) | ConfigUpdate::AddLayer | ConfigUpdate::RemoveLayer => {
                "layerCount"
            }
            ConfigUpdate::NeuronsPerLayer(_) | ConfigUpdate::LayerNeurons { .. } => {
                "neuronsPerLayer"
            }
            ConfigUpdate::Activation(_) => "activation",
            ConfigUpdate::LearningRate(_) => "learningRate",
            ConfigUpdate::Epochs(_) => "epochs",
            ConfigUpdate::BatchSize(_) => "batchSize",
            ConfigUpdate::Optimizer(_) => "optimizer",
            ConfigUpdate::LossFunction(_) => "lossFunction",
            ConfigUpdate::ValidationSplit(_) => "validationSplit",
        }
    }

    /// Whether applying this update may change the resolved topology.
    pub fn affects_topology(&self) -> bool {
        matches!(
            self,
            ConfigUpdate::LayerCount(_)
                | ConfigUpdate::NeuronsPerLayer(_)
                | ConfigUpdate::LayerNeurons { .. }
                | ConfigUpdate::AddLayer
                | ConfigUpdate::RemoveLayer
                | ConfigUpdate::Activation(_)
        )
    }
}
