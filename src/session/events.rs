use ndarray::Array1;

use super::Viewport;
use crate::{
    animation::AnimationPlan,
    config::{ConfigUpdate, NetworkConfig},
    dataset::Dataset,
    layout::Layout,
    simulation::ActivationSnapshot,
    topology::Topology,
    training::EpochMetrics,
};

/// High-level lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Training,
    Finished,
    Error,
}

/// A single entry of the session's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: &'static str,
    pub message: String,
}

/// Inputs from the presentation side.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    UpdateConfig(ConfigUpdate),
    ReplaceConfig(NetworkConfig),
    LoadDataset(Dataset),
    LoadCsv { name: String, text: String },
    Resize(Viewport),
    StartTraining,
    CancelTraining,
    RunForward,
    /// Animates the given per layer magnitudes from the output back, or the last
    /// activations when `None`.
    AnimateBackward(Option<Vec<Array1<f32>>>),
    Shutdown,
}

/// Outputs to the presentation side.
///
/// Everything derived from a predictor carries the generation it was computed
/// for; the session never emits a stale one, consumers may still use it to drop
/// events they queued themselves.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TopologyChanged(Topology),
    LayoutChanged(Layout),
    ConfigChanged(NetworkConfig),
    EpochCompleted {
        generation: u64,
        epoch: usize,
        metrics: EpochMetrics,
    },
    Activations {
        generation: u64,
        /// `None` outside of training.
        epoch: Option<usize>,
        snapshot: ActivationSnapshot,
        plan: AnimationPlan,
    },
    BackwardPlanned {
        generation: u64,
        plan: AnimationPlan,
    },
    TrainingFinished {
        generation: u64,
        epochs: usize,
    },
    TrainingCancelled {
        generation: u64,
    },
    Failed {
        message: String,
        recoverable: bool,
    },
    Status(String),
}
