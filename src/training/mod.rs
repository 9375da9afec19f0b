//! The boundary between a session and whatever fits its predictor.

mod handle;
mod local;
mod mock;

use std::sync::Arc;

pub use handle::TrainingHandle;
pub use local::LocalTrainer;
pub use mock::MockTrainer;

use crate::{config::NetworkConfig, dataset::Dataset, model::Sequential, topology::Topology};

/// Everything a trainer needs to fit a predictor.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub topology: Topology,
    pub predictor: Sequential,
    pub dataset: Arc<Dataset>,
    pub config: NetworkConfig,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochMetrics {
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

/// What a trainer reports at the end of every epoch.
#[derive(Debug, Clone)]
pub struct EpochReport {
    /// 1-based.
    pub epoch: usize,
    pub metrics: EpochMetrics,
    /// The predictor as it stands after this epoch.
    pub predictor: Sequential,
}

pub type EpochCallback = Box<dyn FnMut(EpochReport) + Send>;

/// Starts training tasks.
pub trait Trainer: Send + Sync {
    /// Spawns a training task for `job` on the current runtime.
    ///
    /// # Arguments
    /// * `job` - The predictor, data and hyperparameters.
    /// * `on_epoch` - Called once per completed epoch, from the training task.
    ///
    /// # Returns
    /// A handle to cancel or await the task.
    fn spawn(&self, job: TrainingJob, on_epoch: EpochCallback) -> TrainingHandle;
}

/// Fraction of `predicted` rows whose largest output matches the target's.
pub(crate) fn accuracy(predicted: ndarray::ArrayView2<f32>, target: ndarray::ArrayView2<f32>) -> f32 {
    let argmax = |row: ndarray::ArrayView1<f32>| {
        row.iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    };

    let rows = predicted.nrows();
    if rows == 0 {
        return 0.;
    }

    let hits = predicted
        .rows()
        .into_iter()
        .zip(target.rows())
        .filter(|(p, t)| argmax(*p) == argmax(*t))
        .count();

    hits as f32 / rows as f32
}
