use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use super::{EpochCallback, EpochMetrics, EpochReport, Trainer, TrainingHandle, TrainingJob};
use crate::{Result, VisErr};

/// A trainer that doesn't learn anything.
///
/// Each epoch takes `epoch_delay` on the tokio clock and adds `1.0` to every
/// parameter, so tests can tell which epoch a predictor came from. Runs as a
/// regular task, which keeps it deterministic under a paused clock.
#[derive(Debug, Clone)]
pub struct MockTrainer {
    epoch_delay: Duration,
    fail_at: Option<usize>,
    spawned: Arc<AtomicUsize>,
}

impl Default for MockTrainer {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl MockTrainer {
    pub fn new(epoch_delay: Duration) -> Self {
        Self {
            epoch_delay,
            fail_at: None,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes every job fail with `TrainingFailed` at the given 1-based epoch.
    pub fn failing_at(mut self, epoch: usize) -> Self {
        self.fail_at = Some(epoch);
        self
    }

    /// Returns how many jobs were started so far, across clones.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl Trainer for MockTrainer {
    fn spawn(&self, job: TrainingJob, mut on_epoch: EpochCallback) -> TrainingHandle {
        self.spawned.fetch_add(1, Ordering::SeqCst);

        let token = CancellationToken::new();
        let child = token.clone();
        let delay = self.epoch_delay;
        let fail_at = self.fail_at;

        let handle = tokio::spawn(async move {
            let mut predictor = job.predictor;

            for epoch in 1..=job.config.epochs {
                tokio::select! {
                    _ = child.cancelled() => return Err(VisErr::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }

                if fail_at == Some(epoch) {
                    return Err(VisErr::TrainingFailed(format!("mock failure at epoch {epoch}")));
                }

                predictor.params_mut().iter_mut().for_each(|p| *p += 1.);
                on_epoch(EpochReport {
                    epoch,
                    metrics: EpochMetrics {
                        loss: 1. / epoch as f32,
                        accuracy: 1. - 1. / epoch as f32,
                        ..Default::default()
                    },
                    predictor: predictor.clone(),
                });
            }

            Result::Ok(predictor)
        });

        TrainingHandle::new(token, handle)
    }
}
