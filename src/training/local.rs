use log::{debug, info, warn};
use ndarray::Axis;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tokio_util::sync::CancellationToken;

use super::{
    accuracy, EpochCallback, EpochMetrics, EpochReport, Trainer, TrainingHandle, TrainingJob,
};
use crate::{
    model::{loss_fn, optimizer, Predictor, Sequential},
    Result, VisErr,
};

/// Fits predictors in process, on tokio's blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTrainer;

impl LocalTrainer {
    pub fn new() -> Self {
        Self
    }
}

impl Trainer for LocalTrainer {
    fn spawn(&self, job: TrainingJob, on_epoch: EpochCallback) -> TrainingHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::task::spawn_blocking(move || train(job, child, on_epoch));

        TrainingHandle::new(token, handle)
    }
}

/// Runs mini batch gradient descent until the configured epochs are done or the
/// token is cancelled. The token is checked before every batch.
fn train(
    job: TrainingJob,
    token: CancellationToken,
    mut on_epoch: EpochCallback,
) -> Result<Sequential> {
    let TrainingJob {
        mut predictor,
        dataset,
        config,
        seed,
        ..
    } = job;

    if dataset.feature_count() != predictor.input_size() {
        return Err(VisErr::ShapeMismatch {
            what: "dataset features",
            got: dataset.feature_count(),
            expected: predictor.input_size(),
        });
    }

    let outputs = predictor.layer_sizes().last().copied().unwrap_or_default();
    if dataset.class_count() != outputs {
        return Err(VisErr::ShapeMismatch {
            what: "dataset classes",
            got: dataset.class_count(),
            expected: outputs,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let samples = dataset.sample_count();
    let mut indices: Vec<usize> = (0..samples).collect();
    indices.shuffle(&mut rng);

    let val_count = ((samples as f32 * config.validation_split) as usize).min(samples - 1);
    let (val_idx, train_idx) = indices.split_at(val_count);
    let mut train_idx = train_idx.to_vec();

    let features = dataset.features();
    let labels = dataset.labels();
    let x_val = features.select(Axis(0), val_idx);
    let y_val = labels.select(Axis(0), val_idx);

    let loss = loss_fn(config.loss_function);
    let mut optimizer = optimizer(config.optimizer, predictor.size(), config.learning_rate);
    let mut grad = vec![0.; predictor.size()];
    let batch_size = config.batch_size.max(1);

    info!(
        "training {} epochs on {} samples ({} held out)",
        config.epochs,
        train_idx.len(),
        val_count
    );

    for epoch in 0..config.epochs {
        train_idx.shuffle(&mut rng);

        let mut total_loss = 0.;
        let mut hits = 0.;

        for (batch, chunk) in train_idx.chunks(batch_size).enumerate() {
            if token.is_cancelled() {
                warn!(epoch = epoch; "training cancelled");
                return Err(VisErr::Cancelled);
            }

            let x = features.select(Axis(0), chunk);
            let y = labels.select(Axis(0), chunk);

            let y_pred = predictor.forward(x.view())?;
            let batch_loss = loss.loss(y_pred.view(), y.view());
            let batch_loss = finite("training loss", batch_loss, epoch, batch)?;

            total_loss += batch_loss * chunk.len() as f32;
            hits += accuracy(y_pred.view(), y.view()) * chunk.len() as f32;

            let d = loss.loss_prime(y_pred.view(), y.view());
            predictor.backward(d, &mut grad)?;
            optimizer.update_params(&grad, predictor.params_mut())?;
        }

        let seen = train_idx.len().max(1) as f32;
        let mut metrics = EpochMetrics {
            loss: total_loss / seen,
            accuracy: hits / seen,
            ..Default::default()
        };

        if val_count > 0 {
            let y_pred = predictor.predict(x_val.view())?;
            let val_loss = loss.loss(y_pred.view(), y_val.view());
            metrics.val_loss = Some(finite("validation loss", val_loss, epoch, 0)?);
            metrics.val_accuracy = Some(accuracy(y_pred.view(), y_val.view()));
        }

        debug!(
            epoch = epoch + 1;
            "loss {:.4}, accuracy {:.3}",
            metrics.loss,
            metrics.accuracy
        );

        on_epoch(EpochReport {
            epoch: epoch + 1,
            metrics,
            predictor: predictor.clone(),
        });
    }

    info!("training finished");
    Ok(predictor)
}

/// Passes `value` through, or reports it as a numeric instability at `epoch`
/// and `batch`.
fn finite(stage: &'static str, value: f32, epoch: usize, batch: usize) -> Result<f32> {
    if !value.is_finite() {
        return Err(VisErr::NumericInstability {
            stage,
            layer: epoch,
            index: batch,
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ndarray::array;

    use super::*;
    use crate::{
        config::{Activation, NetworkConfig, OptimizerKind},
        dataset::Dataset,
        topology,
    };

    fn job(epochs: usize) -> TrainingJob {
        // two separable blobs
        let features = array![
            [-1., -1.],
            [-0.8, -1.2],
            [-1.1, -0.9],
            [-0.9, -0.8],
            [1., 1.],
            [0.8, 1.2],
            [1.1, 0.9],
            [0.9, 0.8]
        ];
        let labels = array![
            [1., 0.],
            [1., 0.],
            [1., 0.],
            [1., 0.],
            [0., 1.],
            [0., 1.],
            [0., 1.],
            [0., 1.]
        ];
        let dataset = Arc::new(Dataset::new("blobs", features, labels).unwrap());
        let config = NetworkConfig {
            layer_count: 3,
            neurons_per_layer: vec![2, 4, 2],
            activation: Activation::Tanh,
            learning_rate: 0.05,
            epochs,
            batch_size: 4,
            optimizer: OptimizerKind::Adam,
            validation_split: 0.25,
            ..Default::default()
        };
        let topology = topology::resolve(&config, Some(&dataset));
        let predictor = Sequential::from_topology(&topology, 5).unwrap();

        TrainingJob {
            topology,
            predictor,
            dataset,
            config,
            seed: 11,
        }
    }

    #[tokio::test]
    async fn reports_every_epoch_and_learns() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();

        let handle = LocalTrainer.spawn(
            job(60),
            Box::new(move |report: EpochReport| sink.lock().unwrap().push(report.metrics)),
        );
        handle.join().await.unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 60);
        assert!(reports[59].loss < reports[0].loss);
        assert!(reports.iter().all(|m| m.val_loss.is_some()));
    }

    #[tokio::test]
    async fn cancelled_training_yields_no_model() {
        let handle = LocalTrainer.spawn(job(100_000), Box::new(|_: EpochReport| {}));
        handle.cancel();

        assert!(matches!(handle.join().await, Err(VisErr::Cancelled)));
    }

    #[tokio::test]
    async fn mismatched_dataset_is_rejected() {
        let mut job = job(1);
        job.predictor = Sequential::from_topology(
            &topology::resolve(&NetworkConfig::default(), None),
            1,
        )
        .unwrap();

        assert!(matches!(
            LocalTrainer.spawn(job, Box::new(|_: EpochReport| {})).join().await,
            Err(VisErr::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_losses_are_instabilities() {
        assert_eq!(finite("validation loss", 0.25, 3, 0).unwrap(), 0.25);

        for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                finite("validation loss", value, 3, 0),
                Err(VisErr::NumericInstability {
                    stage: "validation loss",
                    layer: 3,
                    index: 0,
                })
            ));
        }
    }
}
