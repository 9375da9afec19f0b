use ndarray::{Array2, ArrayView2, Zip};

use crate::config::LossKind;

/// Keeps logarithms away from zero.
const EPSILON: f32 = 1e-7;

pub trait LossFn {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

/// Mean squared error loss function.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (&y_pred - &y)
            .mapv(|x| x.powi(2))
            .mean()
            .unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        (&y_pred - &y) * (2.0 / y_pred.len() as f32)
    }
}

/// Cross entropy over one-hot targets, averaged over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoricalCrossEntropy;

impl LossFn for CategoricalCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let batch = y_pred.nrows().max(1) as f32;
        let total = Zip::from(&y_pred)
            .and(&y)
            .fold(0., |acc, &p, &t| acc - t * p.clamp(EPSILON, 1.).ln());
        total / batch
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let batch = y_pred.nrows().max(1) as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&p, &t| -t / p.clamp(EPSILON, 1.) / batch)
    }
}

/// Elementwise binary cross entropy, averaged over every output.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCrossEntropy;

impl LossFn for BinaryCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.len().max(1) as f32;
        let total = Zip::from(&y_pred).and(&y).fold(0., |acc, &p, &t| {
            let p = p.clamp(EPSILON, 1. - EPSILON);
            acc - (t * p.ln() + (1. - t) * (1. - p).ln())
        });
        total / n
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;
        Zip::from(&y_pred).and(&y).map_collect(|&p, &t| {
            let p = p.clamp(EPSILON, 1. - EPSILON);
            (p - t) / (p * (1. - p)) / n
        })
    }
}

/// Returns the loss function for a configured kind.
pub fn loss_fn(kind: LossKind) -> Box<dyn LossFn + Send + Sync> {
    match kind {
        LossKind::CategoricalCrossentropy => Box::new(CategoricalCrossEntropy),
        LossKind::MeanSquaredError => Box::new(Mse),
        LossKind::BinaryCrossentropy => Box::new(BinaryCrossEntropy),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn mse_of_identical_is_zero() {
        let y = array![[1., 0.], [0., 1.]];
        assert_eq!(Mse.loss(y.view(), y.view()), 0.);
        assert_eq!(Mse.loss(array![[0., 0.]].view(), array![[1., 1.]].view()), 1.);
    }

    #[test]
    fn cross_entropy_prefers_the_right_class() {
        let y = array![[0., 1.]];
        let good = CategoricalCrossEntropy.loss(array![[0.1, 0.9]].view(), y.view());
        let bad = CategoricalCrossEntropy.loss(array![[0.9, 0.1]].view(), y.view());

        assert!(good < bad);
        assert!((good + 0.9f32.ln()).abs() < 1e-6);

        let prime = CategoricalCrossEntropy.loss_prime(array![[0.5, 0.5]].view(), y.view());
        assert_eq!(prime, array![[0., -2.]]);
    }

    #[test]
    fn saturated_predictions_stay_finite() {
        let y = array![[1., 0.]];
        let p = array![[0., 1.]];

        assert!(CategoricalCrossEntropy.loss(p.view(), y.view()).is_finite());
        assert!(BinaryCrossEntropy.loss(p.view(), y.view()).is_finite());
        assert!(BinaryCrossEntropy
            .loss_prime(p.view(), y.view())
            .iter()
            .all(|v| v.is_finite()));
    }
}
