use crate::{config::OptimizerKind, Result, VisErr};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the gradient.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

fn check_sizes(grad: &[f32], params: &[f32], expected: usize) -> Result<()> {
    if grad.len() != params.len() || params.len() != expected {
        return Err(VisErr::ShapeMismatch {
            what: "gradient",
            got: grad.len(),
            expected,
        });
    }
    Ok(())
}

/// Plain stochastic gradient descent.
#[derive(Debug)]
pub struct Sgd {
    learning_rate: f32,
    len: usize,
}

impl Sgd {
    pub fn new(len: usize, learning_rate: f32) -> Self {
        Self { learning_rate, len }
    }
}

impl Optimizer for Sgd {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params, self.len)?;

        let lr = self.learning_rate;
        params.iter_mut().zip(grad).for_each(|(p, g)| *p -= lr * g);
        Ok(())
    }
}

/// Scales every parameter's step by bias corrected running moments of its
/// gradient.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    /// Decay of the first and second moment.
    betas: (f32, f32),
    epsilon: f32,
    step: i32,
    /// First and second moment of every parameter.
    moments: Box<[(f32, f32)]>,
}

impl Adam {
    pub fn new(len: usize, learning_rate: f32, betas: (f32, f32), epsilon: f32) -> Self {
        Self {
            learning_rate,
            betas,
            epsilon,
            step: 0,
            moments: vec![(0., 0.); len].into_boxed_slice(),
        }
    }

    /// The learning rate with both bias corrections of the current step folded in.
    fn corrected_rate(&self) -> f32 {
        let (b1, b2) = self.betas;
        let c1 = 1. - b1.powi(self.step);
        let c2 = 1. - b2.powi(self.step);

        self.learning_rate * c2.sqrt() / c1
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params, self.moments.len())?;

        self.step = self.step.saturating_add(1);
        let rate = self.corrected_rate();
        let (b1, b2) = self.betas;
        let eps = self.epsilon;

        for ((p, &g), (m, v)) in params.iter_mut().zip(grad).zip(self.moments.iter_mut()) {
            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;
            *p -= rate * *m / (v.sqrt() + eps);
        }

        Ok(())
    }
}

/// Divides the step by a running average of the squared gradient.
#[derive(Debug)]
pub struct RmsProp {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    s: Box<[f32]>,
}

impl RmsProp {
    pub fn new(len: usize, learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            s: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for RmsProp {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params, self.s.len())?;

        let Self {
            learning_rate: lr,
            rho,
            epsilon: eps,
            ..
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.s.iter_mut())
            .for_each(|((p, g), s)| {
                *s = rho * *s + (1. - rho) * g.powi(2);
                *p -= lr * g / (s.sqrt() + eps);
            });

        Ok(())
    }
}

/// Builds the optimizer for a configured kind with the usual default
/// hyperparameters.
///
/// # Arguments
/// * `kind` - The configured optimizer.
/// * `len` - The amount of parameters to optimize.
/// * `learning_rate` - The configured learning rate.
pub fn optimizer(kind: OptimizerKind, len: usize, learning_rate: f32) -> Box<dyn Optimizer + Send> {
    match kind {
        OptimizerKind::Sgd => Box::new(Sgd::new(len, learning_rate)),
        OptimizerKind::Adam => Box::new(Adam::new(len, learning_rate, (0.9, 0.999), 1e-7)),
        OptimizerKind::Rmsprop => Box::new(RmsProp::new(len, learning_rate, 0.9, 1e-7)),
    }
}
