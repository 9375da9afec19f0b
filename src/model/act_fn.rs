use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};

use crate::topology::LayerActivation;

/// The activation function a dense layer ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActFn {
    Relu,
    Sigmoid,
    Tanh,
    /// Row wise, not elementwise.
    Softmax,
}

use ActFn::*;

impl From<LayerActivation> for ActFn {
    fn from(act: LayerActivation) -> Self {
        match act {
            LayerActivation::Relu => Relu,
            LayerActivation::Sigmoid => Sigmoid,
            LayerActivation::Tanh => Tanh,
            LayerActivation::Softmax => Softmax,
        }
    }
}

impl ActFn {
    /// Applies the function to a single value. Softmax is the identity here, use
    /// [`ActFn::apply`] for it.
    pub fn f(&self, x: f32) -> f32 {
        match self {
            Relu => x.max(0.),
            Sigmoid => 1. / (1. + (-x).exp()),
            Tanh => x.tanh(),
            Softmax => x,
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Relu => {
                if x > 0. {
                    1.
                } else {
                    0.
                }
            }
            Sigmoid => {
                let s = self.f(x);
                s * (1. - s)
            }
            Tanh => 1. - x.tanh().powi(2),
            Softmax => 1.,
        }
    }

    /// Applies the function to a batch of pre-activations, one sample per row.
    pub fn apply(&self, z: ArrayView2<f32>) -> Array2<f32> {
        let mut a = z.to_owned();
        match self {
            Softmax => a.axis_iter_mut(Axis(0)).for_each(softmax),
            act => a.mapv_inplace(|x| act.f(x)),
        }
        a
    }

    /// Turns the loss gradient w.r.t. the activations into the gradient w.r.t. the
    /// pre-activations, in place.
    ///
    /// # Arguments
    /// * `z` - The cached pre-activations.
    /// * `a` - The cached activations.
    /// * `d` - The gradient w.r.t. `a`, overwritten with the gradient w.r.t. `z`.
    pub fn backward(&self, z: ArrayView2<f32>, a: ArrayView2<f32>, d: &mut Array2<f32>) {
        match self {
            Softmax => {
                for (mut d, a) in d.rows_mut().into_iter().zip(a.rows()) {
                    let dot = d.dot(&a);
                    d.zip_mut_with(&a, |d, &a| *d = a * (*d - dot));
                }
            }
            act => d.zip_mut_with(&z, |d, &z| *d *= act.df(z)),
        }
    }
}

fn softmax(mut row: ArrayViewMut1<f32>) {
    let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    row.mapv_inplace(|x| (x - max).exp());
    let sum = row.sum();
    row.mapv_inplace(|x| x / sum);
}
