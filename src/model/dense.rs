use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

use super::ActFn;
use crate::{Result, VisErr};

/// A fully connected layer whose weights and biases live in an external flat
/// parameter slice: `in * out` weights in row major order followed by `out` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: ActFn,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output widths.
    /// * `act_fn` - The function applied to the affine output.
    pub fn new(dim: (usize, usize), act_fn: ActFn) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            act_fn,
            size: (dim.0 + 1) * dim.1,
            x: zeros.clone(),
            z: zeros.clone(),
            a: zeros,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn act_fn(&self) -> ActFn {
        self.act_fn
    }

    /// Computes `x · W + b` for a single sample without touching the caches.
    pub fn affine(&self, params: &[f32], x: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.check_input(x.len())?;
        let (w, b) = self.view_params(params)?;
        Ok(x.dot(&w) + b)
    }

    /// Computes the activated output for a batch without touching the caches.
    pub fn infer(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(x.ncols())?;
        let (w, b) = self.view_params(params)?;
        let z = x.dot(&w) + b;
        Ok(self.act_fn.apply(z.view()))
    }

    /// Computes the activated output for a batch, caching what [`Dense::backward`]
    /// needs.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(x.ncols())?;
        let (w, b) = self.view_params(params)?;

        self.z = x.dot(&w) + b;
        self.a = self.act_fn.apply(self.z.view());
        self.x = x.to_owned();

        Ok(self.a.clone())
    }

    /// Back propagates through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's slot of the gradient, overwritten.
    /// * `d` - The loss gradient w.r.t. this layer's output.
    ///
    /// # Returns
    /// The loss gradient w.r.t. this layer's input.
    pub fn backward(&self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<Array2<f32>> {
        if d.dim() != self.a.dim() {
            return Err(VisErr::ShapeMismatch {
                what: "layer delta",
                got: d.ncols(),
                expected: self.a.ncols(),
            });
        }

        self.act_fn.backward(self.z.view(), self.a.view(), &mut d);

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&self.x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn check_input(&self, got: usize) -> Result<()> {
        if got != self.dim.0 {
            return Err(VisErr::ShapeMismatch {
                what: "layer input",
                got,
                expected: self.dim.0,
            });
        }
        Ok(())
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.size - self.dim.1;
        let mismatch = || VisErr::ShapeMismatch {
            what: "layer parameters",
            got: params.len(),
            expected: self.size,
        };

        if params.len() != self.size {
            return Err(mismatch());
        }

        let weights = ArrayView2::from_shape(self.dim, &params[..w_size]).map_err(|_| mismatch())?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..]).map_err(|_| mismatch())?;
        Ok((weights, biases))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_size = self.size - self.dim.1;
        let mismatch = VisErr::ShapeMismatch {
            what: "layer gradient",
            got: grad.len(),
            expected: self.size,
        };

        if grad.len() != self.size {
            return Err(mismatch);
        }

        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        match (
            ArrayViewMut2::from_shape(self.dim, dw_raw),
            ArrayViewMut1::from_shape(self.dim.1, db_raw),
        ) {
            (Ok(dw), Ok(db)) => Ok((dw, db)),
            _ => Err(mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    // 2 -> 2, w = [[1, 2], [3, 4]], b = [0.5, -10]
    const PARAMS: [f32; 6] = [1., 2., 3., 4., 0.5, -10.];

    #[test]
    fn affine_is_xw_plus_b() {
        let dense = Dense::new((2, 2), ActFn::Relu);
        let z = dense.affine(&PARAMS, array![1., 1.].view()).unwrap();

        assert_eq!(z.to_vec(), vec![4.5, -4.]);
    }

    #[test]
    fn forward_applies_the_activation() {
        let mut dense = Dense::new((2, 2), ActFn::Relu);
        let a = dense.forward(&PARAMS, array![[1., 1.]].view()).unwrap();

        assert_eq!(a, array![[4.5, 0.]]);
        assert_eq!(dense.infer(&PARAMS, array![[1., 1.]].view()).unwrap(), a);
    }

    #[test]
    fn backward_fills_the_gradient() {
        let mut dense = Dense::new((2, 2), ActFn::Relu);
        dense.forward(&PARAMS, array![[1., 2.]].view()).unwrap();

        let mut grad = [0.; 6];
        let dx = dense.backward(&PARAMS, &mut grad, array![[1., 1.]]).unwrap();

        // second output is dead under relu: z = 2 + 8 - 10
        assert_eq!(grad, [1., 0., 2., 0., 1., 0.]);
        assert_eq!(dx, array![[1., 3.]]);
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let dense = Dense::new((2, 2), ActFn::Relu);
        let err = dense.affine(&PARAMS, array![1., 2., 3.].view()).unwrap_err();

        assert!(matches!(err, VisErr::ShapeMismatch { got: 3, expected: 2, .. }));
    }
}
