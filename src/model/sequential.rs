use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_rand::RandomExt;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::Normal;

use super::{ActFn, Dense};
use crate::{topology::Topology, Result, VisErr};

/// Something that can run a single sample through a network one layer at a time.
pub trait Predictor {
    /// The width of the vector the first layer expects.
    fn input_size(&self) -> usize;

    /// The output width of every layer, in order.
    fn layer_sizes(&self) -> Vec<usize>;

    /// Runs layer `index` on `x`.
    ///
    /// Hidden layers return their affine output, the caller applies the hidden
    /// activation. The terminal layer returns its activated output.
    ///
    /// # Errors
    /// `ShapeMismatch` if `x` or `index` don't fit the network.
    fn apply_layer(&self, index: usize, x: ArrayView1<f32>) -> Result<Array1<f32>>;
}

/// A sequential stack of dense layers sharing one flat parameter buffer.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
    params: Vec<f32>,
    offsets: Vec<usize>,
    input_size: usize,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `params` - The parameters of every layer, back to back.
    ///
    /// # Errors
    /// `InvalidTopology` if there are no layers, `ShapeMismatch` if adjacent widths
    /// or the amount of parameters don't match.
    pub fn new(layers: Vec<Dense>, params: Vec<f32>) -> Result<Self> {
        let first = layers.first().ok_or(VisErr::InvalidTopology)?;
        let input_size = first.dim().0;

        for pair in layers.windows(2) {
            if pair[0].dim().1 != pair[1].dim().0 {
                return Err(VisErr::ShapeMismatch {
                    what: "adjacent layers",
                    got: pair[1].dim().0,
                    expected: pair[0].dim().1,
                });
            }
        }

        let offsets: Vec<usize> = layers
            .iter()
            .scan(0, |acc, layer| {
                let start = *acc;
                *acc += layer.size();
                Some(start)
            })
            .collect();

        let size: usize = layers.iter().map(Dense::size).sum();
        if params.len() != size {
            return Err(VisErr::ShapeMismatch {
                what: "parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(Self {
            layers,
            params,
            offsets,
            input_size,
        })
    }

    /// Builds a freshly initialized network for a topology.
    ///
    /// Weights are drawn from a He normal distribution for relu layers and a
    /// Xavier normal one otherwise, biases start at zero.
    ///
    /// # Arguments
    /// * `topology` - The structure to build.
    /// * `seed` - Seed for the weight initialization.
    pub fn from_topology(topology: &Topology, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut fan_in = topology.input_size;
        let mut layers = Vec::with_capacity(topology.layers.len());
        let mut params = Vec::new();

        for spec in &topology.layers {
            let act_fn = ActFn::from(spec.activation);
            let fan_out = spec.neuron_count;

            let std = match act_fn {
                ActFn::Relu => (2. / fan_in as f32).sqrt(),
                _ => (2. / (fan_in + fan_out) as f32).sqrt(),
            };
            let normal = Normal::new(0., std).map_err(|_| VisErr::InvalidTopology)?;
            let w = Array2::<f32>::random_using((fan_in, fan_out), normal, &mut rng);

            params.extend(w.iter());
            params.resize(params.len() + fan_out, 0.);
            layers.push(Dense::new((fan_in, fan_out), act_fn));
            fan_in = fan_out;
        }

        Self::new(layers, params)
    }

    /// Returns the total amount of parameters.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    /// Makes a forward pass through the network, caching intermediate values for
    /// [`Sequential::backward`].
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut out = x.to_owned();

        for (layer, &offset) in self.layers.iter_mut().zip(&self.offsets) {
            let params = &self.params[offset..offset + layer.size()];
            out = layer.forward(params, out.view())?;
        }

        Ok(out)
    }

    /// Makes a forward pass without caching, for evaluation.
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut out = x.to_owned();

        for (i, layer) in self.layers.iter().enumerate() {
            out = layer.infer(self.layer_params(i), out.view())?;
        }

        Ok(out)
    }

    /// Back propagates the loss gradient of the last [`Sequential::forward`] call.
    ///
    /// # Arguments
    /// * `d` - The loss gradient w.r.t. the network's output.
    /// * `grad` - The gradient buffer, as long as the parameters, overwritten.
    pub fn backward(&self, mut d: Array2<f32>, grad: &mut [f32]) -> Result<()> {
        if grad.len() != self.params.len() {
            return Err(VisErr::ShapeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.params.len(),
            });
        }

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let offset = self.offsets[i];
            let slot = &mut grad[offset..offset + layer.size()];
            d = layer.backward(self.layer_params(i), slot, d)?;
        }

        Ok(())
    }

    fn layer_params(&self, index: usize) -> &[f32] {
        let offset = self.offsets[index];
        &self.params[offset..offset + self.layers[index].size()]
    }
}

impl Predictor for Sequential {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.dim().1).collect()
    }

    fn apply_layer(&self, index: usize, x: ArrayView1<f32>) -> Result<Array1<f32>> {
        let layer = self.layers.get(index).ok_or(VisErr::ShapeMismatch {
            what: "layer index",
            got: index,
            expected: self.layers.len(),
        })?;

        let z = layer.affine(self.layer_params(index), x)?;
        if index + 1 < self.layers.len() {
            return Ok(z);
        }

        let a = layer.act_fn().apply(z.insert_axis(ndarray::Axis(0)).view());
        Ok(a.row(0).to_owned())
    }
}
