use log::debug;
use ndarray::{Array1, ArrayView1};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{config::Activation, dataset::Dataset, model::Predictor, Result, VisErr};

/// Seed used when no explicit sample selector is given.
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

/// The per layer outputs of one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationSnapshot {
    pub layers: Vec<Array1<f32>>,
    /// The dataset row the pass was computed for, if it came from a dataset.
    pub sample_index: Option<usize>,
}

impl ActivationSnapshot {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Returns the output layer's values.
    pub fn output(&self) -> Option<&Array1<f32>> {
        self.layers.last()
    }
}

/// Decides which dataset row a forward pass runs on.
#[derive(Debug, Clone)]
pub enum SampleSelector {
    Pinned(usize),
    Random(StdRng),
}

impl Default for SampleSelector {
    fn default() -> Self {
        Self::seeded(DEFAULT_SAMPLE_SEED)
    }
}

impl SampleSelector {
    pub fn seeded(seed: u64) -> Self {
        SampleSelector::Random(StdRng::seed_from_u64(seed))
    }

    /// Picks a row among `count`, `None` if there's nothing valid to pick.
    pub fn pick(&mut self, count: usize) -> Option<usize> {
        match self {
            SampleSelector::Pinned(index) => (*index < count).then_some(*index),
            SampleSelector::Random(_) if count == 0 => None,
            SampleSelector::Random(rng) => Some(rng.random_range(0..count)),
        }
    }
}

/// Runs a single sample through the predictor, recording every layer's output.
///
/// After each hidden layer the configured activation is applied, the terminal
/// layer's output is kept as the predictor returns it.
///
/// # Arguments
/// * `predictor` - The live predictor, if one was built.
/// * `sample` - The input row, if one was picked.
/// * `activation` - The hidden activation of the config.
///
/// # Errors
/// `NotReady` without predictor or sample, `ShapeMismatch` if the sample width
/// differs from the predictor's input, `NumericInstability` on the first
/// non-finite value.
pub fn forward(
    predictor: Option<&dyn Predictor>,
    sample: Option<ArrayView1<f32>>,
    activation: Activation,
) -> Result<ActivationSnapshot> {
    let predictor = predictor.ok_or(VisErr::NotReady("no model has been built"))?;
    let sample = sample.ok_or(VisErr::NotReady("no sample to run"))?;

    if sample.len() != predictor.input_size() {
        return Err(VisErr::ShapeMismatch {
            what: "sample",
            got: sample.len(),
            expected: predictor.input_size(),
        });
    }

    let sizes = predictor.layer_sizes();
    let last = sizes.len().saturating_sub(1);
    let mut layers = Vec::with_capacity(sizes.len());
    let mut input = sample.to_owned();

    for (layer, &size) in sizes.iter().enumerate() {
        let mut out = predictor.apply_layer(layer, input.view())?;
        if out.len() != size {
            return Err(VisErr::ShapeMismatch {
                what: "layer output",
                got: out.len(),
                expected: size,
            });
        }

        if layer < last {
            out.mapv_inplace(|z| activation.f(z));
        }

        if let Some(index) = out.iter().position(|v| !v.is_finite()) {
            return Err(VisErr::NumericInstability {
                stage: "forward",
                layer,
                index,
            });
        }

        layers.push(out.clone());
        input = out;
    }

    Ok(ActivationSnapshot {
        layers,
        sample_index: None,
    })
}

/// Picks dataset rows and runs forward passes on them.
#[derive(Debug, Clone, Default)]
pub struct ForwardSimulator {
    selector: SampleSelector,
}

impl ForwardSimulator {
    pub fn new(selector: SampleSelector) -> Self {
        Self { selector }
    }

    /// Picks a row of `dataset` and runs it through `predictor`.
    ///
    /// # Errors
    /// `NotReady` if there's no dataset or the selector can't pick a row, plus the
    /// errors of [`forward`].
    pub fn run(
        &mut self,
        predictor: Option<&dyn Predictor>,
        dataset: Option<&Dataset>,
        activation: Activation,
    ) -> Result<ActivationSnapshot> {
        let dataset = dataset.ok_or(VisErr::NotReady("no dataset loaded"))?;
        let index = self
            .selector
            .pick(dataset.sample_count())
            .ok_or(VisErr::NotReady("sample index out of range"))?;

        let mut snapshot = forward(predictor, dataset.sample(index), activation)?;
        snapshot.sample_index = Some(index);

        debug!(sample = index; "forward pass over {} layers", snapshot.layer_count());
        Ok(snapshot)
    }
}
