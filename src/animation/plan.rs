use log::debug;
use ndarray::Array1;

use crate::{topology::Topology, Result, VisErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Timing and visual mapping constants of a plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanTiming {
    pub per_layer_delay_ms: u64,
    pub transition_ms: u64,
    pub base_radius: f64,
    pub radius_gain: f64,
    /// Opacity of a pulse leaving a fully activated neuron.
    pub pulse_opacity: f64,
}

impl Default for PlanTiming {
    fn default() -> Self {
        Self {
            per_layer_delay_ms: 500,
            transition_ms: 500,
            base_radius: 6.,
            radius_gain: 8.,
            pulse_opacity: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualValue {
    pub radius: f64,
    /// How far along the base to active color the neuron is, in `[0, 1]`.
    pub color_mix: f64,
    pub raw: f32,
}

/// A single scheduled neuron update, `at_ms` after the plan starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedStep {
    pub at_ms: u64,
    pub layer_index: usize,
    pub neuron_index: usize,
    pub visual: VisualValue,
}

/// A connection highlight, scheduled like a [`TimedStep`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPulse {
    pub at_ms: u64,
    pub duration_ms: u64,
    pub layer_index: usize,
    pub source_neuron: usize,
    pub target_neuron: usize,
    pub opacity: f64,
}

/// A fully computed, timer free animation timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationPlan {
    pub direction: Direction,
    /// Sorted by `at_ms`, then layer, then neuron.
    pub steps: Vec<TimedStep>,
    /// Sorted by `at_ms`, then layer, then source, then target. Empty for backward plans.
    pub pulses: Vec<ConnectionPulse>,
    pub transition_ms: u64,
    /// When the last transition ends.
    pub total_ms: u64,
}

impl AnimationPlan {
    /// Returns the steps of a layer.
    pub fn layer_steps(&self, layer_index: usize) -> impl Iterator<Item = &TimedStep> {
        self.steps
            .iter()
            .filter(move |s| s.layer_index == layer_index)
    }
}

/// Maps an activation to its radius and color.
pub fn visual(value: f32, timing: &PlanTiming) -> VisualValue {
    let v = value as f64;
    VisualValue {
        radius: (timing.base_radius + v * timing.radius_gain).max(0.),
        color_mix: v.clamp(0., 1.),
        raw: value,
    }
}

/// Builds the timeline for a trace of per layer values.
///
/// Forward plans reveal layer `i` at `i * per_layer_delay_ms` and pulse every
/// connection leaving it half a transition later. Backward plans reveal the last
/// layer first and walk back one delay per layer; their values are whatever
/// magnitudes the caller supplies.
///
/// # Arguments
/// * `trace` - One vector per layer.
/// * `topology` - The topology the trace was produced for.
/// * `direction` - Which way to walk the layers.
/// * `timing` - Delays and visual constants.
///
/// # Errors
/// `EmptyTrace` if `trace` has no layers, `ShapeMismatch` if it disagrees with
/// `topology`, `NumericInstability` if it holds a non-finite value.
pub fn build_plan(
    trace: &[Array1<f32>],
    topology: &Topology,
    direction: Direction,
    timing: &PlanTiming,
) -> Result<AnimationPlan> {
    if trace.is_empty() {
        return Err(VisErr::EmptyTrace);
    }

    if trace.len() != topology.layers.len() {
        return Err(VisErr::ShapeMismatch {
            what: "trace layers",
            got: trace.len(),
            expected: topology.layers.len(),
        });
    }

    for (layer, (values, spec)) in trace.iter().zip(&topology.layers).enumerate() {
        if values.len() != spec.neuron_count {
            return Err(VisErr::ShapeMismatch {
                what: "trace layer width",
                got: values.len(),
                expected: spec.neuron_count,
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(VisErr::NumericInstability {
                stage: "animation",
                layer,
                index,
            });
        }
    }

    let nlayers = trace.len();
    let delay = timing.per_layer_delay_ms;
    let layer_start = |layer: usize| match direction {
        Direction::Forward => layer as u64 * delay,
        Direction::Backward => (nlayers - 1 - layer) as u64 * delay,
    };

    let order: Vec<usize> = match direction {
        Direction::Forward => (0..nlayers).collect(),
        Direction::Backward => (0..nlayers).rev().collect(),
    };

    let steps: Vec<TimedStep> = order
        .iter()
        .flat_map(|&layer| {
            let at_ms = layer_start(layer);
            trace[layer]
                .iter()
                .enumerate()
                .map(move |(neuron_index, &value)| TimedStep {
                    at_ms,
                    layer_index: layer,
                    neuron_index,
                    visual: visual(value, timing),
                })
        })
        .collect();

    let pulses: Vec<ConnectionPulse> = match direction {
        Direction::Backward => Vec::new(),
        Direction::Forward => trace
            .windows(2)
            .enumerate()
            .flat_map(|(layer, pair)| {
                let at_ms = layer_start(layer) + timing.transition_ms / 2;
                let targets = pair[1].len();
                pair[0]
                    .iter()
                    .enumerate()
                    .flat_map(move |(source_neuron, &value)| {
                        let opacity = timing.pulse_opacity * visual(value, timing).color_mix;
                        (0..targets).map(move |target_neuron| ConnectionPulse {
                            at_ms,
                            duration_ms: timing.transition_ms / 2,
                            layer_index: layer,
                            source_neuron,
                            target_neuron,
                            opacity,
                        })
                    })
            })
            .collect(),
    };

    let total_ms = (nlayers as u64 - 1) * delay + timing.transition_ms;

    debug!(
        "built {direction:?} plan: {} steps, {} pulses, {total_ms} ms",
        steps.len(),
        pulses.len()
    );

    Ok(AnimationPlan {
        direction,
        steps,
        pulses,
        transition_ms: timing.transition_ms,
        total_ms,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::topology::{LayerActivation, LayerSpec};

    fn topology(sizes: &[usize]) -> Topology {
        Topology {
            layers: sizes
                .iter()
                .map(|&neuron_count| LayerSpec {
                    neuron_count,
                    activation: LayerActivation::Relu,
                })
                .collect(),
            input_size: sizes[0],
        }
    }

    fn trace() -> Vec<Array1<f32>> {
        vec![array![0., 1.], array![0.5, 2., -1.], array![0.25]]
    }

    #[test]
    fn values_map_to_radius_and_color() {
        let t = PlanTiming::default();

        assert_eq!(visual(0., &t).radius, 6.);
        assert_eq!(visual(1., &t).radius, 14.);
        assert_eq!(visual(2., &t).color_mix, 1.);
        assert_eq!(visual(-1., &t).color_mix, 0.);
        assert_eq!(visual(-1., &t).radius, 0.);
    }

    #[test]
    fn backward_starts_from_the_output() {
        let plan = build_plan(
            &trace(),
            &topology(&[2, 3, 1]),
            Direction::Backward,
            &PlanTiming::default(),
        )
        .unwrap();

        assert_eq!(plan.steps[0].layer_index, 2);
        assert_eq!(plan.steps[0].at_ms, 0);
        assert!(plan.layer_steps(1).all(|s| s.at_ms == 500));
        assert!(plan.layer_steps(0).all(|s| s.at_ms == 1000));
        assert!(plan.pulses.is_empty());
    }

    #[test]
    fn forward_pulses_follow_the_source() {
        let plan = build_plan(
            &trace(),
            &topology(&[2, 3, 1]),
            Direction::Forward,
            &PlanTiming::default(),
        )
        .unwrap();

        assert_eq!(plan.pulses.len(), 2 * 3 + 3);
        assert_eq!(plan.pulses[0].at_ms, 250);
        assert_eq!(plan.pulses[0].opacity, 0.);
        assert!((plan.pulses[3].opacity - 0.8).abs() < 1e-9);
        assert_eq!(plan.pulses[6].at_ms, 750);
        assert_eq!(plan.total_ms, 1500);
    }

    #[test]
    fn mismatched_traces_are_rejected() {
        let t = PlanTiming::default();

        assert!(matches!(
            build_plan(&[], &topology(&[1]), Direction::Forward, &t),
            Err(VisErr::EmptyTrace)
        ));
        assert!(matches!(
            build_plan(&trace(), &topology(&[2, 3]), Direction::Forward, &t),
            Err(VisErr::ShapeMismatch { .. })
        ));
        assert!(matches!(
            build_plan(&trace(), &topology(&[2, 2, 1]), Direction::Forward, &t),
            Err(VisErr::ShapeMismatch { got: 3, expected: 2, .. })
        ));
        assert!(matches!(
            build_plan(&[array![f32::NAN]], &topology(&[1]), Direction::Forward, &t),
            Err(VisErr::NumericInstability { .. })
        ));
    }
}
