use serde::Serialize;

use crate::{topology::Topology, Result, VisErr};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NeuronPosition {
    pub x: f64,
    pub y: f64,
    pub layer_index: usize,
    pub neuron_index: usize,
}

/// A drawable edge between two neurons of adjacent layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Connection {
    pub source: NeuronPosition,
    pub target: NeuronPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutOptions {
    pub horizontal_padding: f64,
    pub vertical_padding: f64,
    pub neuron_radius: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            horizontal_padding: 50.,
            vertical_padding: 50.,
            neuron_radius: 10.,
        }
    }
}

/// The 2D coordinates of a topology for a given viewport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    /// One entry per layer, one position per neuron.
    pub layers: Vec<Vec<NeuronPosition>>,
    /// Ordered by layer, then target neuron, then source neuron.
    pub connections: Vec<Connection>,
    pub neuron_radius: f64,
    pub width: f64,
    pub height: f64,
}

impl Layout {
    /// Iterates over every neuron position, layer by layer.
    pub fn positions(&self) -> impl Iterator<Item = &NeuronPosition> {
        self.layers.iter().flatten()
    }

    pub fn position(&self, layer_index: usize, neuron_index: usize) -> Option<&NeuronPosition> {
        self.layers.get(layer_index)?.get(neuron_index)
    }
}

/// Computes the position of every neuron and connection of `topology`.
///
/// Layers are spread evenly along x between the horizontal paddings, a single
/// layer is centered. Neurons are spread evenly along y between the vertical
/// paddings, a single neuron sits at the top padding.
///
/// # Arguments
/// * `topology` - The structure to lay out.
/// * `width` - The viewport width.
/// * `height` - The viewport height.
/// * `options` - Paddings and neuron radius.
///
/// # Errors
/// `InvalidDimensions` if the viewport isn't strictly positive, `InvalidTopology`
/// if there are no layers.
pub fn layout(
    topology: &Topology,
    width: f64,
    height: f64,
    options: &LayoutOptions,
) -> Result<Layout> {
    if !(width.is_finite() && height.is_finite() && width > 0. && height > 0.) {
        return Err(VisErr::InvalidDimensions { width, height });
    }

    let layer_count = topology.layers.len();
    if layer_count == 0 {
        return Err(VisErr::InvalidTopology);
    }

    let hp = options.horizontal_padding;
    let vp = options.vertical_padding;
    let x_step = (width - 2. * hp) / (layer_count.max(2) - 1) as f64;

    let layers: Vec<Vec<NeuronPosition>> = topology
        .layers
        .iter()
        .enumerate()
        .map(|(layer_index, spec)| {
            let x = if layer_count == 1 {
                width / 2.
            } else {
                hp + layer_index as f64 * x_step
            };
            let n = spec.neuron_count;
            let y_step = (height - 2. * vp) / (n.max(2) - 1) as f64;

            (0..n)
                .map(|neuron_index| NeuronPosition {
                    x,
                    y: vp + neuron_index as f64 * y_step,
                    layer_index,
                    neuron_index,
                })
                .collect()
        })
        .collect();

    let connections = layers
        .windows(2)
        .flat_map(|pair| {
            let (sources, targets) = (&pair[0], &pair[1]);
            targets.iter().flat_map(move |&target| {
                sources
                    .iter()
                    .map(move |&source| Connection { source, target })
            })
        })
        .collect();

    Ok(Layout {
        layers,
        connections,
        neuron_radius: options.neuron_radius,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
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

    #[test]
    fn two_layers_span_the_padded_width() {
        let layout = layout(&topology(&[2, 3]), 300., 200., &LayoutOptions::default()).unwrap();

        assert!(layout.layers[0].iter().all(|p| p.x == 50.));
        assert!(layout.layers[1].iter().all(|p| p.x == 250.));
        assert_eq!(layout.connections.len(), 6);

        let ys: Vec<f64> = layout.layers[1].iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![50., 100., 150.]);
    }

    #[test]
    fn connections_are_ordered_by_target_then_source() {
        let layout = layout(&topology(&[2, 2]), 300., 200., &LayoutOptions::default()).unwrap();
        let order: Vec<(usize, usize)> = layout
            .connections
            .iter()
            .map(|c| (c.target.neuron_index, c.source.neuron_index))
            .collect();

        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn single_layer_and_single_neuron() {
        let layout = layout(&topology(&[1]), 300., 200., &LayoutOptions::default()).unwrap();

        assert_eq!(layout.layers[0][0].x, 150.);
        assert_eq!(layout.layers[0][0].y, 50.);
        assert!(layout.connections.is_empty());
    }

    #[test]
    fn degenerate_input_is_rejected() {
        let opts = LayoutOptions::default();

        assert!(matches!(
            layout(&topology(&[2]), 0., 100., &opts),
            Err(VisErr::InvalidDimensions { .. })
        ));
        assert!(matches!(
            layout(&topology(&[2]), 100., f64::NAN, &opts),
            Err(VisErr::InvalidDimensions { .. })
        ));

        let empty = Topology {
            layers: vec![],
            input_size: 0,
        };
        assert!(matches!(
            layout(&empty, 100., 100., &opts),
            Err(VisErr::InvalidTopology)
        ));
    }
}
