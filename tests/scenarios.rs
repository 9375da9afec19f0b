use ndarray::{Array1, Array2};
use neural_network_visualization::{
    animation::{build_plan, Direction, PlanTiming},
    config::{Activation, ConfigManager, ConfigUpdate, NetworkConfig},
    dataset::Dataset,
    layout::{layout, LayoutOptions},
    model::{Predictor, Sequential},
    simulation::forward,
    topology::{resolve, LayerActivation, LayerSpec, Topology},
    VisErr,
};

fn config(neurons: &[usize]) -> NetworkConfig {
    NetworkConfig {
        layer_count: neurons.len(),
        neurons_per_layer: neurons.to_vec(),
        ..Default::default()
    }
}

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
fn resolve_without_dataset_keeps_the_config() {
    let topology = resolve(&config(&[4, 5, 3]), None);

    assert_eq!(topology.sizes(), vec![4, 5, 3]);
    assert_eq!(topology.input_size, 4);
}

#[test]
fn resolve_with_dataset_forces_input_and_output() {
    let dataset = Dataset::new("b", Array2::zeros((4, 6)), Array2::zeros((4, 2))).unwrap();
    let config = NetworkConfig {
        activation: Activation::Tanh,
        ..config(&[4, 5, 3])
    };

    let topology = resolve(&config, Some(&dataset));

    assert_eq!(topology.sizes(), vec![6, 5, 2]);
    assert_eq!(topology.layers[1].activation, LayerActivation::Tanh);
    assert_eq!(topology.layers[2].activation, LayerActivation::Softmax);
}

#[test]
fn resolve_is_pure() {
    let config = config(&[3, 7, 2, 2]);
    let before = config.clone();

    let first = resolve(&config, None);
    let second = resolve(&config, None);

    assert_eq!(first, second);
    assert_eq!(config, before);
}

#[test]
fn layout_spreads_layers_between_paddings() {
    let layout = layout(&topology(&[2, 3]), 300., 200., &LayoutOptions::default()).unwrap();

    assert!(layout.layers[0].iter().all(|p| p.x == 50.));
    assert!(layout.layers[1].iter().all(|p| p.x == 250.));
    assert_eq!(layout.connections.len(), 6);
}

#[test]
fn layout_counts_match_the_topology() {
    let shapes: [&[usize]; 5] = [&[1], &[1, 1], &[4, 5, 3], &[10, 1, 10], &[2, 8, 8, 8, 2]];
    let options = LayoutOptions::default();

    for sizes in shapes {
        let topology = topology(sizes);
        let first = layout(&topology, 640., 480., &options).unwrap();
        let second = layout(&topology, 640., 480., &options).unwrap();

        assert_eq!(first.positions().count(), topology.neuron_count(), "{sizes:?}");
        assert_eq!(first.connections.len(), topology.connection_count(), "{sizes:?}");

        for (a, b) in first.positions().zip(second.positions()) {
            assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
        }
    }
}

#[test]
fn layout_rejects_empty_viewports() {
    let err = layout(&topology(&[2, 2]), 0., 200., &LayoutOptions::default()).unwrap_err();
    assert!(matches!(err, VisErr::InvalidDimensions { .. }));
}

#[test]
fn growing_the_layer_count_pads_with_single_neurons() {
    let manager = ConfigManager::new(config(&[4, 5, 3]));

    let config = manager.update(ConfigUpdate::LayerCount(5)).unwrap();

    assert_eq!(config.neurons_per_layer, vec![4, 5, 3, 1, 1]);
    assert_eq!(config.layer_count, 5);
}

#[test]
fn layer_count_always_matches_the_neuron_list() {
    for n in 1..=10 {
        let next = config(&[4, 5, 3]).apply(ConfigUpdate::LayerCount(n)).unwrap();

        assert_eq!(next.neurons_per_layer.len(), n);
        let kept = n.min(3);
        assert_eq!(next.neurons_per_layer[..kept], [4, 5, 3][..kept]);
    }
}

#[test]
fn forward_plan_steps_are_grouped_by_layer() {
    let topology = topology(&[4, 5, 3]);
    let trace: Vec<Array1<f32>> = topology
        .sizes()
        .into_iter()
        .map(|n| Array1::from_elem(n, 0.5))
        .collect();

    let plan = build_plan(&trace, &topology, Direction::Forward, &PlanTiming::default()).unwrap();

    let at: Vec<u64> = plan.steps.iter().map(|s| s.at_ms).collect();
    let expected: Vec<u64> = [(0, 4), (500, 5), (1000, 3)]
        .into_iter()
        .flat_map(|(t, n)| std::iter::repeat(t).take(n))
        .collect();
    assert_eq!(at, expected);

    for layer in 0..3 {
        assert!(plan.layer_steps(layer).all(|s| s.at_ms == layer as u64 * 500));
    }
}

#[test]
fn forward_passes_stay_finite() {
    let activations = [Activation::Relu, Activation::Sigmoid, Activation::Tanh];

    for (seed, activation) in (0..12).zip(activations.into_iter().cycle()) {
        let topology = resolve(
            &NetworkConfig {
                activation,
                ..config(&[4, 16, 8, 3])
            },
            None,
        );
        let predictor = Sequential::from_topology(&topology, seed).unwrap();
        let sample = Array1::<f32>::linspace(-3., 3., predictor.input_size());

        match forward(Some(&predictor as &dyn Predictor), Some(sample.view()), activation) {
            Ok(snapshot) => {
                assert_eq!(snapshot.layer_count(), 4);
                assert!(snapshot.layers.iter().flatten().all(|v| v.is_finite()));
            }
            Err(e) => assert!(matches!(e, VisErr::NumericInstability { .. }), "{e}"),
        }
    }
}
