mod resolver;

pub use resolver::{recommend, resolve, LayerActivation, LayerSpec, Topology};
