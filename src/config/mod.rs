mod json;
mod manager;
mod network;
mod update;

pub use json::{load_config, parse_config, save_config};
pub use manager::ConfigManager;
pub use network::{
    Activation, LossKind, NetworkConfig, OptimizerKind, MAX_BATCH_SIZE, MAX_EPOCHS, MAX_LAYERS,
    MAX_NEURONS, MAX_VALIDATION_SPLIT,
};
pub use update::ConfigUpdate;
