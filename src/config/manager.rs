use log::{debug, warn};
use tokio::sync::watch;

use super::{ConfigUpdate, NetworkConfig};
use crate::{dataset::Dataset, topology, Result};

/// Owns the committed [`NetworkConfig`] of a session.
///
/// Every change is computed on a copy and committed with a single replace, so
/// readers (direct or through [`ConfigManager::subscribe`]) only ever observe fully
/// committed configs.
#[derive(Debug)]
pub struct ConfigManager {
    tx: watch::Sender<NetworkConfig>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl ConfigManager {
    /// Creates a new `ConfigManager`.
    ///
    /// # Arguments
    /// * `initial` - The config to start the session with.
    pub fn new(initial: NetworkConfig) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Returns a copy of the committed config.
    pub fn current(&self) -> NetworkConfig {
        self.tx.borrow().clone()
    }

    /// Returns a receiver notified on every commit.
    pub fn subscribe(&self) -> watch::Receiver<NetworkConfig> {
        self.tx.subscribe()
    }

    /// Validates and commits a single field update.
    ///
    /// # Arguments
    /// * `update` - The change requested by the user.
    ///
    /// # Returns
    /// The newly committed config, or a `Validation` error in which case nothing
    /// was committed.
    pub fn update(&self, update: ConfigUpdate) -> Result<NetworkConfig> {
        let field = update.field();
        let next = match self.current().apply(update) {
            Ok(next) => next,
            Err(e) => {
                warn!("rejected config update: {e}");
                return Err(e);
            }
        };

        debug!(field = field; "committing config update");
        self.tx.send_replace(next.clone());
        Ok(next)
    }

    /// Replaces the whole config with an already validated one.
    pub fn replace(&self, config: NetworkConfig) -> Result<NetworkConfig> {
        config.validate()?;
        self.tx.send_replace(config.clone());
        Ok(config)
    }

    /// Applies the one-time three layer suggestion for a freshly loaded dataset.
    ///
    /// # Arguments
    /// * `dataset` - The dataset that was just loaded.
    ///
    /// # Returns
    /// The newly committed config.
    pub fn apply_dataset_defaults(&self, dataset: &Dataset) -> NetworkConfig {
        let mut next = self.current();
        next.neurons_per_layer = topology::recommend(dataset);
        next.layer_count = next.neurons_per_layer.len();

        debug!(
            "dataset defaults for '{}': {:?}",
            dataset.name(),
            next.neurons_per_layer
        );
        self.tx.send_replace(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::VisErr;

    #[test]
    fn rejected_update_leaves_config_untouched() {
        let manager = ConfigManager::default();
        let before = manager.current();

        let err = manager.update(ConfigUpdate::Epochs(0)).unwrap_err();
        assert!(matches!(err, VisErr::Validation { field: "epochs", .. }));
        assert_eq!(manager.current(), before);
    }

    #[test]
    fn subscribers_see_the_committed_resize() {
        let manager = ConfigManager::default();
        let mut rx = manager.subscribe();

        manager.update(ConfigUpdate::LayerCount(5)).unwrap();

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.layer_count, 5);
        assert_eq!(seen.neurons_per_layer, vec![4, 5, 3, 1, 1]);
    }

    #[test]
    fn dataset_defaults_use_recommended_shape() {
        let manager = ConfigManager::default();
        manager.update(ConfigUpdate::LayerCount(6)).unwrap();

        let dataset = Dataset::new("iris", Array2::zeros((4, 4)), Array2::zeros((4, 3))).unwrap();
        let config = manager.apply_dataset_defaults(&dataset);

        assert_eq!(config.layer_count, 3);
        assert_eq!(config.neurons_per_layer, vec![4, 4, 3]);
        assert_eq!(manager.current(), config);
    }
}
