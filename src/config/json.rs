use std::{fs, path::Path};

use super::NetworkConfig;
use crate::Result;

/// Parses a [`NetworkConfig`] from JSON text.
///
/// Missing fields take their default values, the result is validated before
/// being returned.
///
/// # Errors
/// `Json` if the text can't be parsed, `Validation` if a value is out of range.
pub fn parse_config(content: &str) -> Result<NetworkConfig> {
    let val: serde_json::Value = serde_json::from_str(content)?;
    let mut merged = serde_json::to_value(NetworkConfig::default())?;

    if let (Some(base), Some(overrides)) = (merged.as_object_mut(), val.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }

    let mut config: NetworkConfig = serde_json::from_value(merged)?;

    // Only the list was given, the count follows it.
    if val.get("layerCount").is_none() && val.get("neuronsPerLayer").is_some() {
        config.layer_count = config.neurons_per_layer.len();
    }

    config.validate()?;
    Ok(config)
}

/// Loads a [`NetworkConfig`] from a JSON file.
///
/// # Errors
/// `Io` if the file can't be read, plus the errors of [`parse_config`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<NetworkConfig> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Writes a [`NetworkConfig`] as pretty printed JSON.
pub fn save_config<P: AsRef<Path>>(path: P, config: &NetworkConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
