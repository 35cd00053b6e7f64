//! YAML settings persistence
//!
//! Works with any serde type that has a sensible `Default`, so a missing or
//! broken settings file never stops the tool from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read settings from a YAML file.
///
/// A missing file gives `T::default()`. An unreadable or unparseable file
/// is logged at warn level and also gives `T::default()`.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} not found, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: cannot read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("load_config: loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: invalid YAML in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write settings as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create settings directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write settings file {:?}", path))?;

    log::info!("save_config: wrote {:?}", path);
    Ok(())
}
