//! Default on-disk locations
//!
//! Everything lives under one data directory:
//!
//! ```text
//! <data_dir>/mixmatch/
//!     meta.json          track metadata
//!     index/             embeddings.db + paths.json
//!     settings.yaml
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::index::IndexFiles;

pub const SETTINGS_FILE: &str = "settings.yaml";

/// `<platform data dir>/mixmatch`, falling back to `./mixmatch-data`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("mixmatch"))
        .unwrap_or_else(|| PathBuf::from("mixmatch-data"))
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join(SETTINGS_FILE)
}

/// Where the library files live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    /// Metadata file; relative paths resolve against `data_dir`
    pub meta_file: PathBuf,
    /// Index directory; relative paths resolve against `data_dir`
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            meta_file: PathBuf::from("meta.json"),
            index_dir: PathBuf::from("index"),
        }
    }
}

impl PathsConfig {
    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.data_dir.join(p)
        }
    }

    pub fn meta_path(&self) -> PathBuf {
        self.resolve(&self.meta_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.index_dir)
    }

    pub fn index_files(&self) -> IndexFiles {
        IndexFiles::in_dir(&self.index_path())
    }
}
