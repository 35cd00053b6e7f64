//! Settings for the recommendation tool
//!
//! ```yaml
//! paths:
//!   data_dir: /home/dj/.local/share/mixmatch
//!   meta_file: meta.json
//!   index_dir: index
//! index:
//!   dim: 1024
//!   m: 32
//!   ef_construction: 200
//!   ef_search: 64
//! recommend:
//!   top_n: 25
//!   tempo_tolerance_pct: 6.0
//!   allow_doubletime: true
//!   require_camelot_compatible: true
//!   weights: { ann: 0.6, samples: 0.1, bass: 0.1, rhythm: 0.1, bpm: 0.05, key: 0.05 }
//! ```
//!
//! Every section and field is optional.

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_data_dir, PathsConfig, SETTINGS_FILE};

use serde::{Deserialize, Serialize};

use crate::index::IndexSettings;
use crate::recommend::RecommendOptions;

/// Top-level settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixmatchConfig {
    pub paths: PathsConfig,
    pub index: IndexSettings,
    pub recommend: RecommendOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::KeyRelation;
    use crate::recommend::Weights;

    #[test]
    fn test_defaults() {
        let config = MixmatchConfig::default();
        assert_eq!(config.recommend.top_n, 25);
        assert_eq!(config.recommend.tempo_tolerance_pct, 6.0);
        assert!(config.recommend.allow_doubletime);
        assert!(config.recommend.require_camelot_compatible);
        // Pure distance ranking until weights are configured
        assert!(config.recommend.weights.is_unweighted());
        assert_eq!(config.index.ef_search, 64);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
index:
  dim: 512
recommend:
  top_n: 10
  allowed_key_relations: [same, neighbor]
  weights:
    ann: 1.0
"#;
        let config: MixmatchConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.index.dim, Some(512));
        assert_eq!(config.index.m, 32);
        assert_eq!(config.recommend.top_n, 10);
        assert_eq!(
            config.recommend.allowed_key_relations,
            vec![KeyRelation::Same, KeyRelation::Neighbor]
        );
        assert_eq!(config.recommend.weights, Weights::ann_only());
        assert!(config.recommend.require_camelot_compatible);
        assert_eq!(config.paths, PathsConfig::default());
    }
}
