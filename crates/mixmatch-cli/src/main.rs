//! Mixmatch - recommend the next track to mix
//!
//! ## Commands
//!
//! - `index [--incremental]`: build or extend the embedding index
//! - `recommend <seed>`: follow-ups for one track
//! - `sequence <seed>...`: tracks that fit a whole set of seeds
//! - `relation <key> <key>`: which mixing rule links two keys
//!
//! Settings come from `settings.yaml` in the data directory (or `--config`);
//! flags override them for a single run. Set `RUST_LOG=debug` to see why
//! individual candidates were dropped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use mixmatch_core::config::{default_config_path, load_config, MixmatchConfig};
use mixmatch_core::features::DtwSimilarity;
use mixmatch_core::index::{update_library_index, IndexError, LibraryIndex};
use mixmatch_core::music::{classify_relation, relation, KeyRelation};
use mixmatch_core::recommend::{RecommendOptions, Recommendation, Recommender, Weights};
use mixmatch_core::store::{JsonMetaStore, NpyVectorStore};
use mixmatch_core::RecommendError;

#[derive(Parser, Debug)]
#[command(name = "mixmatch", version, about = "Harmonic and tempo-aware track recommendations")]
struct Cli {
    /// Settings file (defaults to settings.yaml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the embedding index from the library metadata
    Index {
        /// Only add tracks missing from the existing index
        #[arg(long)]
        incremental: bool,
    },
    /// Recommend follow-ups for a seed track (path or "Artist - Title" fragment)
    Recommend {
        seed: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Recommend tracks that fit several seeds at once
    Sequence {
        #[arg(required = true)]
        seeds: Vec<String>,
        /// Penalty for picks that sound like the previous few, 0 disables
        #[arg(long)]
        diversity: Option<f32>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show the mixing relation between two keys
    Relation { seed_key: String, candidate_key: String },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Number of results
    #[arg(short = 'n', long)]
    top: Option<usize>,

    /// Tempo tolerance in percent of the seed BPM
    #[arg(long)]
    tempo_pct: Option<f64>,

    /// Disallow double/half-time matches
    #[arg(long)]
    no_doubletime: bool,

    /// Do not require a Camelot mixing rule
    #[arg(long)]
    no_camelot: bool,

    /// Hard BPM difference limit
    #[arg(long)]
    bpm_max_diff: Option<f64>,

    /// Only these key relations (same, relative, neighbor)
    #[arg(long, value_delimiter = ',')]
    relations: Vec<String>,

    /// Candidates must have this tag (repeatable)
    #[arg(long = "require-tag")]
    require_tags: Vec<String>,

    /// Prefer tracks with this tag in the tag score (repeatable)
    #[arg(long = "prefer-tag")]
    prefer_tags: Vec<String>,

    /// Use the balanced weight preset instead of the configured weights
    #[arg(long)]
    balanced: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

impl FilterArgs {
    fn apply(&self, base: &RecommendOptions) -> Result<RecommendOptions> {
        let mut opts = base.clone();
        if let Some(top) = self.top {
            opts.top_n = top;
        }
        if let Some(pct) = self.tempo_pct {
            opts.tempo_tolerance_pct = pct;
        }
        if self.no_doubletime {
            opts.allow_doubletime = false;
        }
        if self.no_camelot {
            opts.require_camelot_compatible = false;
        }
        if let Some(diff) = self.bpm_max_diff {
            opts.bpm_max_diff = diff;
        }
        if !self.relations.is_empty() {
            opts.allowed_key_relations = self
                .relations
                .iter()
                .map(|r| KeyRelation::from_str(r).with_context(|| format!("Unknown key relation '{}'", r)))
                .collect::<Result<_>>()?;
        }
        if !self.require_tags.is_empty() {
            opts.required_tags = self.require_tags.clone();
        }
        if !self.prefer_tags.is_empty() {
            opts.preferred_tags = self.prefer_tags.clone();
        }
        if self.balanced {
            opts.weights = Weights::balanced();
        }
        Ok(opts)
    }
}

/// Library files opened for a recommendation run
struct Library {
    meta: JsonMetaStore,
    vectors: NpyVectorStore,
    index: LibraryIndex,
}

fn open_library(config: &MixmatchConfig) -> Result<Library> {
    let meta = JsonMetaStore::load(&config.paths.meta_path()).context("Failed to load track metadata")?;
    let index = match LibraryIndex::load(&config.paths.index_files(), &config.index) {
        Ok(index) => index,
        Err(IndexError::Unavailable(path)) => {
            return Err(RecommendError::IndexUnavailable)
                .with_context(|| format!("No index at {:?}, run `mixmatch index` first", path));
        }
        Err(e) => return Err(e).context("Failed to load the embedding index"),
    };
    let vectors = NpyVectorStore {
        expected_dim: Some(index.embedding_index().dim()),
    };
    Ok(Library { meta, vectors, index })
}

fn print_results(title: &str, results: &[Recommendation], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results).context("Failed to encode results")?);
        return Ok(());
    }

    println!("{}", title);
    if results.is_empty() {
        println!("  (no candidates passed the filters)");
        return Ok(());
    }
    println!(
        "{:>4}  {:<28} {:<22} {:<28} {:>6}  {:<4} {:<26} {:<4} {:>6} {:>6}",
        "Rank", "Track", "Artist", "Title", "BPM", "Key", "KeyRule", "Tmp", "Dist", "Score"
    );
    for (i, r) in results.iter().enumerate() {
        let file = std::path::Path::new(&r.path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| r.path.clone());
        println!(
            "{:>4}  {:<28} {:<22} {:<28} {:>6}  {:<4} {:<26} {:<4} {:>6.3} {:>6.3}",
            i + 1,
            truncate(&file, 28),
            truncate(&r.artist, 22),
            truncate(&r.title, 28),
            r.bpm.map(|b| format!("{:.1}", b)).unwrap_or_else(|| "-".into()),
            r.key.as_deref().unwrap_or("-"),
            r.key_rule,
            r.tempo_note.as_str(),
            r.distance,
            r.score
        );
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}

fn main() -> Result<()> {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    log::debug!("mixmatch {}: {:?}", env!("CARGO_PKG_VERSION"), cli.command);
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config: MixmatchConfig = load_config(&config_path);

    match cli.command {
        Command::Index { incremental } => {
            let meta = JsonMetaStore::load(&config.paths.meta_path()).context("Failed to load track metadata")?;
            let vectors = NpyVectorStore {
                expected_dim: config.index.dim,
            };
            let files = config.paths.index_files();
            let (_, update) = update_library_index(&files, &meta, &vectors, &config.index, incremental)
                .context("Failed to build the embedding index")?;
            println!("{} ({:?})", update, files.db);
        }

        Command::Recommend { seed, filters } => {
            let opts = filters.apply(&config.recommend)?;
            let library = open_library(&config)?;
            let similarity = DtwSimilarity::default();
            let recommender = Recommender::new(&library.meta, &library.vectors)
                .with_index(&library.index)
                .with_similarity(&similarity);

            let seed_path = recommender.resolve_seed(&seed)?;
            let results = recommender.recommend(&seed_path, &opts)?;

            let seed_meta = library.meta.get_track(&seed_path);
            let title = format!(
                "Recommendations for {}  (seed: {} BPM | {})",
                seed_path,
                seed_meta.and_then(|m| m.bpm).map(|b| format!("{:.1}", b)).unwrap_or_else(|| "-".into()),
                seed_meta.and_then(|m| m.key.as_deref()).unwrap_or("-"),
            );
            print_results(&title, &results, filters.json)?;
        }

        Command::Sequence { seeds, diversity, filters } => {
            let mut opts = filters.apply(&config.recommend)?;
            if let Some(d) = diversity {
                opts.diversity = d;
            }
            let library = open_library(&config)?;
            let similarity = DtwSimilarity::default();
            let recommender = Recommender::new(&library.meta, &library.vectors)
                .with_index(&library.index)
                .with_similarity(&similarity);

            let results = recommender.recommend_sequence(&seeds, &opts)?;
            print_results(&format!("Sequence from {} seeds", seeds.len()), &results, filters.json)?;
        }

        Command::Relation { seed_key, candidate_key } => {
            let m = relation(Some(&seed_key), Some(&candidate_key));
            let bucket = classify_relation(Some(&seed_key), Some(&candidate_key))
                .map(|r| r.as_str())
                .unwrap_or("unknown");
            println!(
                "{} -> {}: {} ({}, {})",
                seed_key,
                candidate_key,
                if m.compatible { "compatible" } else { "incompatible" },
                m.rule_name(),
                bucket
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mixmatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = parse(&[
            "recommend",
            "Artist - Title",
            "-n",
            "5",
            "--no-camelot",
            "--relations",
            "same,relative",
            "--require-tag",
            "Peak",
            "--balanced",
        ]);
        let Command::Recommend { seed, filters } = cli.command else {
            panic!("expected recommend");
        };
        assert_eq!(seed, "Artist - Title");

        let opts = filters.apply(&RecommendOptions::default()).unwrap();
        assert_eq!(opts.top_n, 5);
        assert!(!opts.require_camelot_compatible);
        assert!(opts.allow_doubletime);
        assert_eq!(opts.allowed_key_relations, vec![KeyRelation::Same, KeyRelation::Relative]);
        assert_eq!(opts.required_tags, vec!["Peak".to_string()]);
        assert_eq!(opts.weights, Weights::balanced());
    }

    #[test]
    fn test_unknown_relation_is_rejected() {
        let cli = parse(&["recommend", "x", "--relations", "sideways"]);
        let Command::Recommend { filters, .. } = cli.command else {
            panic!("expected recommend");
        };
        assert!(filters.apply(&RecommendOptions::default()).is_err());
    }

    #[test]
    fn test_sequence_needs_seeds() {
        assert!(Cli::try_parse_from(["mixmatch", "sequence"]).is_err());
        let cli = parse(&["sequence", "a", "b", "--diversity", "0"]);
        assert!(matches!(cli.command, Command::Sequence { ref seeds, diversity: Some(d), .. } if seeds.len() == 2 && d == 0.0));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long title", 6), "a ver~");
    }
}
