//! CozoDB-backed HNSW embedding index
//!
//! Schema:
//!
//! ```cozoscript
//! {:create index_info {key: String => value: Int}}
//! {:create embeddings {label: Int => vec: <F32; DIM>}}
//! ::hnsw create embeddings:knn { dim: DIM, distance: Cosine, ... }
//! ```
//!
//! A built index lives in an in-memory database. Saving writes a SQLite
//! backup; loading opens that file with the SQLite engine, so appends to a
//! loaded index go straight to disk.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use cozo::{DataValue, DbInstance, NamedRows, ScriptMutability};

use super::{IndexError, IndexSettings, Neighbor};

/// Rows per `:put` statement
const INSERT_CHUNK: usize = 1000;

pub struct EmbeddingIndex {
    db: DbInstance,
    dim: usize,
    len: usize,
    settings: IndexSettings,
    /// File the database is opened from, if any
    backing: Option<PathBuf>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("dim", &self.dim)
            .field("len", &self.len)
            .field("settings", &self.settings)
            .field("backing", &self.backing)
            .finish()
    }
}

// ─── Script helpers ──────────────────────────────────────────────────────

fn run_mut(db: &DbInstance, script: &str, params: BTreeMap<String, DataValue>) -> Result<NamedRows, IndexError> {
    db.run_script(script, params, ScriptMutability::Mutable)
        .map_err(|e| IndexError::Database(e.to_string()))
}

fn run_query(db: &DbInstance, script: &str, params: BTreeMap<String, DataValue>) -> Result<NamedRows, IndexError> {
    db.run_script(script, params, ScriptMutability::Immutable)
        .map_err(|e| IndexError::Database(e.to_string()))
}

fn create_schema(db: &DbInstance, dim: usize, settings: &IndexSettings) -> Result<(), IndexError> {
    run_mut(db, "{:create index_info {key: String => value: Int}}", BTreeMap::new())?;
    run_mut(
        db,
        &format!("{{:create embeddings {{label: Int => vec: <F32; {dim}>}}}}"),
        BTreeMap::new(),
    )?;
    run_mut(
        db,
        &format!(
            r#"
            ::hnsw create embeddings:knn {{
                dim: {dim},
                m: {m},
                ef_construction: {ef},
                dtype: F32,
                fields: [vec],
                distance: Cosine,
                extend_candidates: true,
                keep_pruned_connections: false
            }}
            "#,
            m = settings.m,
            ef = settings.ef_construction,
        ),
        BTreeMap::new(),
    )?;

    let mut params = BTreeMap::new();
    params.insert("dim".to_string(), DataValue::from(dim as i64));
    run_mut(db, r#"?[key, value] <- [["dim", $dim]] :put index_info {key => value}"#, params)?;
    Ok(())
}

fn vector_value(vector: &[f32]) -> DataValue {
    DataValue::List(vector.iter().map(|v| DataValue::from(*v as f64)).collect())
}

fn insert_rows(db: &DbInstance, rows: &[(i64, &[f32])]) -> Result<(), IndexError> {
    for chunk in rows.chunks(INSERT_CHUNK) {
        let values: Vec<DataValue> = chunk
            .iter()
            .map(|(label, vector)| DataValue::List(vec![DataValue::from(*label), vector_value(vector)]))
            .collect();

        let mut params = BTreeMap::new();
        params.insert("rows".to_string(), DataValue::List(values));
        run_mut(
            db,
            r#"
            ?[label, vec] <- $rows
            :put embeddings {label => vec}
        "#,
            params,
        )?;
    }
    Ok(())
}

/// Sibling file an index is written to before it replaces `path`
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Keep vectors that can live in a `dim`-dimensional cosine index.
///
/// Mismatched, non-finite and all-zero vectors are skipped with a warning.
fn usable_rows<'a>(dim: usize, vectors: &'a [Vec<f32>], labels: &[i64]) -> Result<Vec<(i64, &'a [f32])>, IndexError> {
    if vectors.len() != labels.len() {
        return Err(IndexError::LabelCountMismatch {
            vectors: vectors.len(),
            labels: labels.len(),
        });
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(vectors.len());
    for (vector, &label) in vectors.iter().zip(labels) {
        if !seen.insert(label) {
            return Err(IndexError::DuplicateLabel(label));
        }
        if vector.len() != dim {
            log::warn!(
                "EmbeddingIndex: skipping label {} with dimension {} (index dimension {})",
                label,
                vector.len(),
                dim
            );
            continue;
        }
        if vector.iter().any(|v| !v.is_finite()) || vector.iter().all(|v| *v == 0.0) {
            log::warn!("EmbeddingIndex: skipping label {} with a degenerate vector", label);
            continue;
        }
        rows.push((label, vector.as_slice()));
    }
    Ok(rows)
}

impl EmbeddingIndex {
    /// Build a fresh in-memory index from `(vector, label)` pairs.
    ///
    /// Returns [`IndexError::Empty`] when no vector of dimension `dim`
    /// survives validation.
    pub fn build(dim: usize, vectors: &[Vec<f32>], labels: &[i64], settings: &IndexSettings) -> Result<Self, IndexError> {
        if dim == 0 {
            return Err(IndexError::Empty);
        }
        let rows = usable_rows(dim, vectors, labels)?;
        if rows.is_empty() {
            return Err(IndexError::Empty);
        }

        let db = DbInstance::new("mem", "", "").map_err(|e| IndexError::Database(e.to_string()))?;
        create_schema(&db, dim, settings)?;
        insert_rows(&db, &rows)?;

        log::info!("EmbeddingIndex::build: {} vectors, dim {}", rows.len(), dim);
        Ok(Self {
            db,
            dim,
            len: rows.len(),
            settings: settings.clone(),
            backing: None,
        })
    }

    /// Open an index previously written by [`save`](Self::save)
    pub fn load(path: &Path, settings: &IndexSettings) -> Result<Self, IndexError> {
        if !path.is_file() {
            return Err(IndexError::Unavailable(path.to_path_buf()));
        }

        let db = DbInstance::new("sqlite", path, "").map_err(|e| IndexError::Database(e.to_string()))?;

        let info = run_query(&db, r#"?[value] := *index_info{key: "dim", value}"#, BTreeMap::new())?;
        let dim = info
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.get_int())
            .ok_or_else(|| IndexError::Serialization(format!("'{}' has no recorded dimension", path.display())))?;

        let count = run_query(&db, "?[count(label)] := *embeddings{label}", BTreeMap::new())?;
        let len = count
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.get_int())
            .unwrap_or(0);

        if let Some(expected) = settings.dim {
            if expected != dim as usize {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: dim as usize,
                });
            }
        }

        log::info!("EmbeddingIndex::load: {} vectors, dim {} from {:?}", len, dim, path);
        Ok(Self {
            db,
            dim: dim as usize,
            len: len as usize,
            settings: settings.clone(),
            backing: Some(path.to_path_buf()),
        })
    }

    /// Persist the index to `path`, replacing any existing file
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if self.backing.as_deref() == Some(path) {
            log::debug!("EmbeddingIndex::save: already backed by {:?}", path);
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Back up next to the target, then swap it in so a failed backup
        // leaves the previous index intact
        let staging = staging_path(path);
        if staging.exists() {
            std::fs::remove_file(&staging).map_err(|source| IndexError::Io {
                path: staging.clone(),
                source,
            })?;
        }
        if let Err(e) = self.db.backup_db(staging.to_string_lossy().to_string()) {
            let _ = std::fs::remove_file(&staging);
            return Err(IndexError::Database(e.to_string()));
        }
        std::fs::rename(&staging, path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("EmbeddingIndex::save: {} vectors to {:?}", self.len, path);
        Ok(())
    }

    /// Append new vectors without rebuilding.
    ///
    /// Labels already in the index are rejected before anything is written.
    /// Returns the number of vectors actually added.
    pub fn incremental_add(&mut self, vectors: &[Vec<f32>], labels: &[i64]) -> Result<usize, IndexError> {
        let rows = usable_rows(self.dim, vectors, labels)?;
        for (label, _) in &rows {
            if self.contains(*label)? {
                return Err(IndexError::DuplicateLabel(*label));
            }
        }
        if rows.is_empty() {
            return Ok(0);
        }

        insert_rows(&self.db, &rows)?;
        self.len += rows.len();
        log::info!("EmbeddingIndex::incremental_add: {} vectors, {} total", rows.len(), self.len);
        Ok(rows.len())
    }

    /// The `k` nearest labels to `vector`, ascending by cosine distance
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        if k == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let k = k.min(self.len);
        let ef = self.settings.ef_search.max(k);

        let mut params = BTreeMap::new();
        params.insert("q".to_string(), vector_value(vector));
        params.insert("k".to_string(), DataValue::from(k as i64));

        let result = run_query(
            &self.db,
            &format!(
                r#"
                ?[label, dist] :=
                    q = vec($q),
                    ~embeddings:knn{{label | query: q, k: $k, ef: {ef}, bind_distance: dist}}
                :order dist, label
            "#
            ),
            params,
        )?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let label = row.first()?.get_int()?;
                let distance = row.get(1)?.get_float()? as f32;
                distance.is_finite().then_some(Neighbor { label, distance })
            })
            .collect())
    }

    pub fn contains(&self, label: i64) -> Result<bool, IndexError> {
        let mut params = BTreeMap::new();
        params.insert("label".to_string(), DataValue::from(label));
        let result = run_query(&self.db, "?[label] := *embeddings{label}, label = $label", params)?;
        Ok(!result.rows.is_empty())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
