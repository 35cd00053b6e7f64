//! Library-wide index: embedding index plus the label to path list
//!
//! On disk an index directory holds `embeddings.db` (the HNSW database)
//! and `paths.json` (a JSON array where position = label).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::{EmbeddingIndex, IndexError, IndexHit, IndexProvider, IndexSettings};
use crate::store::{MetadataStore, VectorStore};

pub const INDEX_DB_FILE: &str = "embeddings.db";
pub const PATHS_FILE: &str = "paths.json";

/// File locations of a persisted library index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFiles {
    pub db: PathBuf,
    pub paths: PathBuf,
}

impl IndexFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            db: dir.join(INDEX_DB_FILE),
            paths: dir.join(PATHS_FILE),
        }
    }

    pub fn exist(&self) -> bool {
        self.db.is_file() && self.paths.is_file()
    }
}

/// Outcome of [`update_library_index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    Rebuilt { tracks: usize },
    Appended { added: usize, total: usize },
    UpToDate { total: usize },
}

impl std::fmt::Display for IndexUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexUpdate::Rebuilt { tracks } => write!(f, "rebuilt index with {} tracks", tracks),
            IndexUpdate::Appended { added, total } => write!(f, "added {} tracks ({} total)", added, total),
            IndexUpdate::UpToDate { total } => write!(f, "index up to date ({} tracks)", total),
        }
    }
}

#[derive(Debug)]
pub struct LibraryIndex {
    index: EmbeddingIndex,
    paths: Vec<String>,
}

/// Load the embedding of every path that has one, in input order.
///
/// Tracks without an embedding reference are skipped quietly, unreadable
/// embeddings with a warning.
fn load_embeddings(paths: &[String], meta: &dyn MetadataStore, vectors: &dyn VectorStore) -> Vec<(String, Vec<f32>)> {
    paths
        .par_iter()
        .filter_map(|path| {
            let record = meta.get(path)?;
            let reference = record.embedding.as_deref().filter(|_| record.has_embedding())?;
            match vectors.load_vector(reference) {
                Ok(vector) => Some((path.clone(), vector)),
                Err(e) => {
                    log::warn!("load_embeddings: skipping '{}': {}", path, e);
                    None
                }
            }
        })
        .collect()
}

/// Drop vectors whose length differs from `dim`
fn keep_dim(dim: usize, loaded: Vec<(String, Vec<f32>)>) -> Vec<(String, Vec<f32>)> {
    loaded
        .into_iter()
        .filter(|(path, vector)| {
            let ok = vector.len() == dim;
            if !ok {
                log::warn!(
                    "keep_dim: skipping '{}' with dimension {} (index dimension {})",
                    path,
                    vector.len(),
                    dim
                );
            }
            ok
        })
        .collect()
}

impl LibraryIndex {
    /// Build a fresh index over every track in `meta` with a usable embedding
    pub fn build(meta: &dyn MetadataStore, vectors: &dyn VectorStore, settings: &IndexSettings) -> Result<Self, IndexError> {
        let mut all_paths = meta.all_paths();
        all_paths.sort();

        let loaded = load_embeddings(&all_paths, meta, vectors);
        let dim = settings
            .dim
            .or_else(|| loaded.first().map(|(_, v)| v.len()))
            .ok_or(IndexError::Empty)?;
        let loaded = keep_dim(dim, loaded);

        let (paths, embeddings): (Vec<String>, Vec<Vec<f32>>) = loaded.into_iter().unzip();
        let labels: Vec<i64> = (0..paths.len() as i64).collect();
        let index = EmbeddingIndex::build(dim, &embeddings, &labels, settings)?;

        log::info!("LibraryIndex::build: {} of {} tracks indexed", paths.len(), all_paths.len());
        Ok(Self { index, paths })
    }

    /// Open a saved index, checking the path list covers every label
    pub fn load(files: &IndexFiles, settings: &IndexSettings) -> Result<Self, IndexError> {
        if !files.paths.is_file() {
            return Err(IndexError::Unavailable(files.paths.clone()));
        }
        let index = EmbeddingIndex::load(&files.db, settings)?;

        let text = std::fs::read_to_string(&files.paths).map_err(|source| IndexError::Io {
            path: files.paths.clone(),
            source,
        })?;
        let paths: Vec<String> = serde_json::from_str(&text).map_err(|e| IndexError::Serialization(e.to_string()))?;

        if paths.len() < index.len() {
            return Err(IndexError::Serialization(format!(
                "path list has {} entries but index holds {} vectors",
                paths.len(),
                index.len()
            )));
        }

        Ok(Self { index, paths })
    }

    pub fn save(&self, files: &IndexFiles) -> Result<(), IndexError> {
        self.index.save(&files.db)?;

        let text = serde_json::to_string(&self.paths).map_err(|e| IndexError::Serialization(e.to_string()))?;
        std::fs::write(&files.paths, text).map_err(|source| IndexError::Io {
            path: files.paths.clone(),
            source,
        })?;
        log::info!("LibraryIndex::save: {} paths to {:?}", self.paths.len(), files.paths);
        Ok(())
    }

    /// Append tracks from `meta` that are not indexed yet.
    ///
    /// New labels continue from the current path list length. Returns the
    /// number of paths appended.
    pub fn append_new(&mut self, meta: &dyn MetadataStore, vectors: &dyn VectorStore) -> Result<usize, IndexError> {
        let known: HashSet<&str> = self.paths.iter().map(String::as_str).collect();
        let mut fresh: Vec<String> = meta
            .all_paths()
            .into_iter()
            .filter(|p| !known.contains(p.as_str()))
            .collect();
        fresh.sort();

        let loaded = keep_dim(self.index.dim(), load_embeddings(&fresh, meta, vectors));
        self.add_tracks(loaded)
    }

    /// Append `(path, vector)` pairs, skipping paths already present
    pub fn add_tracks(&mut self, tracks: Vec<(String, Vec<f32>)>) -> Result<usize, IndexError> {
        let known: HashSet<&str> = self.paths.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let tracks: Vec<(String, Vec<f32>)> = tracks
            .into_iter()
            .filter(|(path, _)| !known.contains(path.as_str()) && seen.insert(path.clone()))
            .collect();
        if tracks.is_empty() {
            return Ok(0);
        }

        let start = self.paths.len() as i64;
        let (paths, embeddings): (Vec<String>, Vec<Vec<f32>>) = tracks.into_iter().unzip();
        let labels: Vec<i64> = (start..start + paths.len() as i64).collect();

        self.index.incremental_add(&embeddings, &labels)?;
        let added = paths.len();
        self.paths.extend(paths);
        Ok(added)
    }

    pub fn label_of(&self, path: &str) -> Option<usize> {
        self.paths.iter().position(|p| p == path)
    }

    pub fn embedding_index(&self) -> &EmbeddingIndex {
        &self.index
    }
}

impl IndexProvider for LibraryIndex {
    fn dim(&self) -> usize {
        self.index.dim()
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn paths(&self) -> &[String] {
        &self.paths
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError> {
        let neighbors = self.index.query(vector, k)?;
        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                let path = usize::try_from(n.label).ok().and_then(|i| self.paths.get(i))?;
                Some(IndexHit {
                    path: path.clone(),
                    distance: n.distance,
                })
            })
            .collect())
    }
}

/// Build or refresh the on-disk library index.
///
/// With `incremental`, an existing index is extended with new tracks only;
/// if it cannot be loaded the index is rebuilt from scratch. Files are left
/// untouched when nothing is new.
pub fn update_library_index(
    files: &IndexFiles,
    meta: &dyn MetadataStore,
    vectors: &dyn VectorStore,
    settings: &IndexSettings,
    incremental: bool,
) -> Result<(LibraryIndex, IndexUpdate), IndexError> {
    if incremental && files.exist() {
        match LibraryIndex::load(files, settings) {
            Ok(mut library) => {
                let added = library.append_new(meta, vectors)?;
                if added == 0 {
                    let total = library.paths.len();
                    log::info!("update_library_index: up to date ({} tracks)", total);
                    return Ok((library, IndexUpdate::UpToDate { total }));
                }
                library.save(files)?;
                let total = library.paths.len();
                log::info!("update_library_index: appended {} tracks ({} total)", added, total);
                return Ok((library, IndexUpdate::Appended { added, total }));
            }
            Err(e) => {
                log::warn!("update_library_index: could not load existing index ({}), rebuilding", e);
            }
        }
    }

    let library = LibraryIndex::build(meta, vectors, settings)?;
    library.save(files)?;
    let tracks = library.paths.len();
    log::info!("update_library_index: rebuilt with {} tracks", tracks);
    Ok((library, IndexUpdate::Rebuilt { tracks }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonMetaStore, MemoryVectorStore, TrackMeta};

    fn track(embedding: Option<&str>) -> TrackMeta {
        TrackMeta {
            embedding: embedding.map(str::to_string),
            ..Default::default()
        }
    }

    fn fixture(n: usize) -> (JsonMetaStore, MemoryVectorStore) {
        let mut meta = JsonMetaStore::new();
        let mut vectors = MemoryVectorStore::new();
        for i in 0..n {
            let path = format!("/music/{:02}.flac", i);
            let reference = format!("/emb/{:02}.npy", i);
            let mut v = vec![0.1; 4];
            v[i % 4] = 1.0 + i as f32;
            meta.insert(path, track(Some(&reference)));
            vectors.insert(reference, v);
        }
        (meta, vectors)
    }

    #[test]
    fn test_build_skips_unusable_tracks() {
        let (mut meta, mut vectors) = fixture(3);
        meta.insert("/music/no_embedding.flac", track(None));
        meta.insert("/music/missing_file.flac", track(Some("/emb/missing.npy")));
        meta.insert("/music/wrong_dim.flac", track(Some("/emb/short.npy")));
        vectors.insert("/emb/short.npy", vec![1.0, 0.0]);

        let library = LibraryIndex::build(&meta, &vectors, &IndexSettings::default()).unwrap();
        assert_eq!(library.dim(), 4);
        assert_eq!(library.paths(), &["/music/00.flac", "/music/01.flac", "/music/02.flac"]);
    }

    #[test]
    fn test_tracks_with_bad_fields_are_indexed() {
        let doc = r#"{"tracks": {
            "/music/seed.flac": {"bpm": 120.0, "key": "8A", "embedding": "/emb/0.npy"},
            "/music/bpm.flac": {"bpm": "fast", "key": "8A", "embedding": "/emb/1.npy"},
            "/music/artist.flac": {"artist": null, "embedding": "/emb/2.npy"},
            "/music/key.flac": {"key": 8, "embedding": "/emb/3.npy"}
        }}"#;
        let meta = JsonMetaStore::from_json_str(doc).unwrap();
        let mut vectors = MemoryVectorStore::new();
        for i in 0..4 {
            let mut v = vec![0.1; 4];
            v[i] = 1.0;
            vectors.insert(format!("/emb/{}.npy", i), v);
        }

        let library = LibraryIndex::build(&meta, &vectors, &IndexSettings::default()).unwrap();
        assert_eq!(library.len(), 4);
        assert!(library.label_of("/music/bpm.flac").is_some());
        assert!(library.label_of("/music/key.flac").is_some());
    }

    #[test]
    fn test_build_without_embeddings_is_empty() {
        let mut meta = JsonMetaStore::new();
        meta.insert("/music/a.flac", track(None));
        let err = LibraryIndex::build(&meta, &MemoryVectorStore::new(), &IndexSettings::default()).unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }

    #[test]
    fn test_query_returns_paths() {
        let (meta, vectors) = fixture(4);
        let library = LibraryIndex::build(&meta, &vectors, &IndexSettings::default()).unwrap();

        let seed = vectors.load_vector("/emb/02.npy").unwrap();
        let hits = library.query(&seed, 1).unwrap();
        assert_eq!(hits[0].path, "/music/02.flac");
        assert!(hits[0].distance.abs() < 1e-4);
    }

    #[test]
    fn test_incremental_add_extends_path_list() {
        let (meta, vectors) = fixture(6);
        let mut first_half = JsonMetaStore::new();
        for path in meta.all_paths().into_iter().take(3) {
            first_half.insert(path.clone(), meta.get(&path).unwrap());
        }

        let mut library = LibraryIndex::build(&first_half, &vectors, &IndexSettings::default()).unwrap();
        let added = library.append_new(&meta, &vectors).unwrap();
        assert_eq!(added, 3);
        assert_eq!(library.paths().len(), 6);
        assert_eq!(library.len(), 6);

        let unique: HashSet<&String> = library.paths().iter().collect();
        assert_eq!(unique.len(), 6);
        assert_eq!(library.label_of("/music/05.flac"), Some(5));

        assert_eq!(library.append_new(&meta, &vectors).unwrap(), 0);
    }

    #[test]
    fn test_update_library_index_flow() {
        let dir = tempfile::tempdir().unwrap();
        let files = IndexFiles::in_dir(dir.path());
        let settings = IndexSettings::default();
        let (mut meta, mut vectors) = fixture(4);

        let (_, update) = update_library_index(&files, &meta, &vectors, &settings, true).unwrap();
        assert_eq!(update, IndexUpdate::Rebuilt { tracks: 4 });
        assert!(files.exist());

        let (_, update) = update_library_index(&files, &meta, &vectors, &settings, true).unwrap();
        assert_eq!(update, IndexUpdate::UpToDate { total: 4 });

        meta.insert("/music/new.flac", track(Some("/emb/new.npy")));
        vectors.insert("/emb/new.npy", vec![0.5, 0.5, 0.5, 0.5]);
        let (library, update) = update_library_index(&files, &meta, &vectors, &settings, true).unwrap();
        assert_eq!(update, IndexUpdate::Appended { added: 1, total: 5 });
        drop(library);

        let reloaded = LibraryIndex::load(&files, &settings).unwrap();
        assert_eq!(reloaded.paths().len(), 5);
        assert_eq!(reloaded.paths()[4], "/music/new.flac");
    }

    #[test]
    fn test_corrupt_path_list_falls_back_to_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let files = IndexFiles::in_dir(dir.path());
        let settings = IndexSettings::default();
        let (meta, vectors) = fixture(3);

        update_library_index(&files, &meta, &vectors, &settings, false).unwrap();
        std::fs::write(&files.paths, "not json").unwrap();

        assert!(LibraryIndex::load(&files, &settings).is_err());
        let (_, update) = update_library_index(&files, &meta, &vectors, &settings, true).unwrap();
        assert_eq!(update, IndexUpdate::Rebuilt { tracks: 3 });
    }

    #[test]
    fn test_load_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let err = LibraryIndex::load(&IndexFiles::in_dir(dir.path()), &IndexSettings::default()).unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }
}
