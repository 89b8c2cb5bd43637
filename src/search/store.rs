//! Durable per-owner index storage
//!
//! Layout per owner (`<data>/indices/user_<owner>/`):
//! - `index.vec`: header (magic, version, dimension, count) then f32 rows, little-endian
//! - `mapping.json`: `{document_ids, created_at, model}` plus integrity fields
//!
//! Both files are written to a staging path and renamed into place, blob
//! first. The mapping records the blob's crc32, so a blob paired with a
//! mapping from another generation is detected on load.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};

use super::user_index::UserIndex;
use super::vector_index::VectorIndex;
use crate::core::document::{DocumentId, OwnerId};
use crate::core::paths::{staging_path, IndexPaths};
use crate::error::Result;

const MAGIC: &[u8; 4] = b"DVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;
const DEFAULT_SAVE_ATTEMPTS: u32 = 3;

/// `mapping.json` contents
#[derive(Debug, Serialize, Deserialize)]
struct IndexMapping {
    document_ids: Vec<DocumentId>,
    created_at: String,
    model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<u32>,
    #[serde(default)]
    generation: u64,
}

/// Result of reading a persisted index. Anything but `Loaded` means the
/// caller should rebuild.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(UserIndex),
    Missing,
    Corrupt(String),
    ModelMismatch { expected: String, found: String },
    Misaligned { vectors: usize, document_ids: usize },
}

impl LoadOutcome {
    pub fn into_index(self) -> Option<UserIndex> {
        match self {
            LoadOutcome::Loaded(index) => Some(index),
            _ => None,
        }
    }
}

/// Writes one artifact in place of whatever was at the path
type FileWriter = Box<dyn Fn(&Path, &[u8]) -> io::Result<()> + Send + Sync>;

pub struct IndexStore {
    paths: IndexPaths,
    save_attempts: u32,
    writer: FileWriter,
}

impl IndexStore {
    pub fn new(paths: IndexPaths) -> Self {
        Self {
            paths,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
            writer: Box::new(replace_file),
        }
    }

    #[cfg(test)]
    fn with_writer(mut self, writer: FileWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn exists(&self, owner: OwnerId) -> bool {
        self.paths.index_file(owner).exists() && self.paths.mapping_file(owner).exists()
    }

    /// Persist an index, replacing whatever was stored for its owner
    pub fn save(&self, index: &UserIndex) -> Result<()> {
        let owner = index.owner_id();
        fs::create_dir_all(self.paths.owner_dir(owner))?;

        let blob = encode_vectors(index.vectors());
        let mapping = IndexMapping {
            document_ids: index.document_ids().to_vec(),
            created_at: index.created_at().to_rfc3339(),
            model: index.model_name().to_string(),
            dimension: Some(index.vectors().dimension()),
            checksum: Some(crc32fast::hash(&blob)),
            generation: index.generation(),
        };
        let mapping_json = serde_json::to_vec_pretty(&mapping)?;

        self.with_retry(|| (self.writer)(&self.paths.index_file(owner), &blob))?;
        self.with_retry(|| (self.writer)(&self.paths.mapping_file(owner), &mapping_json))?;

        debug!(owner, documents = index.len(), "index persisted");
        Ok(())
    }

    /// Read an owner's index. Never fails: missing, corrupt, misaligned or
    /// foreign-model artifacts come back as a non-`Loaded` outcome.
    pub fn load(&self, owner: OwnerId, expected_model: &str) -> LoadOutcome {
        let index_path = self.paths.index_file(owner);
        let mapping_path = self.paths.mapping_file(owner);
        if !index_path.exists() || !mapping_path.exists() {
            return LoadOutcome::Missing;
        }

        let outcome = read_index(owner, &index_path, &mapping_path, expected_model);
        match &outcome {
            LoadOutcome::Loaded(index) => {
                debug!(owner, documents = index.len(), "index loaded from disk")
            }
            LoadOutcome::Missing => {}
            LoadOutcome::Corrupt(reason) => {
                warn!(owner, %reason, "discarding corrupt persisted index")
            }
            LoadOutcome::ModelMismatch { expected, found } => {
                warn!(owner, %expected, %found, "discarding index built with another model")
            }
            LoadOutcome::Misaligned {
                vectors,
                document_ids,
            } => warn!(
                owner,
                vectors, document_ids, "discarding index whose id list does not match its vectors"
            ),
        }
        outcome
    }

    /// Generation recorded with an owner's persisted index, if one is readable
    pub fn persisted_generation(&self, owner: OwnerId) -> Option<u64> {
        let bytes = fs::read(self.paths.mapping_file(owner)).ok()?;
        serde_json::from_slice::<IndexMapping>(&bytes)
            .ok()
            .map(|mapping| mapping.generation)
    }

    /// Delete an owner's persisted index, if any
    pub fn remove(&self, owner: OwnerId) -> Result<()> {
        let dir = self.paths.owner_dir(owner);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn with_retry(&self, mut op: impl FnMut() -> io::Result<()>) -> Result<()> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.save_attempts && is_transient(&e) => {
                    warn!(attempt, error = %e, "transient I/O error while saving index, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Write to a staging file, sync, then rename over the target
fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let staging = staging_path(path);
    {
        let mut file = File::create(&staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&staging, path)
}

fn read_index(
    owner: OwnerId,
    index_path: &Path,
    mapping_path: &Path,
    expected_model: &str,
) -> LoadOutcome {
    let mapping: IndexMapping = match fs::read(mapping_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Ok(mapping) => mapping,
        Err(reason) => return LoadOutcome::Corrupt(format!("mapping: {}", reason)),
    };

    if mapping.model != expected_model {
        return LoadOutcome::ModelMismatch {
            expected: expected_model.to_string(),
            found: mapping.model,
        };
    }

    let blob = match fs::read(index_path) {
        Ok(blob) => blob,
        Err(e) => return LoadOutcome::Corrupt(format!("index: {}", e)),
    };
    if let Some(expected) = mapping.checksum {
        let actual = crc32fast::hash(&blob);
        if actual != expected {
            return LoadOutcome::Corrupt(format!(
                "checksum {:08x} does not match mapping {:08x}",
                actual, expected
            ));
        }
    }

    let vectors = match decode_vectors(&blob) {
        Ok(vectors) => vectors,
        Err(reason) => return LoadOutcome::Corrupt(reason),
    };
    if let Some(dimension) = mapping.dimension {
        if dimension != vectors.dimension() {
            return LoadOutcome::Corrupt(format!(
                "mapping dimension {} but index dimension {}",
                dimension,
                vectors.dimension()
            ));
        }
    }
    if vectors.len() != mapping.document_ids.len() {
        return LoadOutcome::Misaligned {
            vectors: vectors.len(),
            document_ids: mapping.document_ids.len(),
        };
    }
    let mut seen = HashSet::with_capacity(mapping.document_ids.len());
    if !mapping.document_ids.iter().all(|id| seen.insert(*id)) {
        return LoadOutcome::Corrupt("duplicate document ids".to_string());
    }

    let created_at = match parse_created_at(&mapping.created_at) {
        Some(ts) => ts,
        None => {
            return LoadOutcome::Corrupt(format!("unreadable created_at {:?}", mapping.created_at))
        }
    };

    LoadOutcome::Loaded(UserIndex::from_parts(
        owner,
        mapping.document_ids,
        vectors,
        mapping.model,
        created_at,
        mapping.generation,
    ))
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|ts| ts.and_utc())
        })
}

fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let flat = index.as_flat();
    let mut blob = Vec::with_capacity(HEADER_LEN + flat.len() * 4);
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    blob.extend_from_slice(&(index.len() as u32).to_le_bytes());
    for &val in flat {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

fn decode_vectors(blob: &[u8]) -> std::result::Result<VectorIndex, String> {
    if blob.len() < HEADER_LEN || &blob[..4] != MAGIC {
        return Err("index: missing header".to_string());
    }
    let read_u32 = |at: usize| u32::from_le_bytes([blob[at], blob[at + 1], blob[at + 2], blob[at + 3]]);
    let version = read_u32(4);
    if version != FORMAT_VERSION {
        return Err(format!("index: unsupported format version {}", version));
    }
    let dimension = read_u32(8) as usize;
    let count = read_u32(12) as usize;

    let body = &blob[HEADER_LEN..];
    let expected_len = dimension
        .checked_mul(count)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| format!("index: header claims {} x {} vectors", count, dimension))?;
    if body.len() != expected_len {
        return Err(format!(
            "index: {} bytes of vector data for {} x {}",
            body.len(),
            count,
            dimension
        ));
    }

    let data = body
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    VectorIndex::from_flat(dimension, data).map_err(|e| format!("index: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::search::embedding::EmbeddingVector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_index(owner: OwnerId) -> Result<UserIndex> {
        let rows = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.6, 0.8, 0.0]];
        UserIndex::build(
            owner,
            "test-model",
            3,
            4,
            [7, 3, 9]
                .into_iter()
                .zip(rows.iter().map(|r| EmbeddingVector::normalized(r.to_vec(), "test-model"))),
        )
    }

    fn store() -> (TempDir, IndexStore) {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(IndexPaths::from_root(dir.path().to_path_buf()));
        (dir, store)
    }

    fn rewrite_mapping(store: &IndexStore, owner: OwnerId, edit: impl FnOnce(&mut serde_json::Value)) {
        let path = store.paths().mapping_file(owner);
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        edit(&mut value);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_save_load_round_trip() -> Result<()> {
        let (_dir, store) = store();
        let index = sample_index(1)?;
        let query = [0.5, 0.5, 0.0];
        let before = index.search(&query, 3);

        store.save(&index)?;
        let loaded = store
            .load(1, "test-model")
            .into_index()
            .expect("index should load");

        assert_eq!(loaded.document_ids(), index.document_ids());
        assert_eq!(loaded.vectors().len(), index.vectors().len());
        assert_eq!(loaded.generation(), 4);
        assert_eq!(loaded.created_at(), index.created_at());
        assert_eq!(loaded.search(&query, 3), before);
        Ok(())
    }

    #[test]
    fn test_mapping_has_specified_fields() -> Result<()> {
        let (_dir, store) = store();
        store.save(&sample_index(1)?)?;

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(store.paths().mapping_file(1))?)?;
        assert_eq!(value["document_ids"], serde_json::json!([7, 3, 9]));
        assert_eq!(value["model"], "test-model");
        assert!(value["created_at"].as_str().is_some());
        assert!(!staging_path(&store.paths().index_file(1)).exists());
        Ok(())
    }

    #[test]
    fn test_missing_and_model_mismatch() -> Result<()> {
        let (_dir, store) = store();
        assert!(matches!(store.load(1, "test-model"), LoadOutcome::Missing));

        store.save(&sample_index(1)?)?;
        assert!(matches!(
            store.load(1, "other-model"),
            LoadOutcome::ModelMismatch { .. }
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_artifacts_load_as_absent() -> Result<()> {
        let (_dir, store) = store();
        store.save(&sample_index(1)?)?;

        fs::write(store.paths().mapping_file(1), b"{not json")?;
        assert!(matches!(store.load(1, "test-model"), LoadOutcome::Corrupt(_)));

        store.save(&sample_index(1)?)?;
        let blob = fs::read(store.paths().index_file(1))?;
        fs::write(store.paths().index_file(1), &blob[..blob.len() - 3])?;
        assert!(matches!(store.load(1, "test-model"), LoadOutcome::Corrupt(_)));
        Ok(())
    }

    #[test]
    fn test_oversized_header_is_corrupt() -> Result<()> {
        let (_dir, store) = store();
        store.save(&sample_index(1)?)?;
        rewrite_mapping(&store, 1, |m| {
            m.as_object_mut().unwrap().remove("checksum");
        });

        let mut blob = fs::read(store.paths().index_file(1))?;
        blob[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        blob[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(store.paths().index_file(1), &blob)?;

        assert!(matches!(store.load(1, "test-model"), LoadOutcome::Corrupt(_)));
        Ok(())
    }

    /// Writer that fails with `kind` for the first `failures` calls
    fn flaky_writer(failures: usize, kind: io::ErrorKind, calls: Arc<AtomicUsize>) -> FileWriter {
        Box::new(move |path: &Path, bytes: &[u8]| {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                Err(io::Error::new(kind, "simulated"))
            } else {
                replace_file(path, bytes)
            }
        })
    }

    #[test]
    fn test_transient_write_error_is_retried() -> Result<()> {
        let dir = TempDir::new()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let store = IndexStore::new(IndexPaths::from_root(dir.path().to_path_buf())).with_writer(
            flaky_writer(1, io::ErrorKind::Interrupted, Arc::clone(&calls)),
        );

        store.save(&sample_index(1)?)?;
        // blob fails once then succeeds, mapping succeeds first time
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let loaded = store.load(1, "test-model").into_index().expect("index should load");
        assert_eq!(loaded.document_ids(), &[7, 3, 9]);
        Ok(())
    }

    #[test]
    fn test_permanent_write_error_is_not_retried() -> Result<()> {
        let dir = TempDir::new()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let store = IndexStore::new(IndexPaths::from_root(dir.path().to_path_buf())).with_writer(
            flaky_writer(usize::MAX, io::ErrorKind::PermissionDenied, Arc::clone(&calls)),
        );

        let err = store.save(&sample_index(1)?).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(store.load(1, "test-model"), LoadOutcome::Missing));
        Ok(())
    }

    #[test]
    fn test_retries_are_bounded() -> Result<()> {
        let dir = TempDir::new()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let store = IndexStore::new(IndexPaths::from_root(dir.path().to_path_buf())).with_writer(
            flaky_writer(usize::MAX, io::ErrorKind::Interrupted, Arc::clone(&calls)),
        );

        assert!(store.save(&sample_index(1)?).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_SAVE_ATTEMPTS as usize);
        Ok(())
    }

    #[test]
    fn test_blob_from_another_save_is_detected() -> Result<()> {
        let (_dir, store) = store();
        store.save(&sample_index(1)?)?;
        let old_mapping = fs::read(store.paths().mapping_file(1))?;

        let smaller = UserIndex::build(
            1,
            "test-model",
            3,
            5,
            vec![(7, EmbeddingVector::normalized(vec![1.0, 0.0, 0.0], "test-model"))],
        )?;
        store.save(&smaller)?;
        fs::write(store.paths().mapping_file(1), old_mapping)?;

        assert!(store.load(1, "test-model").into_index().is_none());
        Ok(())
    }

    #[test]
    fn test_id_count_mismatch_is_misaligned() -> Result<()> {
        let (_dir, store) = store();
        store.save(&sample_index(1)?)?;
        rewrite_mapping(&store, 1, |m| {
            m["document_ids"] = serde_json::json!([7, 3, 9, 11]);
        });

        assert!(matches!(
            store.load(1, "test-model"),
            LoadOutcome::Misaligned {
                vectors: 3,
                document_ids: 4
            }
        ));
        Ok(())
    }

    #[test]
    fn test_accepts_naive_timestamps() -> Result<()> {
        let (_dir, store) = store();
        store.save(&sample_index(1)?)?;
        rewrite_mapping(&store, 1, |m| {
            m["created_at"] = serde_json::json!("2024-03-01T10:15:30.123456");
        });

        let loaded = store.load(1, "test-model").into_index().expect("loads");
        assert_eq!(loaded.created_at().to_rfc3339(), "2024-03-01T10:15:30.123456+00:00");
        Ok(())
    }

    #[test]
    fn test_persisted_generation() -> Result<()> {
        let (_dir, store) = store();
        assert_eq!(store.persisted_generation(1), None);
        store.save(&sample_index(1)?)?;
        assert_eq!(store.persisted_generation(1), Some(4));
        Ok(())
    }

    #[test]
    fn test_remove() -> Result<()> {
        let (_dir, store) = store();
        store.remove(1)?;
        store.save(&sample_index(1)?)?;
        assert!(store.exists(1));
        store.remove(1)?;
        assert!(!store.exists(1));
        Ok(())
    }
}
