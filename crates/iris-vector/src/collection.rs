//! Embedded vector collection with brute-force cosine similarity search.
//!
//! A collection holds one vector per image under a dense integer id,
//! enforces a fixed dimension decided at startup, and persists its contents
//! as a single snapshot file. Search is O(n), which is acceptable for the
//! moderate dataset sizes this service targets.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use iris_core::error::{IrisError, Result};
use iris_core::types::ImagePayload;

/// Fixed shape of a collection, decided once at startup.
///
/// The dimension must equal the embedder's actual output dimension; a
/// collection created with a stale dimension rejects every subsequent
/// upsert and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name; also the snapshot file stem.
    pub name: String,
    /// Length of every stored vector.
    pub dimension: usize,
}

/// A single match returned from a k-NN search.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Dense id of the matching record.
    pub id: u64,
    /// Cosine similarity to the query.
    pub score: f64,
    /// Payload stored with the record.
    pub payload: ImagePayload,
}

/// A record stored in the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: ImagePayload,
}

/// Snapshot file layout: the encoded points prefixed with the dimension the
/// collection was configured with and a checksum of the encoded bytes.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    dimension: u32,
    point_count: u64,
    checksum: [u8; 32],
    bytes: Vec<u8>,
}

fn snapshot_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

/// Embedded vector collection using brute-force cosine similarity.
///
/// Thread-safe via interior RwLock; cloning shares the underlying points.
/// The ingestor is the only writer and runs before any query traffic, so
/// readers never observe a partially built collection.
#[derive(Debug, Clone)]
pub struct VectorCollection {
    config: CollectionConfig,
    path: PathBuf,
    points: Arc<RwLock<BTreeMap<u64, StoredPoint>>>,
}

impl VectorCollection {
    /// Create an empty collection at `data_dir`, discarding any snapshot a
    /// previous run left behind. This is the only constructor the server
    /// uses: the collection is fully rebuilt on every startup.
    pub fn recreate(data_dir: &Path, config: CollectionConfig) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(format!("{}.bin", config.name));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        info!(
            collection = %config.name,
            dimension = config.dimension,
            path = %path.display(),
            "Collection recreated"
        );
        Ok(Self {
            config,
            path,
            points: Arc::new(RwLock::new(BTreeMap::new())),
        })
    }

    /// Load a collection from an existing snapshot, verifying its checksum
    /// and that its stored dimension matches `config`.
    ///
    /// The server never calls this (startup always recreates); it is the
    /// consistency check for what [`flush`](Self::flush) wrote.
    pub fn load(data_dir: &Path, config: CollectionConfig) -> Result<Self> {
        let path = data_dir.join(format!("{}.bin", config.name));
        let raw = fs::read(&path)?;
        let (snapshot, _) = bincode::serde::decode_from_slice::<Snapshot, _>(&raw, snapshot_config())
            .map_err(|e| IrisError::Serialization(format!("snapshot decode: {}", e)))?;

        if snapshot.dimension as usize != config.dimension {
            return Err(IrisError::Collection(format!(
                "snapshot dimension {} does not match configured dimension {}",
                snapshot.dimension, config.dimension
            )));
        }
        if *blake3::hash(&snapshot.bytes).as_bytes() != snapshot.checksum {
            return Err(IrisError::Collection(
                "snapshot checksum mismatch".to_string(),
            ));
        }

        let (points, _) = bincode::serde::decode_from_slice::<Vec<(u64, StoredPoint)>, _>(
            &snapshot.bytes,
            snapshot_config(),
        )
        .map_err(|e| IrisError::Serialization(format!("snapshot points decode: {}", e)))?;

        info!(
            collection = %config.name,
            points = points.len(),
            "Collection snapshot loaded"
        );
        Ok(Self {
            config,
            path,
            points: Arc::new(RwLock::new(points.into_iter().collect())),
        })
    }

    /// Insert a vector with its payload under the given id.
    ///
    /// Overwrites any existing record with the same id. Rejects vectors
    /// whose length differs from the configured dimension before anything
    /// reaches storage.
    pub fn upsert(&self, id: u64, vector: Vec<f32>, payload: ImagePayload) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(IrisError::Collection(format!(
                "vector dimension {} does not match collection dimension {}",
                vector.len(),
                self.config.dimension
            )));
        }
        let mut points = self
            .points
            .write()
            .map_err(|e| IrisError::Collection(format!("Lock poisoned: {}", e)))?;
        points.insert(id, StoredPoint { vector, payload });
        Ok(())
    }

    /// Search for the `limit` nearest neighbors to the query vector by
    /// cosine similarity.
    ///
    /// Returns results sorted by descending score with no minimum-score
    /// cutoff. An empty collection yields an empty vec.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        if query.len() != self.config.dimension {
            return Err(IrisError::Collection(format!(
                "query dimension {} does not match collection dimension {}",
                query.len(),
                self.config.dimension
            )));
        }
        let points = self
            .points
            .read()
            .map_err(|e| IrisError::Collection(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<ScoredPoint> = points
            .iter()
            .map(|(id, point)| ScoredPoint {
                id: *id,
                score: cosine_similarity(query, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored)
    }

    /// Return up to `limit` stored payloads in scan (id) order, unscored.
    pub fn scroll(&self, limit: usize) -> Result<Vec<ImagePayload>> {
        let points = self
            .points
            .read()
            .map_err(|e| IrisError::Collection(format!("Lock poisoned: {}", e)))?;
        Ok(points
            .values()
            .take(limit)
            .map(|point| point.payload.clone())
            .collect())
    }

    /// Write the current contents to the snapshot file.
    pub fn flush(&self) -> Result<()> {
        let points = self
            .points
            .read()
            .map_err(|e| IrisError::Collection(format!("Lock poisoned: {}", e)))?;
        let entries: Vec<(u64, StoredPoint)> =
            points.iter().map(|(id, point)| (*id, point.clone())).collect();

        let bytes = bincode::serde::encode_to_vec(&entries, snapshot_config())
            .map_err(|e| IrisError::Serialization(format!("snapshot encode: {}", e)))?;
        let snapshot = Snapshot {
            dimension: self.config.dimension as u32,
            point_count: entries.len() as u64,
            checksum: *blake3::hash(&bytes).as_bytes(),
            bytes,
        };
        let raw = bincode::serde::encode_to_vec(&snapshot, snapshot_config())
            .map_err(|e| IrisError::Serialization(format!("snapshot encode: {}", e)))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Return the number of records currently stored.
    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Return true if the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed configuration this collection was created with.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Location of the on-disk snapshot.
    pub fn snapshot_path(&self) -> &Path {
        &self.path
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_collection(dir: &Path, dimension: usize) -> VectorCollection {
        VectorCollection::recreate(
            dir,
            CollectionConfig {
                name: "images".to_string(),
                dimension,
            },
        )
        .unwrap()
    }

    fn payload(name: &str) -> ImagePayload {
        ImagePayload::new("unstracted", name)
    }

    #[test]
    fn test_upsert_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 4);

        collection.upsert(0, vec![1.0, 0.0, 0.0, 0.0], payload("a.jpg")).unwrap();
        collection.upsert(1, vec![0.0, 1.0, 0.0, 0.0], payload("b.jpg")).unwrap();

        let hits = collection.search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[0].payload.filename, "a.jpg");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_orders_by_descending_score() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 3);

        collection.upsert(0, vec![-1.0, 0.0, 0.0], payload("far.jpg")).unwrap();
        collection.upsert(1, vec![1.0, 0.0, 0.0], payload("near.jpg")).unwrap();
        collection.upsert(2, vec![1.0, 1.0, 0.0], payload("mid.jpg")).unwrap();

        let hits = collection.search(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
        assert_eq!(hits[0].payload.filename, "near.jpg");
        assert_eq!(hits[2].payload.filename, "far.jpg");
    }

    #[test]
    fn test_search_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 4);
        let hits = collection.search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 2);
        for i in 0..10 {
            collection.upsert(i, vec![1.0, 0.0], payload(&format!("{i}.jpg"))).unwrap();
        }
        let hits = collection.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_upsert_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 4);
        let err = collection.upsert(0, vec![1.0, 0.0], payload("a.jpg")).unwrap_err();
        assert!(matches!(err, IrisError::Collection(_)));
        assert_eq!(collection.len(), 0);
    }

    #[test]
    fn test_search_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 4);
        assert!(collection.search(&[1.0, 0.0], 10).is_err());
    }

    #[test]
    fn test_upsert_overwrites_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 2);
        collection.upsert(0, vec![1.0, 0.0], payload("old.jpg")).unwrap();
        collection.upsert(0, vec![0.0, 1.0], payload("new.jpg")).unwrap();
        assert_eq!(collection.len(), 1);

        let hits = collection.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].payload.filename, "new.jpg");
    }

    #[test]
    fn test_scroll_caps_results() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 2);
        for i in 0..120 {
            collection.upsert(i, vec![1.0, 0.0], payload(&format!("{i}.jpg"))).unwrap();
        }
        let page = collection.scroll(100).unwrap();
        assert_eq!(page.len(), 100);
    }

    #[test]
    fn test_scroll_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 2);
        for i in 0..5 {
            collection.upsert(i, vec![1.0, 0.0], payload(&format!("{i}.jpg"))).unwrap();
        }
        let first = collection.scroll(100).unwrap();
        let second = collection.scroll(100).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flush_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectionConfig {
            name: "images".to_string(),
            dimension: 3,
        };
        let collection = VectorCollection::recreate(dir.path(), config.clone()).unwrap();
        collection.upsert(0, vec![1.0, 0.0, 0.0], payload("a.jpg")).unwrap();
        collection.upsert(1, vec![0.0, 1.0, 0.0], payload("b.jpg")).unwrap();
        collection.flush().unwrap();

        let loaded = VectorCollection::load(dir.path(), config).unwrap();
        assert_eq!(loaded.len(), 2);
        let hits = loaded.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].payload.filename, "a.jpg");
    }

    #[test]
    fn test_load_rejects_stale_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let collection = make_collection(dir.path(), 3);
        collection.upsert(0, vec![1.0, 0.0, 0.0], payload("a.jpg")).unwrap();
        collection.flush().unwrap();

        let err = VectorCollection::load(
            dir.path(),
            CollectionConfig {
                name: "images".to_string(),
                dimension: 8,
            },
        )
        .unwrap_err();
        assert!(matches!(err, IrisError::Collection(_)));
    }

    #[test]
    fn test_recreate_discards_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectionConfig {
            name: "images".to_string(),
            dimension: 2,
        };
        let collection = VectorCollection::recreate(dir.path(), config.clone()).unwrap();
        collection.upsert(0, vec![1.0, 0.0], payload("a.jpg")).unwrap();
        collection.flush().unwrap();
        assert!(collection.snapshot_path().exists());

        let fresh = VectorCollection::recreate(dir.path(), config).unwrap();
        assert!(fresh.is_empty());
        assert!(!fresh.snapshot_path().exists());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 100];
        let mut b = vec![0.0f32; 100];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0f32; 100];
        let b = vec![1.0f32; 100];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
