//! One-shot startup ingestion: scan a directory of images, embed each one,
//! and upsert it into the collection under a dense sequential id.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tracing::{info, warn};

use iris_core::error::{IrisError, Result};
use iris_core::types::ImagePayload;

use crate::collection::VectorCollection;
use crate::embedding::DynEmbedder;

/// File extensions accepted for indexing (matched case-insensitively).
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Emit a progress notice after this many successfully indexed images.
const PROGRESS_INTERVAL: u64 = 10;

/// Outcome of one directory entry during the ingestion pass.
#[derive(Debug)]
pub enum FileOutcome {
    /// Decoded, embedded, and upserted under the given id.
    Indexed { filename: String, id: u64 },
    /// Not an eligible image; consumed no id.
    Skipped { filename: String, reason: String },
    /// Decode, embedding, or upsert failed; consumed no id.
    Failed { filename: String, error: IrisError },
}

/// Aggregated result of an ingestion pass, one outcome per directory entry
/// in scan order.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub outcomes: Vec<FileOutcome>,
}

impl IngestSummary {
    /// Number of images successfully indexed.
    pub fn indexed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Indexed { .. }))
            .count()
    }

    /// Number of entries skipped by the extension allow-list.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Skipped { .. }))
            .count()
    }

    /// Number of entries that failed to decode or embed.
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Failed { .. }))
            .count()
    }
}

/// Populates the collection from a directory of image files, once, before
/// any query traffic is accepted.
pub struct ImageIngestor {
    collection: VectorCollection,
    embedder: Arc<dyn DynEmbedder>,
}

impl ImageIngestor {
    pub fn new(collection: VectorCollection, embedder: Arc<dyn DynEmbedder>) -> Self {
        Self {
            collection,
            embedder,
        }
    }

    /// Scan `dir` and index every eligible image.
    ///
    /// Entries are processed in lexicographic filename order so id
    /// assignment is reproducible across runs: ids start at 0 and increment
    /// only on success, so the stored ids are a dense sequence matching the
    /// sort order with no gaps from skipped or failed files. A single bad
    /// file never aborts the scan.
    ///
    /// A missing directory is not an error: it logs a warning and yields an
    /// empty summary.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();

        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Image directory not found, nothing to ingest");
            return Ok(summary);
        }

        let folder = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(dir = %dir.display(), "Loading images");

        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        let mut next_id: u64 = 0;
        for path in entries {
            let filename = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };

            if !has_image_extension(&path) {
                summary.outcomes.push(FileOutcome::Skipped {
                    filename,
                    reason: "unsupported extension".to_string(),
                });
                continue;
            }

            match self.index_file(&path, &folder, &filename, next_id).await {
                Ok(()) => {
                    summary.outcomes.push(FileOutcome::Indexed {
                        filename,
                        id: next_id,
                    });
                    next_id += 1;
                    if next_id % PROGRESS_INTERVAL == 0 {
                        info!(indexed = next_id, "Ingestion progress");
                    }
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to index image");
                    summary.outcomes.push(FileOutcome::Failed { filename, error: e });
                }
            }
        }

        info!(
            indexed = summary.indexed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Ingestion finished"
        );
        Ok(summary)
    }

    /// Decode one file, embed it, and upsert it under `id`.
    async fn index_file(&self, path: &Path, folder: &str, filename: &str, id: u64) -> Result<()> {
        let decoded = image::open(path)
            .map_err(|e| IrisError::Ingest(format!("failed to decode {}: {}", path.display(), e)))?;
        let image = DynamicImage::ImageRgb8(decoded.to_rgb8());

        let vector = self.embedder.embed_image_boxed(image).await?;
        self.collection
            .upsert(id, vector, ImagePayload::new(folder, filename))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
