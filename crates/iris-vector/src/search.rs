//! Query-side services: text search and the capped browse scan.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use iris_core::error::Result;
use iris_core::types::ImagePayload;

use crate::collection::VectorCollection;
use crate::embedding::DynEmbedder;

/// Maximum hits returned for a text search.
pub const SEARCH_LIMIT: usize = 100;

/// Maximum payloads returned by a browse scan. The scan never paginates
/// past the first page.
pub const BROWSE_LIMIT: usize = 100;

/// A scored match with its stored payload fields merged alongside the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Cosine similarity between the query and the stored vector.
    pub score: f64,
    #[serde(flatten)]
    pub payload: ImagePayload,
}

/// Read-only query service over the shared collection and embedder.
///
/// Uses dynamic dispatch (`Arc<dyn DynEmbedder>`) so that production code
/// can supply `ClipEmbedder` while tests use `MockEmbedder`.
pub struct SearchService {
    collection: VectorCollection,
    embedder: Arc<dyn DynEmbedder>,
}

impl SearchService {
    pub fn new(collection: VectorCollection, embedder: Arc<dyn DynEmbedder>) -> Self {
        Self {
            collection,
            embedder,
        }
    }

    /// Embed the query text and return the nearest neighbors in the
    /// collection's native descending-score order.
    ///
    /// No minimum-score cutoff is applied: ranking, not thresholding, is
    /// the selection mechanism. Empty text is embedded as-is. An empty
    /// collection yields an empty vec.
    pub async fn search_text(&self, text: &str) -> Result<Vec<SearchHit>> {
        let query = self.embedder.embed_text_boxed(text).await?;
        let points = self.collection.search(&query, SEARCH_LIMIT)?;
        debug!(hits = points.len(), "Text search complete");
        Ok(points
            .into_iter()
            .map(|point| SearchHit {
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    /// Every stored payload, unscored, capped at the first page.
    pub fn browse(&self) -> Result<Vec<ImagePayload>> {
        self.collection.scroll(BROWSE_LIMIT)
    }

    /// The collection this service reads from.
    pub fn collection(&self) -> &VectorCollection {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::collection::CollectionConfig;
    use crate::embedding::{MockEmbedder, MOCK_DIMENSION};

    fn make_service(dir: &std::path::Path) -> SearchService {
        let collection = VectorCollection::recreate(
            dir,
            CollectionConfig {
                name: "images".to_string(),
                dimension: MOCK_DIMENSION,
            },
        )
        .unwrap();
        SearchService::new(collection, Arc::new(MockEmbedder::new()))
    }

    #[tokio::test]
    async fn test_search_empty_collection_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let service = make_service(tmp.path());
        let hits = service.search_text("anything").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_returns_descending_scores() {
        let tmp = tempfile::tempdir().unwrap();
        let service = make_service(tmp.path());

        // Store the query's own vector and its negation so the ranking is
        // unambiguous: similarity 1.0 first, -1.0 last.
        let query = service
            .embedder
            .embed_text_boxed("red bicycle")
            .await
            .unwrap();
        let negated: Vec<f32> = query.iter().map(|v| -v).collect();
        service
            .collection()
            .upsert(0, negated, ImagePayload::new("unstracted", "far.jpg"))
            .unwrap();
        service
            .collection()
            .upsert(1, query, ImagePayload::new("unstracted", "near.jpg"))
            .unwrap();

        let hits = service.search_text("red bicycle").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.filename, "near.jpg");
        assert!(hits[0].score > hits[1].score);
        assert!((hits[0].score - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_search_accepts_empty_text() {
        let tmp = tempfile::tempdir().unwrap();
        let service = make_service(tmp.path());
        let embedder = MockEmbedder::new();
        let vector = embedder.embed_text_boxed("whatever").await.unwrap();
        service
            .collection()
            .upsert(0, vector, ImagePayload::new("unstracted", "a.jpg"))
            .unwrap();

        let hits = service.search_text("").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_hit_merges_score_and_payload_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let service = make_service(tmp.path());
        let embedder = MockEmbedder::new();
        let vector = embedder.embed_text_boxed("cat").await.unwrap();
        service
            .collection()
            .upsert(0, vector, ImagePayload::new("unstracted", "cat.jpg"))
            .unwrap();

        let hits = service.search_text("cat").await.unwrap();
        let json = serde_json::to_value(&hits[0]).unwrap();
        assert!(json["score"].is_f64());
        assert_eq!(json["path"], "/unstracted/cat.jpg");
        assert_eq!(json["filename"], "cat.jpg");
    }

    #[tokio::test]
    async fn test_browse_caps_at_first_page() {
        let tmp = tempfile::tempdir().unwrap();
        let service = make_service(tmp.path());
        let embedder = MockEmbedder::new();
        for i in 0..120u64 {
            let vector = embedder.embed_text_boxed(&format!("img {i}")).await.unwrap();
            service
                .collection()
                .upsert(i, vector, ImagePayload::new("unstracted", &format!("{i}.jpg")))
                .unwrap();
        }

        let page = service.browse().unwrap();
        assert_eq!(page.len(), BROWSE_LIMIT);
    }

    #[tokio::test]
    async fn test_browse_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let service = make_service(tmp.path());
        let embedder = MockEmbedder::new();
        for i in 0..3u64 {
            let vector = embedder.embed_text_boxed(&format!("img {i}")).await.unwrap();
            service
                .collection()
                .upsert(i, vector, ImagePayload::new("unstracted", &format!("{i}.jpg")))
                .unwrap();
        }

        let first = service.browse().unwrap();
        let second = service.browse().unwrap();
        assert_eq!(first, second);
    }
}
