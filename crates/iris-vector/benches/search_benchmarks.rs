//! Benchmark for brute-force k-NN search over a populated collection.
//!
//! Uses 1,000 mock-embedded images, which is representative of the folder
//! sizes this service indexes. Search is O(n), so results extrapolate
//! linearly for larger folders.

use criterion::{criterion_group, criterion_main, Criterion};

use iris_core::types::ImagePayload;
use iris_vector::collection::CollectionConfig;
use iris_vector::embedding::{DynEmbedder, MockEmbedder, MOCK_DIMENSION};
use iris_vector::VectorCollection;

const IMAGE_COUNT: u64 = 1_000;

/// Build a collection populated with `count` mock-embedded entries.
fn build_populated_collection(dir: &std::path::Path, count: u64) -> VectorCollection {
    let collection = VectorCollection::recreate(
        dir,
        CollectionConfig {
            name: "images".to_string(),
            dimension: MOCK_DIMENSION,
        },
    )
    .expect("recreate failed");

    let embedder = MockEmbedder::new();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    for i in 0..count {
        let vector = rt
            .block_on(embedder.embed_text_boxed(&format!("photo number {i}")))
            .expect("embed failed");
        collection
            .upsert(
                i,
                vector,
                ImagePayload::new("unstracted", &format!("{i}.jpg")),
            )
            .expect("upsert failed");
    }

    assert_eq!(collection.len(), count as usize);
    collection
}

fn bench_knn_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let collection = build_populated_collection(dir.path(), IMAGE_COUNT);

    let embedder = MockEmbedder::new();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");
    let query = rt
        .block_on(embedder.embed_text_boxed("a photo of a cat"))
        .expect("query embed failed");

    let mut group = c.benchmark_group("knn_search");
    group.bench_function(format!("top100_{}images", IMAGE_COUNT), |b| {
        b.iter(|| {
            let hits = collection.search(&query, 100).expect("search failed");
            assert_eq!(hits.len(), 100);
            hits
        });
    });
    group.finish();
}

criterion_group!(benches, bench_knn_search);
criterion_main!(benches);
