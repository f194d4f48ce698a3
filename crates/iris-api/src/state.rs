//! Application state shared across all route handlers.
//!
//! AppState holds the long-lived services constructed once at process
//! start, after ingestion has completed. It is passed to handlers via
//! axum's State extractor; there are no module-level singletons.

use std::sync::Arc;
use std::time::Instant;

use iris_vector::{SearchService, VectorCollection};

/// Shared application state.
///
/// All fields are cheap to clone across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Read-only query service (embed + k-NN + browse).
    pub search: Arc<SearchService>,
    /// The underlying collection, for size reporting.
    pub collection: VectorCollection,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState around a fully populated collection.
    pub fn new(search: SearchService, collection: VectorCollection) -> Self {
        Self {
            search: Arc::new(search),
            collection,
            start_time: Instant::now(),
        }
    }
}
