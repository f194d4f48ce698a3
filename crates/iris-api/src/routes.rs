//! Router setup with API routes, middleware, and static image mounts.

use std::path::Path;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
///
/// `source_dir` is the ingestion source folder and `image_root` the
/// secondary image directory; both are exposed read-only under a mount
/// named after the directory, matching the `path` field stored in
/// payloads. The secondary root is a passive external mount this service
/// never writes to.
pub fn create_router(state: AppState, source_dir: &Path, image_root: &Path) -> Router {
    let mut router = Router::new()
        .route("/search", post(handlers::search))
        .route("/all", get(handlers::all_images))
        .route("/health", get(handlers::health));

    let mut mounted: Vec<String> = Vec::new();
    for dir in [source_dir, image_root] {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            if mounted.iter().any(|m| m == name) {
                continue;
            }
            router = router.nest_service(&format!("/{}", name), ServeDir::new(dir));
            mounted.push(name.to_string());
        }
    }

    router
        .layer(TraceLayer::new_for_http())
        // Browser frontends run on a different origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}
