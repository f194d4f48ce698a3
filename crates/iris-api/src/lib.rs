//! Iris HTTP API - axum routes for text search, browsing the collection,
//! health, and the read-only static image mounts.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
