//! Route handler functions for the search API.
//!
//! Each handler extracts its input via axum extractors, calls into the
//! shared services, and returns a JSON response. Failures propagate as
//! [`ApiError`] with no retry and no partial result.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use iris_core::types::ImagePayload;
use iris_vector::SearchHit;

use crate::error::ApiError;
use crate::state::AppState;

/// Body for `POST /search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub text: String,
}

/// Response for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub indexed_images: u64,
}

/// POST /search - embed the query text and return ranked matches.
///
/// The response is an ordered array of `{score, path, filename}` objects,
/// highest similarity first, capped at 100 entries. An empty collection
/// returns an empty array.
pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    tracing::info!(query = %body.text, "Search request");
    let hits = state.search.search_text(&body.text).await?;
    tracing::debug!(hits = hits.len(), "Search response ready");
    Ok(Json(hits))
}

/// GET /all - every stored payload, capped at the first 100 records.
pub async fn all_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<ImagePayload>>, ApiError> {
    Ok(Json(state.search.browse()?))
}

/// GET /health - liveness plus collection size.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        indexed_images: state.collection.len() as u64,
    })
}
