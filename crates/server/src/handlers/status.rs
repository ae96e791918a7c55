//! Upload status queries.

use crate::error::{ApiError, ApiResult};
use crate::registry::SessionOrigin;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use chunkyard_core::{StatusQuery, StatusResponse};

/// GET /status - Report which chunks of a file are already acknowledged.
///
/// Starts a session for unseen files and discards progress recorded for a
/// different size or modification time.
#[tracing::instrument(skip_all, fields(filename = %query.filename, total_chunks = query.total_chunks))]
pub async fn upload_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let identity = query.identity()?;

    let max_total_chunks = state.config.server.max_total_chunks;
    if query.total_chunks > max_total_chunks {
        return Err(ApiError::BadRequest(format!(
            "totalChunks {} exceeds maximum {max_total_chunks}",
            query.total_chunks
        )));
    }

    let (session, origin) = state
        .registry
        .get_or_create(identity, query.total_chunks)
        .await;

    if origin != SessionOrigin::Existing {
        tracing::debug!(origin = ?origin, "Upload session started");
    }
    if session.total_chunks() != query.total_chunks {
        tracing::warn!(
            session_total_chunks = session.total_chunks(),
            "Status query disagrees with the session's chunk count"
        );
    }

    // Completion is judged against the count this client declared
    let uploaded_chunks = session.acknowledged().await;
    let completed = uploaded_chunks.len() == query.total_chunks as usize;
    Ok(Json(StatusResponse {
        uploaded_chunks,
        completed,
    }))
}
