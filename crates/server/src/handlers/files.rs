//! Listing of assembled files.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use chunkyard_core::FileListResponse;

/// GET /files - List assembled files, sorted by name.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<FileListResponse>> {
    let files = state.store.list_files().await?;
    Ok(Json(FileListResponse { files }))
}
