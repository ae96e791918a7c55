//! Chunk upload handler.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    ASSEMBLY_DURATION, ASSEMBLY_FAILURES, BYTES_UPLOADED, CHUNK_UPLOAD_DURATION, CHUNKS_UPLOADED,
    UPLOAD_SESSIONS_COMPLETED, record_upload_error,
};
use crate::registry::{Acknowledgement, UploadSession};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use bytes::{Bytes, BytesMut};
use chunkyard_core::upload::parse_chunk_number;
use chunkyard_core::{ChunkDescriptor, ChunkUploadResponse, FileName};
use std::sync::Arc;
use std::time::Instant;
use tracing::Span;

/// Multipart field names, as sent by the browser client.
const FIELD_FILENAME: &str = "filename";
const FIELD_CHUNK_NUMBER: &str = "chunkNumber";
const FIELD_TOTAL_CHUNKS: &str = "totalChunks";
const FIELD_FILE: &str = "file";

/// A validated chunk and the session it belongs to.
struct ChunkTarget {
    session: Arc<UploadSession>,
    descriptor: ChunkDescriptor,
}

/// Text fields collected from the form so far.
#[derive(Default)]
struct ChunkForm {
    filename: Option<String>,
    chunk_number: Option<String>,
    total_chunks: Option<String>,
}

impl ChunkForm {
    fn set(&mut self, name: &str, value: String) -> ApiResult<()> {
        let slot = match name {
            FIELD_FILENAME => &mut self.filename,
            FIELD_CHUNK_NUMBER => &mut self.chunk_number,
            FIELD_TOTAL_CHUNKS => &mut self.total_chunks,
            _ => return Ok(()),
        };
        if slot.is_some() {
            return Err(ApiError::BadRequest(format!("duplicate field: {name}")));
        }
        *slot = Some(value);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.filename.is_some() && self.chunk_number.is_some() && self.total_chunks.is_some()
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest(format!("missing field: {name}")))
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("invalid multipart body: {e}"))
}

/// Where the chunk payload ended up while reading the form.
enum Payload {
    /// Streamed straight into the chunk area.
    Stored { target: ChunkTarget, bytes: u64 },
    /// Arrived before the fields naming it; held in memory.
    Buffered(Bytes),
}

/// POST /upload - Receive one chunk of a file.
///
/// Multipart form with `filename`, `chunkNumber`, `totalChunks` and `file`.
/// The upload that acknowledges the last missing chunk assembles the file
/// before responding and is the only one answered with `completed: true`.
#[tracing::instrument(
    skip_all,
    fields(filename = tracing::field::Empty, chunk = tracing::field::Empty)
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ChunkUploadResponse>> {
    let start_time = Instant::now();

    let result = receive_chunk(&state, multipart).await;
    if let Err(e) = &result {
        record_upload_error(e.code());
        tracing::debug!(error = %e, "Chunk upload rejected");
    }

    CHUNK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());
    result.map(Json)
}

async fn receive_chunk(
    state: &AppState,
    mut multipart: Multipart,
) -> ApiResult<ChunkUploadResponse> {
    let max_chunk_size = state.config.server.max_chunk_size;
    let mut form = ChunkForm::default();
    let mut payload: Option<Payload> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name != FIELD_FILE {
            let value = field.text().await.map_err(multipart_error)?;
            form.set(&name, value)?;
            continue;
        }

        if payload.is_some() {
            return Err(ApiError::BadRequest(format!("duplicate field: {FIELD_FILE}")));
        }

        payload = Some(if form.is_complete() {
            let target = resolve_target(state, &form).await?;
            let bytes = stream_chunk(state, &target, &mut field, max_chunk_size).await?;
            Payload::Stored { target, bytes }
        } else {
            Payload::Buffered(read_bounded(&mut field, max_chunk_size).await?)
        });
    }

    let (target, bytes) = match payload {
        Some(Payload::Stored { target, bytes }) => (target, bytes),
        Some(Payload::Buffered(data)) => {
            let target = resolve_target(state, &form).await?;
            let bytes = data.len() as u64;
            state
                .store
                .put_chunk(
                    &target.descriptor.filename,
                    target.session.generation(),
                    target.descriptor.index,
                    data,
                )
                .await?;
            (target, bytes)
        }
        None => {
            // Field errors take precedence over the missing payload
            resolve_target(state, &form).await?;
            return Err(ApiError::BadRequest(format!("missing field: {FIELD_FILE}")));
        }
    };

    CHUNKS_UPLOADED.inc();
    BYTES_UPLOADED.inc_by(bytes);

    let ChunkTarget {
        session,
        descriptor,
    } = target;

    let completed = match session.acknowledge(descriptor.index).await {
        Acknowledgement::Pending { acked } => {
            tracing::debug!(
                acked,
                total_chunks = descriptor.total_chunks,
                bytes,
                "Chunk acknowledged"
            );
            false
        }
        Acknowledgement::AlreadyAssembling => {
            tracing::debug!("Chunk acknowledged while assembly is in progress");
            false
        }
        Acknowledgement::Retired => {
            // The artifact is left for the reaper's orphan sweep
            return Err(superseded(&descriptor.filename));
        }
        Acknowledgement::Complete => {
            complete_upload(state, &session).await?;
            true
        }
    };

    Ok(ChunkUploadResponse {
        success: true,
        completed,
    })
}

/// Validate the form fields and find the session they address.
async fn resolve_target(state: &AppState, form: &ChunkForm) -> ApiResult<ChunkTarget> {
    let filename = FileName::parse(required(&form.filename, FIELD_FILENAME)?)?;
    Span::current().record("filename", filename.as_str());

    let index = parse_chunk_number(
        FIELD_CHUNK_NUMBER,
        required(&form.chunk_number, FIELD_CHUNK_NUMBER)?,
    )?;
    let total_chunks = parse_chunk_number(
        FIELD_TOTAL_CHUNKS,
        required(&form.total_chunks, FIELD_TOTAL_CHUNKS)?,
    )?;
    Span::current().record("chunk", index);

    let max_total_chunks = state.config.server.max_total_chunks;
    if total_chunks > max_total_chunks {
        return Err(ApiError::BadRequest(format!(
            "totalChunks {total_chunks} exceeds maximum {max_total_chunks}"
        )));
    }

    let descriptor = ChunkDescriptor::new(filename, index, total_chunks)?;

    let session = state
        .registry
        .get(&descriptor.filename)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "upload session not found for {}; query /status first",
                descriptor.filename
            ))
        })?;

    if session.total_chunks() != descriptor.total_chunks {
        return Err(ApiError::BadRequest(format!(
            "totalChunks {} does not match the session's {}",
            descriptor.total_chunks,
            session.total_chunks()
        )));
    }

    Ok(ChunkTarget {
        session,
        descriptor,
    })
}

/// Stream the `file` field into the chunk area, enforcing the size limit.
///
/// The artifact is only committed once the whole field has been read.
async fn stream_chunk(
    state: &AppState,
    target: &ChunkTarget,
    field: &mut Field<'_>,
    max_chunk_size: u64,
) -> ApiResult<u64> {
    let mut upload = state
        .store
        .begin_chunk(
            &target.descriptor.filename,
            target.session.generation(),
            target.descriptor.index,
        )
        .await?;

    let copied = async {
        while let Some(data) = field.chunk().await.map_err(multipart_error)? {
            let size = upload.bytes_written() + data.len() as u64;
            if size > max_chunk_size {
                return Err(ApiError::PayloadTooLarge {
                    size,
                    max: max_chunk_size,
                });
            }
            upload.write(data).await?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = copied {
        if let Err(abort_err) = upload.abort().await {
            tracing::warn!(error = %abort_err, "Failed to discard partial chunk");
        }
        return Err(e);
    }

    Ok(upload.finish().await?)
}

/// Read the `file` field into memory, enforcing the size limit.
async fn read_bounded(field: &mut Field<'_>, max_chunk_size: u64) -> ApiResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(data) = field.chunk().await.map_err(multipart_error)? {
        let size = (buf.len() + data.len()) as u64;
        if size > max_chunk_size {
            return Err(ApiError::PayloadTooLarge {
                size,
                max: max_chunk_size,
            });
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

fn superseded(filename: &FileName) -> ApiError {
    ApiError::Superseded(format!(
        "a newer upload of {filename} replaced this one; query /status again"
    ))
}

/// Assemble a fully acknowledged upload, then retire its chunks and session.
///
/// On failure the session and its chunks are kept and completion is re-armed,
/// so re-uploading any chunk retries the assembly. A session replaced while
/// assembling drops its result instead of publishing it.
async fn complete_upload(state: &AppState, session: &Arc<UploadSession>) -> ApiResult<()> {
    let filename = session.filename();
    let generation = session.generation();
    let total_chunks = session.total_chunks();
    let start_time = Instant::now();

    let committed = match state
        .assembler
        .assemble(filename, generation, total_chunks)
        .await
    {
        Ok(staged) => session.commit_assembly(staged).await,
        Err(e) => Err(e),
    };

    match committed {
        Ok(Some(bytes)) => {
            ASSEMBLY_DURATION.observe(start_time.elapsed().as_secs_f64());
            UPLOAD_SESSIONS_COMPLETED.inc();

            // Chunks go first so a status query meanwhile still sees a completed session
            state
                .assembler
                .cleanup(filename, generation, total_chunks)
                .await;
            state.registry.remove_session(session).await;

            tracing::info!(total_chunks, bytes, "Upload assembled");
            Ok(())
        }
        Ok(None) => {
            state
                .assembler
                .cleanup(filename, generation, total_chunks)
                .await;
            tracing::info!(total_chunks, "Upload replaced during assembly, result discarded");
            Err(superseded(filename))
        }
        Err(e) => {
            session.assembly_failed().await;
            ASSEMBLY_FAILURES.inc();
            tracing::error!(total_chunks, error = %e, "Assembly failed");
            Err(ApiError::AssemblyFailed(e.to_string()))
        }
    }
}
