//! The chunk store: a chunk area holding per-chunk artifacts and an output
//! area holding assembled files.
//!
//! Both areas are independent [`ObjectStore`]s so that clearing chunk
//! artifacts can never reach an assembled file.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use bytes::Bytes;
use chunkyard_core::FileName;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Separator between the session part and the chunk index in artifact keys.
const CHUNK_SEPARATOR: &str = "_chunk_";

/// Key of the artifact holding chunk `index` of `filename`, written by the
/// upload session numbered `generation`.
///
/// Sessions that replace each other for the same filename never share keys.
pub fn chunk_key(filename: &FileName, generation: u64, index: u32) -> String {
    format!("{filename}_{generation}{CHUNK_SEPARATOR}{index}")
}

/// The parts of an artifact key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkKey<'a> {
    pub filename: &'a str,
    pub generation: u64,
    pub index: u32,
}

/// Split an artifact key back into its parts.
///
/// Splits on the last separators, so filenames that themselves contain
/// `_` or `_chunk_` still round-trip.
pub fn parse_chunk_key(key: &str) -> Option<ChunkKey<'_>> {
    let (session, index) = key.rsplit_once(CHUNK_SEPARATOR)?;
    let (filename, generation) = session.rsplit_once('_')?;
    if filename.is_empty() {
        return None;
    }
    Some(ChunkKey {
        filename,
        generation: parse_digits(generation)?,
        index: parse_digits(index)?,
    })
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// A chunk artifact found in the chunk area.
#[derive(Clone, Debug)]
pub struct ChunkArtifact {
    pub key: String,
    pub filename: String,
    pub generation: u64,
    pub index: u32,
    pub last_modified: Option<OffsetDateTime>,
}

/// Handle to both storage areas.
#[derive(Clone)]
pub struct ChunkStore {
    chunks: Arc<dyn ObjectStore>,
    files: Arc<dyn ObjectStore>,
}

impl ChunkStore {
    pub fn new(chunks: Arc<dyn ObjectStore>, files: Arc<dyn ObjectStore>) -> Self {
        Self { chunks, files }
    }

    /// Start writing chunk `index` of `filename` for session `generation`.
    ///
    /// The artifact only becomes visible when the returned upload is finished;
    /// an existing artifact for the same index is replaced.
    pub async fn begin_chunk(
        &self,
        filename: &FileName,
        generation: u64,
        index: u32,
    ) -> StorageResult<Box<dyn StreamingUpload>> {
        self.chunks
            .put_stream(&chunk_key(filename, generation, index))
            .await
    }

    /// Write a fully buffered chunk.
    pub async fn put_chunk(
        &self,
        filename: &FileName,
        generation: u64,
        index: u32,
        data: Bytes,
    ) -> StorageResult<()> {
        self.chunks
            .put(&chunk_key(filename, generation, index), data)
            .await
    }

    /// Stream the content of chunk `index` of `filename` for session `generation`.
    pub async fn chunk_stream(
        &self,
        filename: &FileName,
        generation: u64,
        index: u32,
    ) -> StorageResult<ByteStream> {
        match self
            .chunks
            .get_stream(&chunk_key(filename, generation, index))
            .await
        {
            Err(StorageError::NotFound(_)) => Err(StorageError::MissingChunk {
                filename: filename.to_string(),
                index,
            }),
            other => other,
        }
    }

    /// Delete the artifacts for chunks `0..total_chunks` of `filename`
    /// written by session `generation`.
    ///
    /// Best effort: missing artifacts are skipped and other failures are
    /// logged. Returns the number of artifacts removed.
    pub async fn remove_chunks(
        &self,
        filename: &FileName,
        generation: u64,
        total_chunks: u32,
    ) -> usize {
        let mut removed = 0;
        for index in 0..total_chunks {
            let key = chunk_key(filename, generation, index);
            match self.chunks.delete(&key).await {
                Ok(()) => removed += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to delete chunk artifact"),
            }
        }
        debug!(filename = %filename, generation, removed, "Removed chunk artifacts");
        removed
    }

    /// List every chunk artifact in the chunk area.
    ///
    /// Keys that do not follow the artifact naming scheme are ignored.
    pub async fn list_chunk_artifacts(&self) -> StorageResult<Vec<ChunkArtifact>> {
        let keys = self.chunks.list("").await?;
        let mut artifacts = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(parsed) = parse_chunk_key(&key) else {
                debug!(key = %key, "Ignoring unrecognized object in chunk area");
                continue;
            };
            let (filename, generation, index) =
                (parsed.filename.to_string(), parsed.generation, parsed.index);

            // The artifact may be consumed between list and head
            let last_modified = match self.chunks.head(&key).await {
                Ok(meta) => meta.last_modified,
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            artifacts.push(ChunkArtifact {
                key,
                filename,
                generation,
                index,
                last_modified,
            });
        }

        Ok(artifacts)
    }

    /// Delete one artifact returned by [`Self::list_chunk_artifacts`].
    ///
    /// Returns false if it was already gone.
    pub async fn delete_artifact(&self, artifact: &ChunkArtifact) -> StorageResult<bool> {
        match self.chunks.delete(&artifact.key).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Start writing the assembled file for `filename` in the output area.
    pub async fn begin_file(&self, filename: &FileName) -> StorageResult<Box<dyn StreamingUpload>> {
        self.files.put_stream(filename.as_str()).await
    }

    /// Size and modification time of an assembled file.
    pub async fn file_meta(&self, filename: &FileName) -> StorageResult<ObjectMeta> {
        self.files.head(filename.as_str()).await
    }

    /// Stream `len` bytes of an assembled file starting at `offset`.
    pub async fn file_range_stream(
        &self,
        filename: &FileName,
        offset: u64,
        len: u64,
    ) -> StorageResult<ByteStream> {
        self.files
            .get_range_stream(filename.as_str(), offset, len)
            .await
    }

    /// Names of the assembled files in the output area, sorted.
    pub async fn list_files(&self) -> StorageResult<Vec<String>> {
        let mut files: Vec<String> = self
            .files
            .list("")
            .await?
            .into_iter()
            .filter(|key| FileName::parse(key).is_ok())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Check both storage areas.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.chunks.health_check().await?;
        self.files.health_check().await
    }
}
