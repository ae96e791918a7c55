//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-flight temporary files. Objects are written next to their
/// final path under this prefix and renamed into place on completion.
const TEMP_PREFIX: char = '.';

/// Local filesystem object store rooted at one directory.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// The root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs on the blocking pool because it canonicalizes and stats paths.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Resolve `key` under `root`, rejecting anything that would escape it,
    /// including escapes through symlinks.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "absolute keys not allowed: {key}"
            )));
        }

        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Check the path itself if it exists, otherwise its nearest existing
        // ancestor, so new files cannot be created through a symlinked directory.
        let mut candidate = path.as_path();
        loop {
            match std::fs::symlink_metadata(candidate) {
                Ok(meta) => {
                    let canonical = candidate.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;

                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }

            match candidate.parent() {
                Some(parent) => candidate = parent,
                None => return Ok(path),
            }
        }
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Unique sibling path used while an object is being written.
    fn temp_path_for(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{TEMP_PREFIX}{name}.tmp.{}", Uuid::new_v4()))
    }

    async fn open(&self, key: &str) -> StorageResult<fs::File> {
        let path = self.key_path(key).await?;
        fs::File::open(&path).await.map_err(|e| not_found_or_io(e, key))
    }
}

fn not_found_or_io(e: std::io::Error, key: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

/// Stream at most `limit` bytes from `file` in fixed-size reads.
fn read_stream(file: fs::File, limit: u64) -> ByteStream {
    let stream = async_stream::try_stream! {
        let mut reader = file.take(limit);
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };
    Box::pin(stream)
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(e, key))?;

        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let file = self.open(key).await?;
        Ok(read_stream(file, u64::MAX))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_range_stream(
        &self,
        key: &str,
        offset: u64,
        len: u64,
    ) -> StorageResult<ByteStream> {
        let mut file = self.open(key).await?;
        let size = file.metadata().await?.len();

        let end = offset.checked_add(len).ok_or_else(|| {
            StorageError::InvalidRange(format!("offset {offset} + length {len} overflows"))
        })?;
        if end > size {
            return Err(StorageError::InvalidRange(format!(
                "range {offset}..{end} exceeds object size {size}"
            )));
        }

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        Ok(read_stream(file, len))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let mut upload = self.put_stream(key).await?;
        if let Err(e) = upload.write(data).await {
            upload.abort().await?;
            return Err(e);
        }
        upload.finish().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        // Unique temp name so concurrent writers to the same key never share a file
        let temp_path = Self::temp_path_for(&path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file: Some(file),
            temp_path,
            final_path: path,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut results = Vec::new();

        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                // Skip in-flight temporaries
                if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    continue;
                }

                let path = entry.path();
                // file_type() does not follow symlinks, so links are never listed
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    let key = rel.to_string_lossy().to_string();
                    if key.starts_with(prefix) {
                        results.push(key);
                    }
                }
            }
        }

        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for filesystem backend.
struct FilesystemUpload {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl FilesystemUpload {
    fn file(&mut self) -> StorageResult<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("upload already closed")))
    }
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file()?.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let file = self.file()?;
        file.flush().await?;
        // Data must be on disk before the rename makes it visible
        file.sync_all().await?;
        self.file = None;
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.temp_path = PathBuf::new();
        Ok(self.bytes_written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.file = None;
        let temp_path = std::mem::take(&mut self.temp_path);
        match fs::remove_file(&temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FilesystemUpload {
    fn drop(&mut self) {
        // Neither finished nor aborted, e.g. the request future was cancelled
        if !self.temp_path.as_os_str().is_empty() {
            self.file = None;
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
