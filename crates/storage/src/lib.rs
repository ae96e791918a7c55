//! Storage for the chunkyard upload service.
//!
//! This crate provides:
//! - An object-store abstraction with a local filesystem backend
//! - The chunk store, pairing a chunk area with an output area
//! - The assembler that turns acknowledged chunks into the final file

pub mod assembler;
pub mod backends;
pub mod chunks;
pub mod error;
pub mod traits;

pub use assembler::{Assembler, StagedFile};
pub use backends::filesystem::FilesystemBackend;
pub use chunks::{ChunkArtifact, ChunkKey, ChunkStore, chunk_key, parse_chunk_key};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use chunkyard_core::config::{StorageConfig, paths_overlap};
use std::sync::Arc;

/// Create both storage areas from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<ChunkStore> {
    config.validate().map_err(StorageError::Config)?;

    let chunks = FilesystemBackend::new(&config.chunk_dir).await?;
    let files = FilesystemBackend::new(&config.output_dir).await?;

    // The lexical check cannot see through symlinks or `..`
    let chunk_root = chunks.root().canonicalize()?;
    let output_root = files.root().canonicalize()?;
    if paths_overlap(&chunk_root, &output_root) {
        return Err(StorageError::Config(format!(
            "chunk area {} and output area {} resolve to overlapping directories",
            chunk_root.display(),
            output_root.display()
        )));
    }

    Ok(ChunkStore::new(Arc::new(chunks), Arc::new(files)))
}
