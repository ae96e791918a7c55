//! Common test utilities for the storage crate.

use bytes::Bytes;
use chunkyard_core::FileName;
use chunkyard_storage::{Assembler, ChunkStore, FilesystemBackend, chunk_key};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split data into chunks of specified size.
#[allow(dead_code)]
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    data.chunks(chunk_size).map(Bytes::copy_from_slice).collect()
}

#[allow(dead_code)]
pub fn file_name(name: &str) -> FileName {
    FileName::parse(name).expect("valid test filename")
}

/// Both storage areas in a temporary directory.
#[allow(dead_code)]
pub struct TestAreas {
    pub store: ChunkStore,
    pub assembler: Assembler,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestAreas {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let chunks = FilesystemBackend::new(temp_dir.path().join("chunks"))
            .await
            .expect("Failed to create chunk area");
        let files = FilesystemBackend::new(temp_dir.path().join("uploads"))
            .await
            .expect("Failed to create output area");

        let store = ChunkStore::new(Arc::new(chunks), Arc::new(files));
        let assembler = Assembler::new(store.clone());

        Self {
            store,
            assembler,
            _temp_dir: temp_dir,
        }
    }

    pub fn chunk_dir(&self) -> PathBuf {
        self._temp_dir.path().join("chunks")
    }

    /// Whether chunk `index` of session `generation` is in the chunk area.
    pub fn has_chunk(&self, filename: &FileName, generation: u64, index: u32) -> bool {
        self.chunk_dir()
            .join(chunk_key(filename, generation, index))
            .is_file()
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self._temp_dir.path().join("uploads").join(name)
    }
}
