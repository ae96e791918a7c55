//! Concatenation of chunk artifacts into the final file.

use crate::chunks::ChunkStore;
use crate::error::{StorageError, StorageResult};
use crate::traits::StreamingUpload;
use chunkyard_core::FileName;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Builds assembled files from the chunk area.
#[derive(Clone)]
pub struct Assembler {
    store: ChunkStore,
}

/// A fully assembled file that is not yet visible in the output area.
///
/// Dropping it without calling [`Self::commit`] discards it.
pub struct StagedFile {
    output: Box<dyn StreamingUpload>,
}

impl StagedFile {
    /// Make the file visible, replacing any previous file of the same name.
    /// Returns the file size.
    pub async fn commit(self) -> StorageResult<u64> {
        self.output.finish().await
    }

    pub async fn discard(self) -> StorageResult<()> {
        self.output.abort().await
    }
}

impl Assembler {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// Concatenate chunks `0..total_chunks` of `filename` written by session
    /// `generation`, in index order, into a staged output file.
    ///
    /// Nothing in the output area changes until the result is committed.
    /// Chunk artifacts are left in place either way.
    #[instrument(skip(self), fields(filename = %filename))]
    pub async fn assemble(
        &self,
        filename: &FileName,
        generation: u64,
        total_chunks: u32,
    ) -> StorageResult<StagedFile> {
        let mut output = self.store.begin_file(filename).await?;

        for index in 0..total_chunks {
            let copied = async {
                let mut stream = self.store.chunk_stream(filename, generation, index).await?;
                while let Some(data) = stream.next().await {
                    output.write(data?).await?;
                }
                Ok::<(), StorageError>(())
            }
            .await;

            if let Err(e) = copied {
                if let Err(abort_err) = output.abort().await {
                    debug!(error = %abort_err, "Failed to discard partial assembly");
                }
                return Err(e);
            }
        }

        debug!(total_chunks, bytes = output.bytes_written(), "Assembled file");
        Ok(StagedFile { output })
    }

    /// Remove the chunk artifacts of session `generation`. Best effort.
    pub async fn cleanup(&self, filename: &FileName, generation: u64, total_chunks: u32) -> usize {
        self.store
            .remove_chunks(filename, generation, total_chunks)
            .await
    }
}
