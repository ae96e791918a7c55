//! Core domain types and shared logic for the chunkyard upload service.
//!
//! This crate defines the data model used across all other crates:
//! - Validated filenames and client-declared file identities
//! - Wire types for status queries, chunk uploads and listings
//! - Byte-range parsing for resumable downloads
//! - Configuration shared by the server and storage crates

pub mod config;
pub mod error;
pub mod filename;
pub mod range;
pub mod upload;

pub use error::{Error, Result};
pub use filename::FileName;
pub use range::ByteRange;
pub use upload::{
    ChunkDescriptor, ChunkUploadResponse, FileIdentity, FileListResponse, StatusQuery,
    StatusResponse,
};

/// Default maximum chunk payload: 32 MiB
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Default upper bound on the number of chunks a single file may declare.
pub const DEFAULT_MAX_TOTAL_CHUNKS: u32 = 100_000;
