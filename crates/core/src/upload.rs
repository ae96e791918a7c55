//! Upload identity and wire types.

use crate::filename::FileName;
use serde::{Deserialize, Serialize};

/// Client-declared identity of a file being uploaded.
///
/// Nothing here is verified: the fields are only compared against the values
/// recorded when the session was created to detect that the client is now
/// uploading a different version of the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileIdentity {
    /// The filename, also the session key.
    pub filename: FileName,
    /// Declared total size in bytes.
    pub file_size: u64,
    /// Declared last-modified timestamp (client clock, milliseconds).
    pub last_modified: i64,
}

impl FileIdentity {
    pub fn new(filename: FileName, file_size: u64, last_modified: i64) -> Self {
        Self {
            filename,
            file_size,
            last_modified,
        }
    }

    /// True when both identities describe the same version of the file.
    pub fn same_version(&self, other: &FileIdentity) -> bool {
        self.filename == other.filename
            && self.file_size == other.file_size
            && self.last_modified == other.last_modified
    }
}

/// Query parameters of `GET /status`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub filename: String,
    pub total_chunks: u32,
    pub file_size: u64,
    pub last_modified: i64,
}

impl StatusQuery {
    /// Validate the query and build the identity it declares.
    pub fn identity(&self) -> crate::Result<FileIdentity> {
        validate_total_chunks(self.total_chunks)?;
        let filename = FileName::parse(&self.filename)?;
        Ok(FileIdentity::new(
            filename,
            self.file_size,
            self.last_modified,
        ))
    }
}

/// Response of `GET /status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Acknowledged chunk indices, ascending.
    pub uploaded_chunks: Vec<u32>,
    /// Whether every declared chunk has been acknowledged.
    pub completed: bool,
}

/// Position of one uploaded chunk within its file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub filename: FileName,
    pub index: u32,
    pub total_chunks: u32,
}

impl ChunkDescriptor {
    /// Build a descriptor, enforcing `index < total_chunks`.
    pub fn new(filename: FileName, index: u32, total_chunks: u32) -> crate::Result<Self> {
        validate_total_chunks(total_chunks)?;
        if index >= total_chunks {
            return Err(crate::Error::InvalidChunkIndex(format!(
                "chunk {index} is out of range for {total_chunks} chunks"
            )));
        }
        Ok(Self {
            filename,
            index,
            total_chunks,
        })
    }
}

/// Parse a chunk index or count sent as a form field.
pub fn parse_chunk_number(field: &str, value: &str) -> crate::Result<u32> {
    value.trim().parse::<u32>().map_err(|e| {
        crate::Error::InvalidChunkIndex(format!("{field} must be a non-negative integer: {e}"))
    })
}

fn validate_total_chunks(total_chunks: u32) -> crate::Result<()> {
    if total_chunks == 0 {
        return Err(crate::Error::InvalidIdentity(
            "totalChunks must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Response of `POST /upload`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub success: bool,
    /// True only for the upload that completed and assembled the file.
    pub completed: bool,
}

/// Response of `GET /files`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<String>,
}
