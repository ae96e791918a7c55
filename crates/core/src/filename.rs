//! Client-supplied filenames.
//!
//! A filename is both the session key and part of the on-disk names in the
//! chunk and output areas, so it is validated once at the edge and passed
//! around as a [`FileName`] afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated flat filename (no directory components).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Maximum filename length in bytes. Leaves room for the session, chunk and
    /// temporary-file suffixes within the common 255-byte name limit.
    pub const MAX_LEN: usize = 160;

    /// Parse a filename, rejecting anything that could address a path
    /// outside of a single flat directory.
    pub fn parse(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::Error::InvalidFileName(
                "filename cannot be empty".to_string(),
            ));
        }

        if name.len() > Self::MAX_LEN {
            return Err(crate::Error::InvalidFileName(format!(
                "filename must be at most {} bytes, got {}",
                Self::MAX_LEN,
                name.len()
            )));
        }

        // Leading-dot names are reserved for in-flight temporary files.
        if name.starts_with('.') {
            return Err(crate::Error::InvalidFileName(
                "filename cannot start with '.'".to_string(),
            ));
        }

        if let Some(c) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
            return Err(crate::Error::InvalidFileName(format!(
                "invalid character in filename: {c:?}"
            )));
        }

        if name.chars().any(char::is_control) {
            return Err(crate::Error::InvalidFileName(
                "filename contains control characters".to_string(),
            ));
        }

        Ok(Self(name.to_string()))
    }

    /// Get the filename string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<FileName> for String {
    fn from(value: FileName) -> Self {
        value.0
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileName({})", self.0)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
