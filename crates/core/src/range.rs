//! HTTP `Range` header parsing for resumable downloads.
//!
//! Only single `bytes` ranges are supported: `bytes=N-`, `bytes=N-M` and the
//! suffix form `bytes=-N`.

use std::fmt;

/// A parsed (but not yet size-resolved) byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=N-`: from offset `N` to the end.
    From(u64),
    /// `bytes=N-M`: inclusive range.
    Bounded { start: u64, end: u64 },
    /// `bytes=-N`: the last `N` bytes.
    Suffix(u64),
}

/// A byte range resolved against a concrete file size.
///
/// `end` is inclusive, matching `Content-Range` semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parse a `Range` header value.
    pub fn parse(header: &str) -> crate::Result<Self> {
        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| crate::Error::InvalidRange(format!("unsupported range unit: {header}")))?
            .trim();

        if spec.contains(',') {
            return Err(crate::Error::InvalidRange(
                "multiple ranges are not supported".to_string(),
            ));
        }

        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| crate::Error::InvalidRange(format!("missing '-' in range: {spec}")))?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (true, true) => Err(crate::Error::InvalidRange(
                "range has neither start nor end".to_string(),
            )),
            (true, false) => Ok(Self::Suffix(parse_offset(end)?)),
            (false, true) => Ok(Self::From(parse_offset(start)?)),
            (false, false) => {
                let start = parse_offset(start)?;
                let end = parse_offset(end)?;
                if end < start {
                    return Err(crate::Error::InvalidRange(format!(
                        "range end {end} is before start {start}"
                    )));
                }
                Ok(Self::Bounded { start, end })
            }
        }
    }

    /// Resolve against a file of `size` bytes.
    ///
    /// Returns `None` when the range is not satisfiable (416).
    pub fn resolve(&self, size: u64) -> Option<ResolvedRange> {
        if size == 0 {
            return None;
        }
        let last = size - 1;

        match *self {
            Self::From(start) if start <= last => Some(ResolvedRange { start, end: last }),
            Self::Bounded { start, end } if start <= last => Some(ResolvedRange {
                start,
                end: end.min(last),
            }),
            Self::Suffix(len) if len > 0 => Some(ResolvedRange {
                start: size.saturating_sub(len),
                end: last,
            }),
            _ => None,
        }
    }
}

fn parse_offset(value: &str) -> crate::Result<u64> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(crate::Error::InvalidRange(format!(
            "range offset is not a non-negative integer: {value}"
        )));
    }
    value
        .parse()
        .map_err(|e| crate::Error::InvalidRange(format!("invalid range offset {value}: {e}")))
}

impl ResolvedRange {
    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A resolved range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Render the `Content-Range` header value for a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
