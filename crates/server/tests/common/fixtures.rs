//! Test fixtures for generating test data and request bodies.

use bytes::Bytes;

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

pub const BOUNDARY: &str = "chunkyard-test-boundary";

/// One part of a multipart form.
#[allow(dead_code)]
pub enum Part<'a> {
    Text(&'a str, String),
    File(&'a [u8]),
}

/// Encode a `multipart/form-data` body. Returns the content type and body.
#[allow(dead_code)]
pub fn multipart_body(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(data) => {
                body.extend_from_slice(
                    b"Content-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\n\
                      Content-Type: application/octet-stream\r\n\r\n",
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// The form the browser client sends for one chunk.
#[allow(dead_code)]
pub fn chunk_form<'a>(filename: &str, index: u32, total: u32, data: &'a [u8]) -> Vec<Part<'a>> {
    vec![
        Part::Text("filename", filename.to_string()),
        Part::Text("chunkNumber", index.to_string()),
        Part::Text("totalChunks", total.to_string()),
        Part::File(data),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let a = seeded_bytes(42, 100);
        let b = seeded_bytes(42, 100);
        assert_eq!(a, b);

        let c = seeded_bytes(43, 100);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_into_chunks() {
        let data = seeded_bytes(1, 100);
        let chunks = split_into_chunks(&data, 30);
        assert_eq!(chunks.len(), 4); // 30 + 30 + 30 + 10

        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(reassembled, data.as_ref());
    }
}
