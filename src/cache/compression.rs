use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::dns::MAX_MESSAGE_SIZE;
use crate::error::{ForwarderError, Result};

/// Compresses a response payload before it goes to the remote backend.
/// Decompression discards anything that decodes larger than the DNS
/// message size cap, treating it as a corrupt/hostile entry.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(payload)
        .map_err(|e| ForwarderError::CacheBackend(format!("compress: {e}")))?;
    encoder
        .finish()
        .map_err(|e| ForwarderError::CacheBackend(format!("compress: {e}")))
}

pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ForwarderError::CacheBackend(format!("decompress: {e}")))?;
    if out.len() > MAX_MESSAGE_SIZE {
        return Err(ForwarderError::CacheBackend(
            "decompressed entry exceeds max message size".into(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress(&payload).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn rejects_oversized_decompression() {
        let huge = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let compressed = compress(&huge).unwrap();
        assert!(decompress(&compressed).is_err());
    }
}
