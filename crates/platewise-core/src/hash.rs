//! Content addressing for analysis inputs.
//!
//! Every cache key is a BLAKE3 digest of the request content. Image bytes are
//! hashed as-is; text descriptions are normalized first so that requests
//! differing only in case or spacing share a key.

use crate::types::AnalysisInput;
use blake3::Hasher as Blake3Hasher;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Computes content addresses. Stateless.
pub struct ContentHasher;

impl ContentHasher {
    /// Hash raw bytes to a 64-character lowercase hex digest.
    pub fn hash_bytes(data: &[u8]) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        hasher.finalize().to_hex().to_string()
    }

    /// Hash a text description after normalization.
    pub fn hash_text(text: &str) -> String {
        Self::hash_bytes(Self::normalize_text(text).as_bytes())
    }

    /// Trim, collapse whitespace runs to a single space, and lowercase.
    pub fn normalize_text(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Hash a file's contents without loading it all into memory.
    ///
    /// Produces the same digest as [`ContentHasher::hash_bytes`] over the
    /// file's bytes.
    pub fn hash_file(path: &Path) -> std::io::Result<String> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Blake3Hasher::new();

        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Cache key for an analysis input.
    pub fn hash_input(input: &AnalysisInput) -> String {
        match input {
            AnalysisInput::Image { bytes, .. } => Self::hash_bytes(bytes),
            AnalysisInput::Text(text) => Self::hash_text(text),
        }
    }
}
