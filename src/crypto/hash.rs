//! SHA-256 content hashing.
//!
//! Streamed in 4 KiB chunks so hashing a large file never pulls the whole
//! thing into memory (`original_source/src/encryption.py::generate_file_hash`
//! uses the same chunk size via `iter(lambda: f.read(4096), b"")`).

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{BackupError, Result};

const CHUNK_SIZE: usize = 4096;

/// Hex-encoded SHA-256 digest of the bytes in `data`.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 digest of the file at `path`, read in 4 KiB chunks.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| BackupError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| BackupError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn hash_data_is_stable() {
        let a = hash_data(b"hello world");
        let b = hash_data(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_file_matches_hash_data() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"some file contents").unwrap();
        let from_file = hash_file(file.path()).unwrap();
        let from_data = hash_data(b"some file contents");
        assert_eq!(from_file, from_data);
    }

    #[test]
    fn different_contents_hash_differently() {
        assert_ne!(hash_data(b"a"), hash_data(b"b"));
    }
}
