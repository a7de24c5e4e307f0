//! SHA-256 digests and byte comparison
//!
//! Digests are plain lowercase hex; the password record stores exactly one
//! such line.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::{Error, Result};

/// Hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compare two files byte-for-byte, short-circuiting on length.
pub fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = a.metadata().map_err(|e| Error::io(a, e))?;
    let meta_b = b.metadata().map_err(|e| Error::io(b, e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut ra = BufReader::new(File::open(a).map_err(|e| Error::io(a, e))?);
    let mut rb = BufReader::new(File::open(b).map_err(|e| Error::io(b, e))?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = ra.read(&mut buf_a).map_err(|e| Error::io(a, e))?;
        if n == 0 {
            return Ok(true);
        }
        rb.read_exact(&mut buf_b[..n]).map_err(|e| Error::io(b, e))?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Compare a file on disk with an in-memory buffer.
pub fn file_equals_bytes(path: &Path, content: &[u8]) -> Result<bool> {
    let meta = path.metadata().map_err(|e| Error::io(path, e))?;
    if meta.len() != content.len() as u64 {
        return Ok(false);
    }
    let on_disk = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(on_disk == content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn files_equal_detects_same_length_difference() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, "aaaa").unwrap();
        std::fs::write(&b, "aaab").unwrap();
        assert!(!files_equal(&a, &b).unwrap());

        std::fs::write(&b, "aaaa").unwrap();
        assert!(files_equal(&a, &b).unwrap());
        assert!(file_equals_bytes(&a, b"aaaa").unwrap());
        assert!(!file_equals_bytes(&a, b"aaa").unwrap());
    }
}
