//! SHA-256 digest computation for manifest entries and served objects.
//!
//! Digests are full-length (no truncation), lowercase hex. Callers that want
//! a shorter identifier truncate their own copy; this module never does.
//!
//! Digest comparisons go through [`digests_match`], which is constant-time.
//! Digest values are public, so this is a hardening measure rather than a
//! strict security boundary, but using one comparison discipline everywhere
//! avoids a class of subtle regressions.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Read chunk size for file digesting.
const READ_BUF_SIZE: usize = 8192;

/// Digest and byte count of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Hex-encoded SHA-256 of the full file content.
    pub sha256: String,
    /// Number of bytes read.
    pub size: u64,
}

/// Compute the SHA-256 hex digest of a byte slice.
#[must_use]
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the SHA-256 hex digest and size of a file.
///
/// Reads the file in 8 KiB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Propagates any I/O error from opening or reading the file unchanged.
pub fn digest_file(path: &Path) -> std::io::Result<FileDigest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut size: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

/// Compare two hex digests in constant time.
///
/// Length differences short-circuit inside `subtle`; equal-length inputs are
/// compared without early exit.
#[must_use]
pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn digest_bytes_empty() {
        // SHA-256 of empty input is well-known
        assert_eq!(
            digest_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_bytes_hello_world() {
        assert_eq!(
            digest_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn digest_bytes_deterministic() {
        assert_eq!(digest_bytes(b"test data"), digest_bytes(b"test data"));
    }

    #[test]
    fn digest_file_matches_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("object.bin");
        let content = b"file content for digesting";
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();

        let fd = digest_file(&path).unwrap();
        assert_eq!(fd.sha256, digest_bytes(content));
        assert_eq!(fd.size, content.len() as u64);
        assert_eq!(fd.sha256.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn digest_file_larger_than_read_buffer() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("large.bin");
        let content = vec![0xa5u8; READ_BUF_SIZE * 3 + 17];
        std::fs::write(&path, &content).unwrap();

        let fd = digest_file(&path).unwrap();
        assert_eq!(fd.sha256, digest_bytes(&content));
        assert_eq!(fd.size, content.len() as u64);
    }

    #[test]
    fn digest_file_missing_propagates_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = digest_file(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn digests_match_basic() {
        let a = digest_bytes(b"same");
        let b = digest_bytes(b"same");
        let c = digest_bytes(b"other");
        assert!(digests_match(&a, &b));
        assert!(!digests_match(&a, &c));
        assert!(!digests_match(&a, &a[..32]));
    }
}
