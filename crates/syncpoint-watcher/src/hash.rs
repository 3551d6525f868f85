//! Content fingerprinting over raw file bytes.
//!
//! Fingerprints are `sha256:<hex>` over the bytes exactly as stored. No line
//! ending normalization: the same logical text hashes differently if its
//! endings differ, which is the intended behavior.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Errors from file hashing.
#[derive(Debug)]
pub enum HashError {
    /// File exceeds the caller's size bound
    TooLarge { size: u64, max: u64 },
    Io(io::Error),
}

impl std::fmt::Display for HashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashError::TooLarge { size, max } => {
                write!(f, "file size {} exceeds maximum {}", size, max)
            }
            HashError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HashError {}

impl From<io::Error> for HashError {
    fn from(e: io::Error) -> Self {
        HashError::Io(e)
    }
}

/// Compute the fingerprint of a byte slice.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{:x}", hasher.finalize())
}

/// Compute the fingerprint of a file by streaming its bytes.
///
/// Fails with `HashError::TooLarge` before reading anything when the file
/// exceeds `max_size_bytes`.
pub async fn compute_file_hash(path: &Path, max_size_bytes: u64) -> Result<String, HashError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > max_size_bytes {
        return Err(HashError::TooLarge {
            size: metadata.len(),
            max: max_size_bytes,
        });
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_of_known_bytes() {
        // SHA-256 of "hello world"
        assert_eq!(
            compute_hash(b"hello world"),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn hash_of_empty_bytes() {
        assert_eq!(
            compute_hash(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn file_hash_matches_content_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let hash = compute_file_hash(&path, 10 * 1024 * 1024).await.unwrap();
        assert_eq!(hash, compute_hash(b"hello world"));
    }

    #[tokio::test]
    async fn file_hash_enforces_size_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        tokio::fs::write(&path, vec![0u8; 64]).await.unwrap();

        let err = compute_file_hash(&path, 63).await.unwrap_err();
        assert!(matches!(err, HashError::TooLarge { size: 64, max: 63 }));

        // Exactly at the limit is fine.
        assert!(compute_file_hash(&path, 64).await.is_ok());
    }
}
