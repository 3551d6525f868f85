//! Crash-safe file I/O: atomic writes, durable renames, appends, and bounded
//! reads.
//!
//! Writes land in a sibling temp file which is fsynced and renamed over the
//! target, so a crash can only ever expose the old or the new content. On
//! platforms where the rename itself needs it, the parent directory is
//! fsynced afterwards. Blocking syscalls run on tokio's blocking pool so a
//! slow disk cannot stall the reactor.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use syncpoint_types::{ErrorCode, OpError};

/// Read a file's full bytes, enforcing the size limit before reading.
pub async fn read_file_bytes(path: &Path, max_size_bytes: u64) -> Result<Vec<u8>, OpError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            OpError::new(ErrorCode::FileNotFound, format!("file not found: {}", path.display()))
        } else {
            OpError::new(ErrorCode::ServerError, format!("failed to stat {}: {}", path.display(), e))
        }
    })?;

    if metadata.len() > max_size_bytes {
        return Err(OpError::new(
            ErrorCode::FileTooLarge,
            format!(
                "file size {} exceeds maximum {} bytes: {}",
                metadata.len(),
                max_size_bytes,
                path.display()
            ),
        ));
    }

    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            OpError::new(ErrorCode::FileNotFound, format!("file not found: {}", path.display()))
        } else {
            OpError::new(ErrorCode::ServerError, format!("failed to read {}: {}", path.display(), e))
        }
    })
}

/// Decode bytes using the requested text encoding.
///
/// The engine is a text engine over utf-8; `ascii` is accepted as the utf-8
/// subset. Anything else is an encoding error before any filesystem mutation.
pub fn decode(bytes: Vec<u8>, encoding: &str) -> Result<String, OpError> {
    check_encoding(encoding)?;
    String::from_utf8(bytes).map_err(|e| {
        OpError::new(
            ErrorCode::EncodingError,
            format!("failed to decode content as {}: {}", encoding, e),
        )
    })
}

/// Encode text for writing. See [`decode`] for the supported set.
pub fn encode(content: &str, encoding: &str) -> Result<Vec<u8>, OpError> {
    check_encoding(encoding)?;
    if encoding.eq_ignore_ascii_case("ascii") && !content.is_ascii() {
        return Err(OpError::new(
            ErrorCode::EncodingError,
            "content contains non-ascii characters",
        ));
    }
    Ok(content.as_bytes().to_vec())
}

fn check_encoding(encoding: &str) -> Result<(), OpError> {
    let normalized = encoding.to_ascii_lowercase();
    match normalized.as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(()),
        other => Err(OpError::new(
            ErrorCode::EncodingError,
            format!("unsupported encoding: {}", other),
        )),
    }
}

/// Write content atomically: temp file in the target directory, fsync,
/// rename over the target, fsync the parent directory.
pub async fn atomic_write(path: &Path, content: Vec<u8>) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write_blocking(&path, &content))
        .await
        .map_err(|e| io::Error::other(format!("write task panicked: {}", e)))?
}

fn atomic_write_blocking(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(&dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    replace_with_retry(&tmp_path, path)?;
    // Keep the TempPath from deleting the now-renamed file.
    std::mem::forget(tmp_path);

    fsync_parent_dir(path);
    Ok(())
}

/// Rename over the target. On Windows transient sharing violations from
/// antivirus or indexing are retried with exponential backoff.
fn replace_with_retry(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        let mut delay = std::time::Duration::from_millis(50);
        let mut last_err = None;
        for _ in 0..3 {
            match std::fs::rename(src, dst) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    last_err = Some(e);
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(std::time::Duration::from_millis(200));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::other("rename retries exhausted")))
    }
    #[cfg(not(windows))]
    {
        std::fs::rename(src, dst)
    }
}

/// Fsync the directory entry after a rename where the platform needs it.
/// Filesystems that refuse a directory fsync are tolerated.
fn fsync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Rename with a cross-filesystem fallback.
///
/// Same filesystem: atomic rename (with the Windows retry). Different
/// filesystems: copy + fsync + delete the source; atomicity is lost and the
/// caller reports `cross_filesystem = true`.
pub async fn safe_rename(src: &Path, dst: &Path) -> io::Result<bool> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || safe_rename_blocking(&src, &dst))
        .await
        .map_err(|e| io::Error::other(format!("rename task panicked: {}", e)))?
}

fn safe_rename_blocking(src: &Path, dst: &Path) -> io::Result<bool> {
    if same_filesystem(src, dst)? {
        replace_with_retry(src, dst)?;
        fsync_parent_dir(dst);
        return Ok(false);
    }

    std::fs::copy(src, dst)?;
    let file = OpenOptions::new().write(true).open(dst)?;
    file.sync_all()?;
    fsync_parent_dir(dst);
    std::fs::remove_file(src)?;
    Ok(true)
}

#[cfg(unix)]
fn same_filesystem(src: &Path, dst: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let src_dev = std::fs::metadata(src)?.dev();
    let dst_dir = dst.parent().filter(|p| !p.as_os_str().is_empty());
    let dst_dev = match dst_dir {
        Some(dir) => std::fs::metadata(dir)?.dev(),
        None => std::fs::metadata(".")?.dev(),
    };
    Ok(src_dev == dst_dev)
}

#[cfg(not(unix))]
fn same_filesystem(_src: &Path, _dst: &Path) -> io::Result<bool> {
    // No portable device id; try the rename and let the error surface.
    Ok(true)
}

/// Append bytes at the end of a file and fsync. The caller re-hashes the
/// whole file afterwards; appends are not a hot path.
pub async fn append_bytes(path: &Path, content: Vec<u8>) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(&content)?;
        file.sync_all()
    })
    .await
    .map_err(|e| io::Error::other(format!("append task panicked: {}", e)))?
}

/// Create an empty file without truncating an existing one.
pub async fn create_empty(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map(|_| ())
    })
    .await
    .map_err(|e| io::Error::other(format!("create task panicked: {}", e)))?
}
