//! Atomic file writes.
//!
//! Content is written to a uniquely named temporary file in the target's
//! directory and renamed into place. A failed write never leaves the target
//! half-written or a temporary file behind.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("no parent directory"))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parent.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4())))
}

/// Write `content` to `path` atomically, optionally fsyncing before rename.
pub(crate) async fn atomic_write(path: &Path, content: &[u8], sync: bool) -> io::Result<()> {
    let tmp_path = temp_path_for(path)?;

    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        if sync {
            file.sync_all().await?;
        }
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&path, b"first", true).await.unwrap();
        atomic_write(&path, b"second", false).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-subdir").join("x.bin");

        assert!(atomic_write(&path, b"data", false).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
