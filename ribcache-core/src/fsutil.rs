use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

// Sibling path the contents are staged in before the rename
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/**
 * Replace `path` with `contents` so readers never observe a truncated file.
 * The data is written next to the destination and renamed over it.
 */
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::persist(parent, e))?;
    }

    let tmp_path = staging_path(path);
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| AppError::persist(&tmp_path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| AppError::persist(&tmp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| AppError::persist(&tmp_path, e))?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(AppError::persist(path, e));
    }
    Ok(())
}
