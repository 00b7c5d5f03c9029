use crate::bucket::SnapshotRequest;
use crate::error::{AppError, Result};
use crate::fsutil::staging_path;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/**
 * Single-attempt downloader shared by the snapshot and AS-name fetchers.
 * Understands http(s):// and file:// URLs.
 */
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    // Create a new downloader with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .timeout(timeout)
            .user_agent(concat!("ribcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    // Fetch a whole document into memory
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!("Reading local file: {}", path);
            return tokio::fs::read(path)
                .await
                .map_err(|e| AppError::Download(format!("{}: {}", url, e)));
        }

        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Download(format!("Failed to read response body: {}", e)))?;

        info!("Downloaded {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }

    // Stream a document to `dest`, replacing it only once the body is complete
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Download(format!("{}: {}", parent.display(), e)))?;
        }

        let tmp_path = staging_path(dest);
        let result = self.download_into(url, &tmp_path).await;
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp_path, dest).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AppError::Download(format!("{}: {}", dest.display(), e)));
        }
        Ok(written)
    }

    async fn download_into(&self, url: &str, tmp_path: &Path) -> Result<u64> {
        let write_err = |e: std::io::Error| AppError::Download(format!("{}: {}", tmp_path.display(), e));

        if let Some(path) = url.strip_prefix("file://") {
            debug!("Copying local file: {}", path);
            return tokio::fs::copy(path, tmp_path)
                .await
                .map_err(|e| AppError::Download(format!("{}: {}", url, e)));
        }

        let mut response = self.get(url).await?;
        let mut file = tokio::fs::File::create(tmp_path).await.map_err(write_err)?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::Download(format!("Failed to read response body: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        Ok(written)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::Download(format!("Unsupported URL scheme: {}", url)));
        }

        info!("Fetching {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Network request failed: {}", e);
            AppError::Download(format!("Request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download(format!(
                "HTTP error: {} - {} ({})",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                url
            )));
        }

        Ok(response)
    }
}

/**
 * Downloads raw RIB snapshots into the snapshot-storage directory
 */
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    downloader: Downloader,
    ribs_dir: PathBuf,
}

impl SnapshotFetcher {
    pub fn new(downloader: Downloader, ribs_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            ribs_dir: ribs_dir.into(),
        }
    }

    pub fn snapshot_path(&self, request: &SnapshotRequest) -> PathBuf {
        self.ribs_dir.join(request.filename.as_str())
    }

    // Download the snapshot verbatim and return where it was stored
    pub async fn fetch(&self, request: &SnapshotRequest) -> Result<PathBuf> {
        let path = self.snapshot_path(request);
        let bytes = self.downloader.download_to(&request.url, &path).await?;
        info!("Snapshot {} saved ({} bytes)", request.filename, bytes);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::TimeBucket;
    use time::macros::datetime;

    fn downloader() -> Downloader {
        Downloader::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_snapshot_from_file_url() {
        let upstream = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let bucket = TimeBucket::resolve(datetime!(2024-03-05 13:47:00 UTC));

        let remote_dir = upstream.path().join("2024.03").join("RIBS");
        std::fs::create_dir_all(&remote_dir).unwrap();
        std::fs::write(remote_dir.join("rib.20240305.1200.bz2"), b"MRT bytes").unwrap();

        let base = format!("file://{}", upstream.path().display());
        let request = SnapshotRequest::new(&base, &bucket);
        let fetcher = SnapshotFetcher::new(downloader(), local.path().join("ribs"));

        let path = fetcher.fetch(&request).await.unwrap();
        assert_eq!(path, local.path().join("ribs").join("rib.20240305.1200.bz2"));
        assert_eq!(std::fs::read(&path).unwrap(), b"MRT bytes");
    }

    #[tokio::test]
    async fn test_missing_source_is_download_error() {
        let local = tempfile::tempdir().unwrap();
        let bucket = TimeBucket::resolve(datetime!(2024-03-05 13:47:00 UTC));
        let request = SnapshotRequest::new("file:///nonexistent/bgpdata", &bucket);
        let fetcher = SnapshotFetcher::new(downloader(), local.path());

        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Download(_)));
        assert!(!fetcher.snapshot_path(&request).exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("rib.20240305.1200.bz2");
        std::fs::write(&source, b"MRT bytes").unwrap();

        // A non-empty directory in the way makes the final rename fail
        let dest = dir.path().join("ribs").join("rib.20240305.1200.bz2");
        std::fs::create_dir_all(dest.join("occupied")).unwrap();

        let err = downloader()
            .download_to(&format!("file://{}", source.display()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Download(_)));
        assert!(!staging_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = downloader().fetch_bytes("ftp://example.com/x").await.unwrap_err();
        assert!(matches!(err, AppError::Download(_)));
    }
}
