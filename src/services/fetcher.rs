//! Streams a remote package to local storage.

use std::path::Path;
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("download request failed: {0}")]
    Request(String),

    #[error("download timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to download file, status code: {0}")]
    Status(u16),

    #[error("remote file is empty (Content-Length: 0)")]
    EmptyRemote,

    #[error("downloaded file is empty")]
    EmptyFile,

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Downloads packages with a fixed per-transfer ceiling.
#[derive(Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ArtifactFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Download `url` to `dest` and return the number of bytes written.
    ///
    /// The file is synced to disk before success is reported. On any failure
    /// the partially written file is removed.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let result = self.transfer(url, dest).await;
        if let Err(e) = &result
            && fs::try_exists(dest).await.unwrap_or(false)
        {
            warn!(url, path = %dest.display(), error = %e, "Removing partial download");
            if let Err(remove_err) = fs::remove_file(dest).await {
                warn!(path = %dest.display(), error = %remove_err, "Failed to remove partial download");
            }
        }
        result
    }

    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let io_err = |source: std::io::Error| FetchError::Io {
            path: dest.display().to_string(),
            source,
        };

        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Status(status));
        }
        if response.content_length() == Some(0) {
            return Err(FetchError::EmptyRemote);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = File::create(dest).await.map_err(io_err)?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?
        {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        if written == 0 {
            return Err(FetchError::EmptyFile);
        }

        info!(url, path = %dest.display(), bytes = written, "Package downloaded");
        Ok(written)
    }
}
