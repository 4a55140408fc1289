//! Finds the package file for a test item in a mirror directory listing.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

/// Timeout for reading a directory listing.
const LISTING_TIMEOUT: Duration = Duration::from_secs(60);

/// Accepted package suffixes.
const PACKAGE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz"];

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*"([^"]+)""#).expect("href pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("failed to get directory listing {url}: {message}")]
    Listing { url: String, message: String },

    #[error("package file not found for test item: {name}")]
    NotFound { name: String },

    #[error("package file {filename} is not a .tar.gz or .tgz archive")]
    InvalidFormat { filename: String },
}

/// Pick the package for `name` out of an HTML directory listing.
///
/// Candidates are link targets whose file name contains `name`
/// (case-insensitive). A candidate mentioning "release" wins, otherwise the
/// first one in listing order.
pub fn select_package(listing_html: &str, name: &str) -> Result<String, LocateError> {
    let needle = name.to_lowercase();

    let candidates: Vec<&str> = HREF_RE
        .captures_iter(listing_html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|href| !href.ends_with('/'))
        .filter_map(|href| href.rsplit('/').next())
        .filter(|file| !file.is_empty() && file.to_lowercase().contains(&needle))
        .collect();

    debug!(name, candidates = candidates.len(), "Scanned directory listing");

    let selected = candidates
        .iter()
        .find(|file| file.to_lowercase().contains("release"))
        .or_else(|| candidates.first())
        .ok_or_else(|| LocateError::NotFound {
            name: name.to_string(),
        })?;

    let lower = selected.to_lowercase();
    if !PACKAGE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Err(LocateError::InvalidFormat {
            filename: selected.to_string(),
        });
    }

    Ok(selected.to_string())
}

/// Reads directory listings from the package mirror.
#[derive(Clone)]
pub struct ArtifactLocator {
    client: reqwest::Client,
}

impl ArtifactLocator {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch the listing at `dir_url` and select the package for `name`.
    pub async fn locate(&self, dir_url: &str, name: &str) -> Result<String, LocateError> {
        let listing_err = |message: String| LocateError::Listing {
            url: dir_url.to_string(),
            message,
        };

        let response = self
            .client
            .get(dir_url)
            .timeout(LISTING_TIMEOUT)
            .send()
            .await
            .map_err(|e| listing_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(listing_err(format!("status code {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| listing_err(e.to_string()))?;

        let filename = select_package(&body, name)?;
        info!(dir_url, filename = %filename, "Located package");
        Ok(filename)
    }
}
