//! HTTP download of the standalone jar into the local cache
//!
//! The body is streamed into a uniquely named `<jar>.<random>.part` sibling
//! and persisted onto the final path only once every byte has been written,
//! so an interrupted download never looks like a cache hit on the next run.
//! Concurrent downloads of the same jar each get their own temp file.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use colored::*;
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::artifact::ArtifactLocation;
use crate::error::FetchError;

/// Default timeout for the whole download
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// What `ensure_artifact` had to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// File was already on disk; no request was made
    CacheHit,
    /// File was downloaded
    Downloaded { bytes: u64, sha256: String },
}

impl FetchOutcome {
    pub fn was_downloaded(&self) -> bool {
        matches!(self, FetchOutcome::Downloaded { .. })
    }
}

/// Anything that can make an artifact available at its local path
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn ensure_artifact(&self, location: &ArtifactLocation) -> Result<FetchOutcome, FetchError>;
}

/// Fetches artifacts over HTTP(S). No retries.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Client,
}

impl ArtifactFetcher {
    /// Client whose requests, body included, give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientInit)?;
        Ok(Self { client })
    }

    async fn download(&self, location: &ArtifactLocation) -> Result<FetchOutcome, FetchError> {
        let url = location.remote_url.clone();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::BadStatus {
                status: status.as_u16(),
                url,
            });
        }

        let write_failed = |source: std::io::Error| FetchError::WriteFailed {
            path: location.local_path.clone(),
            source,
        };

        let dir = location.local_path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await.map_err(write_failed)?;

        let jar_name = location
            .local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Removed on drop, so every early return below discards the partial body
        let (file, part) = tempfile::Builder::new()
            .prefix(&format!("{}.", jar_name))
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(write_failed)?
            .into_parts();
        debug!("Streaming {} into {}", url, part.display());

        let (bytes, sha256) = stream_to_file(response, tokio::fs::File::from_std(file), &part, &url).await?;

        part.persist(&location.local_path)
            .map_err(|e| write_failed(e.error))?;

        Ok(FetchOutcome::Downloaded { bytes, sha256 })
    }
}

#[async_trait]
impl ArtifactSource for ArtifactFetcher {
    async fn ensure_artifact(&self, location: &ArtifactLocation) -> Result<FetchOutcome, FetchError> {
        if location.exists() {
            debug!("Artifact cache hit: {}", location.local_path.display());
            return Ok(FetchOutcome::CacheHit);
        }

        println!(
            "{}\n  {}",
            "Downloading WireMock standalone from Maven Central...".cyan(),
            location.remote_url
        );
        info!(
            "Downloading {} -> {}",
            location.remote_url,
            location.local_path.display()
        );

        match self.download(location).await {
            Ok(outcome) => {
                if let FetchOutcome::Downloaded { bytes, sha256 } = &outcome {
                    info!(
                        "Downloaded {} bytes to {} (sha256 {})",
                        bytes,
                        location.local_path.display(),
                        sha256
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!("Artifact download failed: {}", e);
                Err(e)
            }
        }
    }
}

async fn stream_to_file(
    response: reqwest::Response,
    mut file: tokio::fs::File,
    path: &TempPath,
    url: &str,
) -> Result<(u64, String), FetchError> {
    let write_failed = |source: std::io::Error| FetchError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        file.write_all(&chunk).await.map_err(write_failed)?;
    }

    file.flush().await.map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)?;

    Ok((bytes, hex::encode(hasher.finalize())))
}
