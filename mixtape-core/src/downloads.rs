use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to reach the retrieval service: {0}")]
    Unreachable(String),
    #[error("Retrieval service refused the request with status {0}")]
    Refused(u16),
}

/// A request for the retrieval service to fetch the audio of a queued song
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
}

/// Hands queued songs to an external retrieval service.
/// Dispatch is at most once; nobody waits for the result.
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    async fn retrieve(&self, request: DownloadRequest) -> Result<(), DownloadError>;
}

/// Posts retrieval requests to an HTTP endpoint
pub struct HttpDownloader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDownloader {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn retrieve(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| DownloadError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::Refused(response.status().as_u16()));
        }

        Ok(())
    }
}

/// Discards requests. Used where no retrieval service is configured.
pub struct NullDownloader;

#[async_trait]
impl Downloader for NullDownloader {
    async fn retrieve(&self, _request: DownloadRequest) -> Result<(), DownloadError> {
        Ok(())
    }
}
