use async_trait::async_trait;
use log::debug;
use std::time::Duration;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Remote returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Downloads the current bytes of a stored blob.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Clone)]
pub struct HttpBlobFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpBlobFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent, max_bytes }
    }

    fn fetch_blocking(agent: &ureq::Agent, url: &str, max_bytes: u64) -> Result<Vec<u8>, FetchError> {
        let mut response = agent.get(url).call().map_err(|e| match e {
            ureq::Error::StatusCode(status) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            other => FetchError::Request {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })?;

        response
            .body_mut()
            .with_config()
            .limit(max_bytes)
            .read_to_vec()
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Default for HttpBlobFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS), 20 * 1024 * 1024)
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let agent = self.agent.clone();
        let owned_url = url.to_string();
        let max_bytes = self.max_bytes;

        let bytes = tokio::task::spawn_blocking(move || {
            Self::fetch_blocking(&agent, &owned_url, max_bytes)
        })
        .await
        .map_err(|e| FetchError::Task(e.to_string()))??;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}
