//! Plain HTTP retrieval of external bodies.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::{ContentError, ContentResult};

/// Status and body of a completed GET.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP collaborator used by single-item synchronization.
///
/// Implementations perform exactly one request per call and never retry.
/// A transport failure is a [`ContentError::Retrieval`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> ContentResult<FetchResponse>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> ContentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ContentError::configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> ContentResult<FetchResponse> {
        let response = self.client.get(url).send().await.map_err(|e| {
            ContentError::retrieval(format!(
                "could not retrieve external content from '{}': {}",
                url, e
            ))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ContentError::retrieval(format!(
                "could not read external content body from '{}': {}",
                url, e
            ))
        })?;

        Ok(FetchResponse { status, body })
    }
}
