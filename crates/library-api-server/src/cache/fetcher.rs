use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::CacheConfig;

pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote answered {0}")]
    Status(StatusCode),

    #[error("{0}")]
    Other(String),
}

/// Network side of the cover cache.
#[async_trait]
pub trait CoverFetcher: Send + Sync {
    /// Start fetching `url`. Non-success statuses are errors; the body is
    /// yielded chunk by chunk.
    async fn fetch(&self, url: &str) -> Result<ByteStream, FetchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &CacheConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CoverFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ByteStream, FetchError> {
        debug!("Fetching cover from {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed())
    }
}
