//! HTTP access to station status documents and artwork.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Result, ShuttleError};
use crate::metadata::{parse_status, TrackMetadata};

/// Where the controller gets metadata and artwork bytes from.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_status(&self, status_url: &Url) -> Result<TrackMetadata>;

    async fn fetch_artwork(&self, artwork_url: &Url) -> Result<Vec<u8>>;
}

/// `reqwest`-backed source used by the app.
#[derive(Debug, Clone)]
pub struct StatusClient {
    inner: reqwest::Client,
}

impl StatusClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { inner })
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.inner.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShuttleError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        debug!("GET {} -> {} bytes", url, body.len());
        Ok(body.to_vec())
    }
}

#[async_trait]
impl MetadataSource for StatusClient {
    async fn fetch_status(&self, status_url: &Url) -> Result<TrackMetadata> {
        let body = self.get_bytes(status_url).await?;
        parse_status(&body)
    }

    async fn fetch_artwork(&self, artwork_url: &Url) -> Result<Vec<u8>> {
        self.get_bytes(artwork_url).await
    }
}
