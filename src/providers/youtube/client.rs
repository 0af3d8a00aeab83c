//! YouTube Data API HTTP client.
//!
//! The trait exists so provider logic can be tested against a mock; the
//! real client only handles transport and leaves interpretation (including
//! the empty-items not-found case) to the provider.

use async_trait::async_trait;

use super::dto;
use crate::providers::ProviderError;

/// Video metadata lookup, abstracted for testing.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Fetch the raw `videos.list` response for one id.
    async fn get_video(&self, video_id: &str) -> Result<dto::VideosResponse, ProviderError>;

    /// Download a thumbnail image.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Real Data API v3 client.
pub struct YoutubeClient {
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_key: api_key.into(),
            http_client,
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl VideoApi for YoutubeClient {
    async fn get_video(&self, video_id: &str) -> Result<dto::VideosResponse, ProviderError> {
        let url = format!(
            "{}/videos?part=snippet&id={}&key={}",
            self.base_url,
            urlencoding::encode(video_id),
            urlencoding::encode(&self.api_key)
        );

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        // 400/403 mean the key is bad or over quota - that will not get
        // better this run, so surface it as a config problem
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::config(format!(
                "YouTube API rejected the key: HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "YouTube API returned HTTP {}",
                status
            )));
        }

        response
            .json::<dto::VideosResponse>()
            .await
            .map_err(|e| ProviderError::transient(format!("parse videos response: {}", e)))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::transient(format!(
                "thumbnail fetch returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
