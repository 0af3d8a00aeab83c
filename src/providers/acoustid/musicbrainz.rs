//! MusicBrainz and Cover Art Archive HTTP clients.
//!
//! MusicBrainz requires a descriptive User-Agent and allows one request
//! per second; every call here sleeps around the request to stay under
//! that, matching the etiquette guidelines rather than reacting to 503s.

use std::time::Duration;

use super::dto;
use crate::providers::ProviderError;

pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    coverart_url: String,
}

impl MusicBrainzClient {
    pub fn new(user_agent: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(user_agent)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            coverart_url: "https://coverartarchive.org".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_urls(base_url: impl Into<String>, coverart_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            coverart_url: coverart_url.into(),
        }
    }

    /// Rate-paced GET returning the parsed body, or None on 404.
    async fn paced_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        inc: &str,
    ) -> Result<Option<T>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let url = format!("{}/{}?fmt=json&inc={}", self.base_url, path, inc);
        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "MusicBrainz {} returned HTTP {}",
                path, status
            )));
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ProviderError::transient(format!("parse {} response: {}", path, e)))
    }

    pub async fn get_recording(&self, mbid: &str) -> Result<Option<dto::Recording>, ProviderError> {
        self.paced_get(
            &format!("recording/{}", mbid),
            "releases+work-rels+artist-credits",
        )
        .await
    }

    pub async fn get_release(&self, mbid: &str) -> Result<Option<dto::Release>, ProviderError> {
        self.paced_get(&format!("release/{}", mbid), "artists+release-groups")
            .await
    }

    pub async fn get_work(&self, mbid: &str) -> Result<Option<dto::Work>, ProviderError> {
        self.paced_get(&format!("work/{}", mbid), "recording-rels")
            .await
    }

    /// Front cover from the Cover Art Archive; None when the release has
    /// no artwork there.
    pub async fn front_cover(&self, release_id: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let url = format!("{}/release/{}/front", self.coverart_url, release_id);
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "Cover Art Archive returned HTTP {}",
                status
            )));
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }
}
