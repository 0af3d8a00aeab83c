//! AcoustID HTTP client and the combined lookup seam.
//!
//! The `meta` parameter uses literal `+` as a separator; percent-encoding
//! it makes the API silently drop the requested metadata, so the URL is
//! assembled by hand.

use async_trait::async_trait;

use super::dto;
use super::fingerprint::Fingerprint;
use super::musicbrainz::MusicBrainzClient;
use crate::providers::ProviderError;

/// Everything the fingerprint provider asks of the outside world, behind
/// one seam so resolution logic can run against a scripted catalog.
#[async_trait]
pub trait LookupApi: Send + Sync {
    async fn lookup_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<dto::FingerprintMatch>, ProviderError>;

    async fn get_recording(&self, mbid: &str) -> Result<Option<dto::Recording>, ProviderError>;

    async fn get_release(&self, mbid: &str) -> Result<Option<dto::Release>, ProviderError>;

    async fn get_work(&self, mbid: &str) -> Result<Option<dto::Work>, ProviderError>;

    async fn front_cover(&self, release_id: &str) -> Result<Option<Vec<u8>>, ProviderError>;
}

pub struct AcoustIdClient {
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl AcoustIdClient {
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
            base_url: "https://api.acoustid.org/v2/lookup".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<dto::FingerprintMatch>, ProviderError> {
        // The + separators must survive unencoded
        let url = format!(
            "{}?client={}&duration={}&fingerprint={}&meta=recordings+compress",
            self.base_url,
            urlencoding::encode(&self.api_key),
            fingerprint.duration_secs,
            urlencoding::encode(&fingerprint.fingerprint)
        );

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "AcoustID returned HTTP {}",
                status
            )));
        }

        let parsed = response
            .json::<dto::LookupResponse>()
            .await
            .map_err(|e| ProviderError::transient(format!("parse lookup response: {}", e)))?;
        if parsed.status != "ok" {
            return Err(ProviderError::transient(format!(
                "AcoustID status {:?}",
                parsed.status
            )));
        }
        Ok(dto::flatten_matches(&parsed))
    }
}

/// Live implementation combining the AcoustID and MusicBrainz clients.
pub struct LiveLookup {
    acoustid: AcoustIdClient,
    musicbrainz: MusicBrainzClient,
}

impl LiveLookup {
    pub fn new(api_key: impl Into<String>, musicbrainz_agent: &str) -> Self {
        Self {
            acoustid: AcoustIdClient::new(api_key),
            musicbrainz: MusicBrainzClient::new(musicbrainz_agent),
        }
    }
}

#[async_trait]
impl LookupApi for LiveLookup {
    async fn lookup_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<dto::FingerprintMatch>, ProviderError> {
        self.acoustid.lookup(fingerprint).await
    }

    async fn get_recording(&self, mbid: &str) -> Result<Option<dto::Recording>, ProviderError> {
        self.musicbrainz.get_recording(mbid).await
    }

    async fn get_release(&self, mbid: &str) -> Result<Option<dto::Release>, ProviderError> {
        self.musicbrainz.get_release(mbid).await
    }

    async fn get_work(&self, mbid: &str) -> Result<Option<dto::Work>, ProviderError> {
        self.musicbrainz.get_work(mbid).await
    }

    async fn front_cover(&self, release_id: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        self.musicbrainz.front_cover(release_id).await
    }
}
