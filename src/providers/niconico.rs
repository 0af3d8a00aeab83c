//! Secondary video provider (NicoNico).
//!
//! Same family as the YouTube provider but fetches through an external
//! downloader command (yt-dlp) emitting JSON, since there is no public
//! metadata API. Responses are cached per video id; the uploader icon
//! serves as cover (the video thumbnail as fallback), disk-cached by
//! uploader id so every video from one channel shares the image.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::process::Command;

use crate::cache::CacheTable;
use crate::config::NiconicoConfig;
use crate::cover::{self, CoverCache, CoverImage};
use crate::model::MediaItem;

use super::{Provider, ProviderError, ProviderId, compile_patterns, extract_id};

/// Cache table: raw downloader output keyed by video id.
pub const VIDEO_CACHE: (&str, &[&str]) = ("niconico_videos", &["video_id"]);

/// Downloader JSON output, reduced to the fields we read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicoVideo {
    pub title: String,
    /// Uploader nickname; stands in for the artist
    pub uploader: Option<String>,
    /// Uploader numeric id; keys the cover disk cache
    pub uploader_id: Option<String>,
    /// Uploader icon URL, preferred over the video thumbnail for cover art
    pub uploader_icon: Option<String>,
    /// `YYYYMMDD`
    pub upload_date: Option<String>,
    #[serde(default)]
    pub description: String,
    pub thumbnail: Option<String>,
}

pub struct NiconicoProvider {
    patterns: Vec<Regex>,
    fetch_command: Vec<String>,
    album_format: String,
    cache: CacheTable,
    covers: CoverCache,
    http_client: reqwest::Client,
}

impl NiconicoProvider {
    pub fn new(config: &NiconicoConfig, cache: CacheTable, covers: CoverCache) -> Self {
        Self {
            patterns: compile_patterns(&config.filename_regex),
            fetch_command: config.fetch_command.clone(),
            album_format: config.album_format.clone(),
            cache,
            covers,
            http_client: reqwest::Client::builder()
                .user_agent(concat!(
                    env!("CARGO_PKG_NAME"),
                    "/",
                    env!("CARGO_PKG_VERSION")
                ))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn video_id(&self, item: &MediaItem) -> Option<String> {
        extract_id(&self.patterns, item.file_name())
    }

    /// Run the external fetch command for a video id. A nonzero exit is a
    /// normal miss (deleted or private video); a missing binary is fatal
    /// for the run.
    fn run_fetch(&self, video_id: &str) -> Result<Option<NicoVideo>, ProviderError> {
        let argv: Vec<String> = self
            .fetch_command
            .iter()
            .map(|a| a.replace("{}", video_id))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            return Err(ProviderError::config("empty niconico fetch command"));
        };

        let output = match Command::new(program).args(args).output() {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::config(format!("{} not found", program)));
            }
            Err(e) => return Err(ProviderError::transient(format!("fetch command: {}", e))),
        };

        if !output.status.success() {
            tracing::debug!("Fetch command failed for {}, treating as miss", video_id);
            return Ok(None);
        }

        serde_json::from_slice(&output.stdout)
            .map(Some)
            .map_err(|e| ProviderError::transient(format!("parse downloader output: {}", e)))
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<NicoVideo>, ProviderError> {
        match self.cache.get_decoded::<NicoVideo>(&[video_id]).await? {
            Some(Ok(cached)) => return Ok(Some(cached)),
            Some(Err(e)) => tracing::warn!("{}, refetching", e),
            None => {}
        }

        let Some(video) = self.run_fetch(video_id)? else {
            return Ok(None);
        };
        self.cache.put_encoded(&[video_id], &video).await?;
        Ok(Some(video))
    }

    async fn resolve_cover(
        &self,
        video_id: &str,
        video: &NicoVideo,
    ) -> Result<CoverImage, ProviderError> {
        // Uploader-keyed so one channel's videos share a cached image;
        // videos with no uploader id fall back to a per-video key.
        let cache_key = match &video.uploader_id {
            Some(id) => format!("nnd{}", id),
            None => video_id.to_string(),
        };
        if let Some(cached) = self.covers.get(&cache_key) {
            return Ok(cached);
        }
        let Some(url) = video.uploader_icon.as_ref().or(video.thumbnail.as_ref()) else {
            return Ok(cover::placeholder(cover::PLACEHOLDER_GREY));
        };
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(cover::placeholder(cover::PLACEHOLDER_GREY));
        }
        let image = CoverImage::from_bytes(response.bytes().await?.to_vec());
        self.covers.put(&cache_key, &image);
        Ok(image)
    }
}

#[async_trait]
impl Provider for NiconicoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Niconico
    }

    fn is_applicable(&self, item: &MediaItem) -> bool {
        !self.fetch_command.is_empty() && self.video_id(item).is_some()
    }

    async fn fetch(&self, item: &MediaItem) -> Result<Option<MediaItem>, ProviderError> {
        let Some(video_id) = self.video_id(item) else {
            return Ok(None);
        };
        let Some(video) = self.get_video(&video_id).await? else {
            return Ok(None);
        };

        let channel = video.uploader.clone().unwrap_or_default();
        let mut resolved = MediaItem::new(&item.source);
        resolved.metadata.set("title", video.title.clone());
        resolved.metadata.set("artist", channel.clone());
        resolved
            .metadata
            .set("album", self.album_format.replace("{channel}", &channel));
        if let Some(date) = &video.upload_date {
            match chrono::NaiveDate::parse_from_str(date, "%Y%m%d") {
                Ok(parsed) => {
                    resolved.metadata.set("year", parsed.format("%Y").to_string());
                    resolved
                        .metadata
                        .set("date", parsed.format("%Y-%m-%d").to_string());
                }
                Err(e) => tracing::warn!("Unparseable upload_date {:?}: {}", date, e),
            }
        }
        if !video.description.is_empty() {
            resolved.metadata.set("comment", video.description.clone());
        }

        resolved.cover = Some(self.resolve_cover(&video_id, &video).await?);
        resolved.set_provenance("song-scout/niconico");
        Ok(Some(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;

    async fn provider_with_cache() -> (NiconicoProvider, tempfile::TempDir) {
        let store = CacheStore::in_memory(true).await.unwrap();
        let cache = store.table(VIDEO_CACHE.0, VIDEO_CACHE.1).await.unwrap();
        let covers = tempfile::tempdir().unwrap();
        let config = NiconicoConfig {
            // Never reached in these tests; cache is primed first
            fetch_command: vec!["false".to_string()],
            ..NiconicoConfig::default()
        };
        let provider = NiconicoProvider::new(&config, cache, CoverCache::new(covers.path()));
        (provider, covers)
    }

    #[tokio::test]
    async fn applicability_follows_id_pattern() {
        let (provider, _covers) = provider_with_cache().await;
        assert!(provider.is_applicable(&MediaItem::new("/m/Tune sm12345678.mkv")));
        assert!(provider.is_applicable(&MediaItem::new("/m/Tune [sm345].webm")));
        assert!(!provider.is_applicable(&MediaItem::new("/m/Tune-dQw4w9WgXcQ.webm")));
    }

    #[tokio::test]
    async fn maps_cached_video_fields() {
        let (provider, _covers) = provider_with_cache().await;
        let video = NicoVideo {
            title: "ローリンガール".to_string(),
            uploader: Some("wowaka".to_string()),
            uploader_id: None,
            uploader_icon: None,
            upload_date: Some("20100214".to_string()),
            description: "初音ミク".to_string(),
            thumbnail: None,
        };
        provider
            .cache
            .put_encoded(&["sm9714351"], &video)
            .await
            .unwrap();

        let item = MediaItem::new("/m/Rolling Girl sm9714351.mkv");
        let resolved = provider.fetch(&item).await.unwrap().unwrap();
        assert_eq!(
            resolved.metadata.get_text("title").as_deref(),
            Some("ローリンガール")
        );
        assert_eq!(resolved.metadata.get_text("artist").as_deref(), Some("wowaka"));
        assert_eq!(
            resolved.metadata.get_text("album").as_deref(),
            Some("wowaka (NicoNico)")
        );
        assert_eq!(resolved.metadata.get_text("year").as_deref(), Some("2010"));
        assert_eq!(resolved.metadata.get_text("date").as_deref(), Some("2010-02-14"));
        assert_eq!(resolved.provenance(), Some("song-scout/niconico"));
        assert!(resolved.cover.is_some());
    }

    #[tokio::test]
    async fn cover_disk_cache_is_keyed_by_uploader_id() {
        let (provider, _covers) = provider_with_cache().await;
        let video = NicoVideo {
            title: "曲".to_string(),
            uploader: Some("someone".to_string()),
            uploader_id: Some("12345".to_string()),
            // Unreachable address: a cache miss would fail the fetch
            uploader_icon: Some("http://127.0.0.1:1/icon.png".to_string()),
            upload_date: None,
            description: String::new(),
            thumbnail: None,
        };
        let icon = CoverImage::from_bytes(vec![1, 2, 3]);
        provider.covers.put("nnd12345", &icon);

        let cover = provider.resolve_cover("sm100", &video).await.unwrap();
        assert_eq!(cover.data, vec![1, 2, 3]);
        // A second video from the same channel shares the entry
        let cover = provider.resolve_cover("sm200", &video).await.unwrap();
        assert_eq!(cover.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_fetch_command_is_a_miss() {
        let (provider, _covers) = provider_with_cache().await;
        let item = MediaItem::new("/m/Gone sm1.mkv");
        assert!(provider.fetch(&item).await.unwrap().is_none());
    }
}
