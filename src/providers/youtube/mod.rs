//! Platform video provider (YouTube).
//!
//! Applicable when the filename carries an extractable video id and an API
//! key is configured. Raw `videos.list` responses are cached in SQLite per
//! video id; thumbnails are cached on disk. An id with no corresponding
//! live video is a normal miss, letting the chain continue.

pub mod client;
pub mod dto;

pub use client::{VideoApi, YoutubeClient};

use async_trait::async_trait;
use regex::Regex;

use crate::cache::CacheTable;
use crate::config::YoutubeConfig;
use crate::cover::{self, CoverCache, CoverImage};
use crate::model::MediaItem;

use super::{Provider, ProviderError, ProviderId, compile_patterns, extract_id};

/// Cache table: raw video responses keyed by video id.
pub const VIDEO_CACHE: (&str, &[&str]) = ("youtube_videos", &["video_id"]);

pub struct YoutubeProvider<C: VideoApi> {
    client: C,
    patterns: Vec<Regex>,
    album_format: String,
    configured: bool,
    cache: CacheTable,
    covers: CoverCache,
}

impl<C: VideoApi> YoutubeProvider<C> {
    pub fn new(config: &YoutubeConfig, client: C, cache: CacheTable, covers: CoverCache) -> Self {
        Self {
            client,
            patterns: compile_patterns(&config.filename_regex),
            album_format: config.album_format.clone(),
            configured: config.api_key.is_some(),
            cache,
            covers,
        }
    }

    pub fn video_id(&self, item: &MediaItem) -> Option<String> {
        extract_id(&self.patterns, item.file_name())
    }

    /// Cached-or-live lookup of the raw response. A corrupt cache row is
    /// logged and refetched rather than failing the item.
    async fn get_video(&self, video_id: &str) -> Result<dto::VideosResponse, ProviderError> {
        match self.cache.get_decoded::<dto::VideosResponse>(&[video_id]).await? {
            Some(Ok(cached)) => return Ok(cached),
            Some(Err(e)) => tracing::warn!("{}, refetching", e),
            None => {}
        }

        let response = self.client.get_video(video_id).await?;
        // Not-found responses are cached too: the id will not spring into
        // existence between runs
        self.cache.put_encoded(&[video_id], &response).await?;
        Ok(response)
    }

    /// The video description, for the resolver's comment augmentation.
    /// Reads through the same cache; misses and errors yield None.
    pub async fn fetch_comment(&self, item: &MediaItem) -> Option<String> {
        let video_id = self.video_id(item)?;
        let response = self.get_video(&video_id).await.ok()?;
        let video = response.items.first()?;
        Some(video.snippet.description.clone())
    }

    async fn resolve_cover(
        &self,
        video_id: &str,
        snippet: &dto::Snippet,
    ) -> Result<CoverImage, ProviderError> {
        if let Some(cached) = self.covers.get(video_id) {
            return Ok(cached);
        }
        let Some(thumb) = snippet.thumbnails.best() else {
            return Ok(cover::placeholder(cover::PLACEHOLDER_GREY));
        };
        let data = self.client.fetch_image(&thumb.url).await?;
        let image = CoverImage::from_bytes(data);
        self.covers.put(video_id, &image);
        Ok(image)
    }
}

#[async_trait]
impl<C: VideoApi> crate::resolver::CommentSource for YoutubeProvider<C> {
    async fn comment_for(&self, item: &MediaItem) -> Option<String> {
        self.fetch_comment(item).await
    }
}

#[async_trait]
impl<C: VideoApi> Provider for YoutubeProvider<C> {
    fn id(&self) -> ProviderId {
        ProviderId::Youtube
    }

    fn is_applicable(&self, item: &MediaItem) -> bool {
        self.configured && self.video_id(item).is_some()
    }

    async fn fetch(&self, item: &MediaItem) -> Result<Option<MediaItem>, ProviderError> {
        let Some(video_id) = self.video_id(item) else {
            return Ok(None);
        };

        let response = self.get_video(&video_id).await?;
        let Some(video) = response.items.first() else {
            tracing::debug!("No live video for id {}", video_id);
            return Ok(None);
        };
        let snippet = &video.snippet;

        let mut resolved = MediaItem::new(&item.source);
        resolved.metadata.set("title", snippet.title.clone());
        resolved.metadata.set("artist", snippet.channel_title.clone());
        resolved.metadata.set(
            "album",
            self.album_format.replace("{channel}", &snippet.channel_title),
        );
        match chrono::DateTime::parse_from_rfc3339(&snippet.published_at) {
            Ok(published) => {
                resolved
                    .metadata
                    .set("year", published.format("%Y").to_string());
                resolved
                    .metadata
                    .set("date", published.format("%Y-%m-%d").to_string());
            }
            Err(e) => tracing::warn!(
                "Unparseable publishedAt {:?} for {}: {}",
                snippet.published_at,
                video_id,
                e
            ),
        }
        if !snippet.description.is_empty() {
            resolved
                .metadata
                .set("comment", snippet.description.clone());
        }

        resolved.cover = Some(self.resolve_cover(&video_id, snippet).await?);
        resolved.set_provenance("song-scout/youtube");
        Ok(Some(resolved))
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockVideoApi;
    use super::*;
    use crate::cache::CacheStore;
    use crate::config::YoutubeConfig;

    async fn provider(
        client: MockVideoApi,
        cache_enabled: bool,
    ) -> (YoutubeProvider<MockVideoApi>, tempfile::TempDir) {
        let store = CacheStore::in_memory(cache_enabled).await.unwrap();
        let cache = store.table(VIDEO_CACHE.0, VIDEO_CACHE.1).await.unwrap();
        let covers_dir = tempfile::tempdir().unwrap();
        let config = YoutubeConfig {
            api_key: Some("key".to_string()),
            ..YoutubeConfig::default()
        };
        let provider =
            YoutubeProvider::new(&config, client, cache, CoverCache::new(covers_dir.path()));
        (provider, covers_dir)
    }

    #[test]
    fn applicability_requires_id_pattern_and_key() {
        let config = YoutubeConfig {
            api_key: Some("key".to_string()),
            ..YoutubeConfig::default()
        };
        let keyless = YoutubeConfig::default();

        // Applicability is local-only; a client is still needed structurally
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = CacheStore::in_memory(true).await.unwrap();
            let cache = store.table(VIDEO_CACHE.0, VIDEO_CACHE.1).await.unwrap();
            let covers = tempfile::tempdir().unwrap();

            let with_key = YoutubeProvider::new(
                &config,
                MockVideoApi::not_found(),
                cache.clone(),
                CoverCache::new(covers.path()),
            );
            assert!(with_key.is_applicable(&MediaItem::new("/m/My Song-dQw4w9WgXcQ.webm")));
            assert!(!with_key.is_applicable(&MediaItem::new("/m/My Song.mp3")));

            let without_key = YoutubeProvider::new(
                &keyless,
                MockVideoApi::not_found(),
                cache,
                CoverCache::new(covers.path()),
            );
            assert!(!without_key.is_applicable(&MediaItem::new("/m/My Song-dQw4w9WgXcQ.webm")));
        });
    }

    #[tokio::test]
    async fn maps_snippet_fields() {
        let (provider, _covers) =
            provider(MockVideoApi::with_video("dQw4w9WgXcQ", "Never", "Rick"), true).await;
        let item = MediaItem::new("/m/Never-dQw4w9WgXcQ.webm");

        let resolved = provider.fetch(&item).await.unwrap().unwrap();
        assert_eq!(resolved.metadata.get_text("title").as_deref(), Some("Never"));
        assert_eq!(resolved.metadata.get_text("artist").as_deref(), Some("Rick"));
        assert_eq!(
            resolved.metadata.get_text("album").as_deref(),
            Some("Rick (YouTube)")
        );
        assert_eq!(resolved.metadata.get_text("year").as_deref(), Some("2021"));
        assert_eq!(resolved.metadata.get_text("date").as_deref(), Some("2021-06-01"));
        assert_eq!(resolved.provenance(), Some("song-scout/youtube"));
        assert!(resolved.cover.is_some());
    }

    #[tokio::test]
    async fn not_found_is_a_miss_not_an_error() {
        let (provider, _covers) = provider(MockVideoApi::not_found(), true).await;
        let item = MediaItem::new("/m/Gone-aaaaaaaaaaa.webm");
        assert!(provider.fetch(&item).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_fetch_hits_cache() {
        let (provider, _covers) =
            provider(MockVideoApi::with_video("dQw4w9WgXcQ", "Never", "Rick"), true).await;
        let item = MediaItem::new("/m/Never-dQw4w9WgXcQ.webm");

        provider.fetch(&item).await.unwrap();
        provider.fetch(&item).await.unwrap();
        assert_eq!(*provider.client.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn disabled_cache_forces_live_fetch_each_time() {
        let (provider, _covers) =
            provider(MockVideoApi::with_video("dQw4w9WgXcQ", "Never", "Rick"), false).await;
        let item = MediaItem::new("/m/Never-dQw4w9WgXcQ.webm");

        provider.fetch(&item).await.unwrap();
        provider.fetch(&item).await.unwrap();
        assert_eq!(*provider.client.calls.lock().unwrap(), 2);
    }
}
