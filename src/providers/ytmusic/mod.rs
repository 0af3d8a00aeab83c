//! Music catalog provider (YouTube Music).
//!
//! The highest-priority provider: when an uploaded video is also a
//! catalog song, this resolves it to real release metadata rather than
//! channel-shaped guesses. Resolution runs in two passes:
//!
//!   1. Exact pass: follow the song's uploading channel to its catalog
//!      artist and walk the discography (albums, then singles) looking
//!      for a track with the same video id. Always on.
//!   2. Search pass: text search over the catalog, accepting candidates
//!      through the configured [`matching`] ladder. Only runs when at
//!      least one fuzzy method is enabled.
//!
//! Manual id overrides from config are applied before any lookup, both
//! for songs (re-uploads pointing at the canonical entry) and for
//! artists (topic channels pointing at the real artist page).

pub mod client;
pub mod dto;
pub mod matching;

pub use client::{CachedCatalog, CatalogApi, YtMusicClient};

use async_trait::async_trait;
use regex::Regex;

use crate::cache::CacheStore;
use crate::config::YtMusicConfig;
use crate::cover::{self, CoverCache, CoverImage};
use crate::model::MediaItem;

use dto::{Album, AlbumMode, PlayStatus, Song, Track};
use matching::MatchMethod;

use super::{Provider, ProviderError, ProviderId, compile_patterns, extract_id};

pub struct YtMusicProvider<C: CatalogApi> {
    catalog: CachedCatalog<C>,
    config: YtMusicConfig,
    patterns: Vec<Regex>,
    covers: CoverCache,
}

impl<C: CatalogApi> YtMusicProvider<C> {
    pub async fn new(
        config: &YtMusicConfig,
        client: C,
        store: &CacheStore,
        covers: CoverCache,
    ) -> sqlx::Result<Self> {
        Ok(Self {
            catalog: CachedCatalog::new(client, store).await?,
            patterns: compile_patterns(&config.filename_regex),
            config: config.clone(),
            covers,
        })
    }

    pub fn video_id(&self, item: &MediaItem) -> Option<String> {
        extract_id(&self.patterns, item.file_name())
    }

    /// Walk the artist's discography for a track whose video id matches
    /// the file's id or its override target. With `title_match` enabled,
    /// an exact title match is accepted too (catalog entries sometimes
    /// carry a different id than the public upload).
    async fn exact_pass(
        &self,
        song: &Song,
        source_id: &str,
        lookup_id: &str,
        artist_channel: &str,
    ) -> Result<Option<(Album, Track)>, ProviderError> {
        for mode in [AlbumMode::Albums, AlbumMode::Singles] {
            let refs = self.catalog.get_artist_albums(artist_channel, mode).await?;
            for album_ref in refs {
                let album = self.catalog.get_album(&album_ref.browse_id).await?;
                let found = album.tracks.iter().position(|track| {
                    track.video_id == lookup_id
                        || track.video_id == source_id
                        || (self.config.title_match
                            && track.title.eq_ignore_ascii_case(&song.title))
                });
                if let Some(index) = found {
                    let track = album.tracks[index].clone();
                    return Ok(Some((album, track)));
                }
            }
        }
        Ok(None)
    }

    /// Text search over the catalog, trying each configured match method
    /// in order over the full candidate list before moving to the next.
    /// Returns the matched album, track, and the accepted similarity
    /// score when the similarity method did the accepting.
    async fn search_pass(
        &self,
        song: &Song,
        lookup_id: &str,
        artist_name: Option<&str>,
    ) -> Result<Option<(Album, Track, Option<f64>)>, ProviderError> {
        let query = match artist_name {
            Some(name) => format!("{} - {}", song.title, name),
            None => song.title.clone(),
        };
        let candidates: Vec<_> = self
            .catalog
            .search_songs(&query)
            .await?
            .into_iter()
            .filter(|c| c.album_browse_id.is_some())
            .collect();

        for method in matching::configured_methods(&self.config) {
            let Some(candidate) = matching::select(
                method,
                &candidates,
                lookup_id,
                &song.title,
                self.config.similarity_threshold,
            ) else {
                continue;
            };

            let browse_id = candidate
                .album_browse_id
                .as_deref()
                .expect("candidates without an album were filtered out");
            let album = self.catalog.get_album(browse_id).await?;
            let Some(track) = album
                .tracks
                .iter()
                .find(|t| t.video_id == candidate.video_id)
                .cloned()
            else {
                tracing::debug!(
                    "Search hit {} not on its own album {}, skipping",
                    candidate.video_id,
                    browse_id
                );
                continue;
            };
            let score = (method == MatchMethod::Similarity)
                .then(|| matching::similarity(&candidate.title, &song.title));
            return Ok(Some((album, track, score)));
        }
        Ok(None)
    }

    async fn resolve_cover(
        &self,
        source_id: &str,
        album: &Album,
    ) -> Result<CoverImage, ProviderError> {
        if let Some(cached) = self.covers.get(source_id) {
            return Ok(cached);
        }
        let Some(url) = &album.thumbnail_url else {
            return Ok(cover::placeholder(cover::PLACEHOLDER_GREY));
        };
        let data = self.catalog.fetch_image(url).await?;
        let image = CoverImage::from_bytes(data);
        self.covers.put(source_id, &image);
        Ok(image)
    }

    async fn build_match(
        &self,
        item: &MediaItem,
        source_id: &str,
        album: &Album,
        track: &Track,
        fallback_artist: Option<&str>,
        score: Option<f64>,
    ) -> Result<MediaItem, ProviderError> {
        let mut artists: Vec<String> = track.artists.iter().map(|a| a.name.clone()).collect();
        if artists.is_empty() {
            artists = album.artists.iter().map(|a| a.name.clone()).collect();
        }
        if artists.is_empty() {
            if let Some(name) = fallback_artist {
                artists.push(name.to_string());
            }
        }

        let mut resolved = MediaItem::new(&item.source);
        resolved.metadata.set("title", track.title.clone());
        resolved.metadata.set("artist", artists);
        resolved.metadata.set("album", album.title.clone());
        if let Some(year) = &album.year {
            resolved.metadata.set("year", year.clone());
        }
        if let Some(score) = score {
            resolved.metadata.set("similarity", format!("{:.3}", score));
        }
        resolved.cover = Some(self.resolve_cover(source_id, album).await?);
        resolved.set_provenance("song-scout/ytm");
        Ok(resolved)
    }
}

#[async_trait]
impl<C: CatalogApi> Provider for YtMusicProvider<C> {
    fn id(&self) -> ProviderId {
        ProviderId::YtMusic
    }

    fn is_applicable(&self, item: &MediaItem) -> bool {
        self.video_id(item).is_some()
    }

    async fn fetch(&self, item: &MediaItem) -> Result<Option<MediaItem>, ProviderError> {
        let Some(source_id) = self.video_id(item) else {
            return Ok(None);
        };
        let lookup_id = self
            .config
            .song_overrides
            .get(&source_id)
            .cloned()
            .unwrap_or_else(|| source_id.clone());

        let song = self.catalog.get_song(&lookup_id).await?;
        match song.status {
            PlayStatus::Ok => {}
            // The entry still exists in the catalog, only playback is
            // blocked; metadata resolution can proceed
            PlayStatus::Unplayable => {
                tracing::warn!("Song {} is unplayable, resolving anyway", lookup_id);
            }
            PlayStatus::Error | PlayStatus::LoginRequired => {
                tracing::debug!("Song {} unavailable ({:?})", lookup_id, song.status);
                return Ok(None);
            }
        }

        let artist = match &song.channel_id {
            Some(channel_id) => {
                let mapped = self
                    .config
                    .artist_overrides
                    .get(channel_id)
                    .unwrap_or(channel_id);
                self.catalog.get_artist(mapped).await?
            }
            None => None,
        };

        if let Some(artist) = &artist {
            if let Some((album, track)) = self
                .exact_pass(&song, &source_id, &lookup_id, &artist.channel_id)
                .await?
            {
                let resolved = self
                    .build_match(item, &source_id, &album, &track, Some(&artist.name), None)
                    .await?;
                return Ok(Some(resolved));
            }
        }

        if matching::fuzzy_enabled(&self.config) {
            let artist_name = artist.as_ref().map(|a| a.name.as_str());
            if let Some((album, track, score)) =
                self.search_pass(&song, &lookup_id, artist_name).await?
            {
                let resolved = self
                    .build_match(item, &source_id, &album, &track, artist_name, score)
                    .await?;
                return Ok(Some(resolved));
            }
        }

        tracing::debug!("Song {} not on any release", lookup_id);
        Ok(None)
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockCatalog;
    use super::*;
    use dto::SearchResult;

    const ID: &str = "abcdefghijk";

    async fn provider(
        catalog: MockCatalog,
        config: YtMusicConfig,
    ) -> (YtMusicProvider<MockCatalog>, tempfile::TempDir) {
        let store = CacheStore::in_memory(true).await.unwrap();
        let covers_dir = tempfile::tempdir().unwrap();
        let provider =
            YtMusicProvider::new(&config, catalog, &store, CoverCache::new(covers_dir.path()))
                .await
                .unwrap();
        (provider, covers_dir)
    }

    fn item() -> MediaItem {
        MediaItem::new(format!("/m/My Song-{}.webm", ID))
    }

    #[tokio::test]
    async fn applicability_needs_an_extractable_id() {
        let (provider, _d) =
            provider(MockCatalog::default(), YtMusicConfig::default()).await;
        assert!(provider.is_applicable(&item()));
        assert!(!provider.is_applicable(&MediaItem::new("/m/No id here.mp3")));
    }

    #[tokio::test]
    async fn exact_pass_resolves_album_track() {
        let catalog = MockCatalog::single_track(ID, "My Song", "The Artist", "The Album");
        let (provider, _d) = provider(catalog, YtMusicConfig::default()).await;

        let resolved = provider.fetch(&item()).await.unwrap().unwrap();
        assert_eq!(resolved.metadata.get_text("title").as_deref(), Some("My Song"));
        assert_eq!(resolved.metadata.get_text("album").as_deref(), Some("The Album"));
        assert_eq!(resolved.metadata.get_text("year").as_deref(), Some("2019"));
        assert_eq!(resolved.provenance(), Some("song-scout/ytm"));
        assert!(resolved.cover.is_some());
        assert!(resolved.metadata.get("similarity").is_none());
    }

    #[tokio::test]
    async fn song_override_redirects_the_lookup() {
        // The file carries ID but the catalog only knows the override target
        let catalog = MockCatalog::single_track("canonical00", "My Song", "The Artist", "The Album");
        let config = YtMusicConfig {
            song_overrides: [(ID.to_string(), "canonical00".to_string())].into(),
            ..YtMusicConfig::default()
        };
        let (provider, _d) = provider(catalog, config).await;

        let resolved = provider.fetch(&item()).await.unwrap().unwrap();
        assert_eq!(resolved.metadata.get_text("album").as_deref(), Some("The Album"));
    }

    #[tokio::test]
    async fn unplayable_song_still_resolves() {
        let mut catalog = MockCatalog::single_track(ID, "My Song", "The Artist", "The Album");
        catalog.songs.get_mut(ID).unwrap().status = PlayStatus::Unplayable;
        let (provider, _d) = provider(catalog, YtMusicConfig::default()).await;
        assert!(provider.fetch(&item()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn broken_catalog_entry_is_a_miss() {
        let mut catalog = MockCatalog::single_track(ID, "My Song", "The Artist", "The Album");
        catalog.songs.get_mut(ID).unwrap().status = PlayStatus::Error;
        let (provider, _d) = provider(catalog, YtMusicConfig::default()).await;
        assert!(provider.fetch(&item()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_track_id_only_matches_with_title_match() {
        // Album carries the song under a different video id
        let mut catalog = MockCatalog::single_track("different_id", "My Song", "The Artist", "The Album");
        catalog.songs.insert(
            ID.to_string(),
            dto::Song {
                video_id: ID.to_string(),
                title: "My Song".to_string(),
                channel_id: Some("UCchannel".to_string()),
                status: PlayStatus::Ok,
            },
        );

        let (strict, _d1) = provider(
            MockCatalog { search_results: vec![], ..restage(&catalog) },
            YtMusicConfig::default(),
        )
        .await;
        assert!(strict.fetch(&item()).await.unwrap().is_none());

        let (lenient, _d2) = provider(
            restage(&catalog),
            YtMusicConfig {
                title_match: true,
                ..YtMusicConfig::default()
            },
        )
        .await;
        let resolved = lenient.fetch(&item()).await.unwrap().unwrap();
        assert_eq!(resolved.metadata.get_text("album").as_deref(), Some("The Album"));
    }

    // MockCatalog is consumed by the provider; rebuild it for a second run
    fn restage(catalog: &MockCatalog) -> MockCatalog {
        MockCatalog {
            songs: catalog.songs.clone(),
            artists: catalog.artists.clone(),
            discographies: catalog.discographies.clone(),
            albums: catalog.albums.clone(),
            search_results: catalog.search_results.clone(),
        }
    }

    #[tokio::test]
    async fn search_pass_runs_when_discography_misses() {
        let mut catalog = MockCatalog::single_track("other_track", "Other", "The Artist", "The Album");
        catalog.songs.insert(
            ID.to_string(),
            dto::Song {
                video_id: ID.to_string(),
                title: "My Song".to_string(),
                channel_id: Some("UCchannel".to_string()),
                status: PlayStatus::Ok,
            },
        );
        // The search knows a release the discography walk does not
        catalog.albums.insert(
            "MPREb_comp".to_string(),
            dto::Album {
                browse_id: "MPREb_comp".to_string(),
                title: "A Compilation".to_string(),
                year: Some("2021".to_string()),
                artists: vec![],
                tracks: vec![dto::Track {
                    video_id: "comp_track00".to_string(),
                    title: "My Song".to_string(),
                    artists: vec![],
                }],
                thumbnail_url: None,
            },
        );
        catalog.search_results = vec![SearchResult {
            video_id: "comp_track00".to_string(),
            title: "My Song".to_string(),
            artists: vec![],
            album_browse_id: Some("MPREb_comp".to_string()),
        }];

        let config = YtMusicConfig {
            similarity_match: true,
            similarity_threshold: 0.8,
            ..YtMusicConfig::default()
        };
        let (provider, _d) = provider(catalog, config).await;

        let resolved = provider.fetch(&item()).await.unwrap().unwrap();
        assert_eq!(
            resolved.metadata.get_text("album").as_deref(),
            Some("A Compilation")
        );
        // A similarity acceptance records its score
        assert!(resolved.metadata.get("similarity").is_some());
    }

    #[tokio::test]
    async fn no_fuzzy_methods_means_no_search_pass() {
        let mut catalog = MockCatalog::default();
        catalog.songs.insert(
            ID.to_string(),
            dto::Song {
                video_id: ID.to_string(),
                title: "My Song".to_string(),
                channel_id: None,
                status: PlayStatus::Ok,
            },
        );
        catalog.search_results = vec![SearchResult {
            video_id: ID.to_string(),
            title: "My Song".to_string(),
            artists: vec![],
            album_browse_id: Some("MPREb_x".to_string()),
        }];
        let (provider, _d) = provider(catalog, YtMusicConfig::default()).await;
        assert!(provider.fetch(&item()).await.unwrap().is_none());
    }
}
