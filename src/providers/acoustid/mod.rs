//! Acoustic fingerprint provider (AcoustID + MusicBrainz).
//!
//! Last resort before the file provider: identifies audio by content
//! rather than filename. The file is fingerprinted with fpcalc, matched
//! against AcoustID, and the best-scoring recording is walked through
//! MusicBrainz for a release carrying front cover art. Recordings whose
//! own releases all fail that test fall back to releases of related
//! recordings reached through the work graph (covers and live versions
//! of the same composition).
//!
//! Lookups are cached per library-relative path so a reorganized library
//! root does not invalidate them; recordings and releases cache by mbid.
//! MusicBrainz calls are paced to one per second.

pub mod client;
pub mod dto;
pub mod fingerprint;
pub mod musicbrainz;

pub use client::{AcoustIdClient, LiveLookup, LookupApi};
pub use fingerprint::is_fpcalc_available;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cache::{CacheStore, CacheTable};
use crate::config::AcoustIdConfig;
use crate::cover::{self, CoverCache, CoverImage};
use crate::model::MediaItem;

use dto::{FingerprintMatch, Recording, Release};

use super::{Provider, ProviderError, ProviderId};

pub const LOOKUP_CACHE: (&str, &[&str]) = ("acoustid_lookups", &["relative_path"]);
pub const RECORDING_CACHE: (&str, &[&str]) = ("mb_recordings", &["mbid"]);
pub const RELEASE_CACHE: (&str, &[&str]) = ("mb_releases", &["mbid"]);

pub struct AcoustIdProvider<L: LookupApi> {
    client: L,
    config: AcoustIdConfig,
    library_root: PathBuf,
    lookups: CacheTable,
    recordings: CacheTable,
    releases: CacheTable,
    covers: CoverCache,
}

impl<L: LookupApi> AcoustIdProvider<L> {
    pub async fn new(
        config: &AcoustIdConfig,
        library_root: impl Into<PathBuf>,
        client: L,
        store: &CacheStore,
        covers: CoverCache,
    ) -> sqlx::Result<Self> {
        Ok(Self {
            client,
            config: config.clone(),
            library_root: library_root.into(),
            lookups: store.table(LOOKUP_CACHE.0, LOOKUP_CACHE.1).await?,
            recordings: store.table(RECORDING_CACHE.0, RECORDING_CACHE.1).await?,
            releases: store.table(RELEASE_CACHE.0, RELEASE_CACHE.1).await?,
            covers,
        })
    }

    /// Cache key for a lookup: the path relative to the library root, so
    /// moving the root does not orphan every cached lookup.
    fn cache_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.library_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    async fn get_matches(
        &self,
        item: &MediaItem,
    ) -> Result<Option<Vec<FingerprintMatch>>, ProviderError> {
        let key = self.cache_key(&item.source);
        match self.lookups.get_decoded::<Vec<FingerprintMatch>>(&[&key]).await? {
            Some(Ok(cached)) => return Ok(Some(cached)),
            Some(Err(e)) => tracing::warn!("{}, refetching", e),
            None => {}
        }

        let Some(print) = fingerprint::generate(&item.source)? else {
            return Ok(None);
        };
        let matches = self.client.lookup_fingerprint(&print).await?;
        self.lookups.put_encoded(&[&key], &matches).await?;
        Ok(Some(matches))
    }

    async fn get_recording(&self, mbid: &str) -> Result<Option<Recording>, ProviderError> {
        match self.recordings.get_decoded::<Recording>(&[mbid]).await? {
            Some(Ok(cached)) => return Ok(Some(cached)),
            Some(Err(e)) => tracing::warn!("{}, refetching", e),
            None => {}
        }
        let Some(recording) = self.client.get_recording(mbid).await? else {
            return Ok(None);
        };
        self.recordings.put_encoded(&[mbid], &recording).await?;
        Ok(Some(recording))
    }

    /// Whether a release is usable: it has front cover art, or missing
    /// art is allowed by config.
    fn acceptable(&self, release: &Release) -> bool {
        release.has_front_cover() || self.config.allow_missing_cover
    }

    /// First acceptable release among the given references. Only accepted
    /// releases are cached, so a cache hit short-circuits the walk.
    async fn first_acceptable(
        &self,
        refs: &[dto::ReleaseRef],
    ) -> Result<Option<Release>, ProviderError> {
        for release_ref in refs {
            if let Some(Ok(cached)) = self
                .releases
                .get_decoded::<Release>(&[&release_ref.id])
                .await?
            {
                return Ok(Some(cached));
            }
            let Some(release) = self.client.get_release(&release_ref.id).await? else {
                continue;
            };
            if !self.acceptable(&release) {
                continue;
            }
            self.releases.put_encoded(&[&release_ref.id], &release).await?;
            return Ok(Some(release));
        }
        Ok(None)
    }

    /// Pick a release for the recording: its own releases first, then
    /// releases of recordings related through the work graph. The second
    /// mode also reports the work relation's attributes for the album
    /// title.
    async fn select_release(
        &self,
        recording: &Recording,
    ) -> Result<Option<(Release, Option<Vec<String>>)>, ProviderError> {
        if let Some(release) = self.first_acceptable(&recording.releases).await? {
            return Ok(Some((release, None)));
        }

        let Some(work_rel) = recording
            .relations
            .iter()
            .find(|r| r.target_type == "work" && r.work.is_some())
        else {
            return Ok(None);
        };
        let work_id = &work_rel.work.as_ref().expect("filtered on work presence").id;
        let Some(work) = self.client.get_work(work_id).await? else {
            return Ok(None);
        };

        for relation in &work.relations {
            if relation.target_type != "recording" {
                continue;
            }
            let Some(recording_ref) = &relation.recording else {
                continue;
            };
            let Some(related) = self.get_recording(&recording_ref.id).await? else {
                continue;
            };
            if let Some(release) = self.first_acceptable(&related.releases).await? {
                return Ok(Some((release, Some(work_rel.attributes.clone()))));
            }
        }
        Ok(None)
    }

    /// Cover for the chosen release: black placeholder when art is known
    /// to be missing and allowed, else disk cache, else the archive. A
    /// release that claimed front art but serves none fails the match.
    async fn resolve_cover(&self, release: &Release) -> Result<Option<CoverImage>, ProviderError> {
        if self.config.allow_missing_cover && !release.has_front_cover() {
            return Ok(Some(cover::placeholder(cover::PLACEHOLDER_BLACK)));
        }
        if let Some(cached) = self.covers.get(&release.id) {
            return Ok(Some(cached));
        }
        let Some(data) = self.client.front_cover(&release.id).await? else {
            return Ok(None);
        };
        let image = CoverImage::from_bytes(data);
        self.covers.put(&release.id, &image);
        Ok(Some(image))
    }

    async fn build_match(
        &self,
        item: &MediaItem,
        matched: &FingerprintMatch,
        recording: &Recording,
        release: &Release,
        related_attributes: Option<Vec<String>>,
    ) -> Result<Option<MediaItem>, ProviderError> {
        let Some(cover_image) = self.resolve_cover(release).await? else {
            tracing::debug!("No cover art for release {}, rejecting match", release.id);
            return Ok(None);
        };

        // Union of release and recording artist credits, release first
        let mut artists: Vec<String> = release
            .artist_credit
            .iter()
            .map(|a| a.name.clone())
            .collect();
        for credit in &recording.artist_credit {
            if !artists.contains(&credit.name) {
                artists.push(credit.name.clone());
            }
        }

        let mut album = release.album_title().unwrap_or("Unknown Album").to_string();
        if let Some(attributes) = related_attributes {
            if !attributes.is_empty() {
                album = format!("{} ({})", album, attributes.join(", "));
            }
        }

        let mut resolved = MediaItem::new(&item.source);
        resolved.metadata.set("title", recording.title.clone());
        resolved.metadata.set("artist", artists);
        resolved.metadata.set("album", album);
        if let Some(date) = &release.date {
            resolved.metadata.set("date", date.clone());
            resolved
                .metadata
                .set("year", date.chars().take(4).collect::<String>());
        }
        resolved.metadata.set("mbid", recording.id.clone());
        resolved
            .metadata
            .set("mb-similarity", format!("{:.2}", matched.score));
        resolved.cover = Some(cover_image);
        resolved.set_provenance("song-scout/acoustid");
        Ok(Some(resolved))
    }
}

#[async_trait]
impl<L: LookupApi> Provider for AcoustIdProvider<L> {
    fn id(&self) -> ProviderId {
        ProviderId::AcoustId
    }

    fn is_applicable(&self, item: &MediaItem) -> bool {
        if self.config.api_key.is_none() {
            return false;
        }
        !item.source.components().any(|part| {
            self.config
                .exclude
                .iter()
                .any(|excluded| part.as_os_str() == excluded.as_str())
        })
    }

    async fn fetch(&self, item: &MediaItem) -> Result<Option<MediaItem>, ProviderError> {
        let Some(matches) = self.get_matches(item).await? else {
            return Ok(None);
        };

        for matched in &matches {
            // Matches arrive sorted; the first sub-threshold score ends it
            if matched.score < self.config.score_threshold {
                tracing::debug!(
                    "Best remaining score {:.2} below threshold {:.2}",
                    matched.score,
                    self.config.score_threshold
                );
                return Ok(None);
            }

            let Some(recording) = self.get_recording(&matched.recording_id).await? else {
                continue;
            };
            if recording.releases.is_empty() && recording.relations.is_empty() {
                continue;
            }
            if let Some((release, related)) = self.select_release(&recording).await? {
                return self
                    .build_match(item, matched, &recording, &release, related)
                    .await;
            }
        }
        Ok(None)
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockLookup;
    use super::*;
    use dto::{ArtistCredit, CoverArtArchive, Relation, ReleaseGroup, ReleaseRef, WorkRef};

    fn config() -> AcoustIdConfig {
        AcoustIdConfig {
            api_key: Some("key".to_string()),
            ..AcoustIdConfig::default()
        }
    }

    fn release(id: &str, album: &str, front: bool) -> Release {
        Release {
            id: id.to_string(),
            title: Some(album.to_string()),
            date: Some("2015-06-01".to_string()),
            artist_credit: vec![ArtistCredit {
                name: "Release Artist".to_string(),
            }],
            release_group: Some(ReleaseGroup {
                id: format!("rg-{}", id),
                title: album.to_string(),
            }),
            cover_art: Some(CoverArtArchive { front }),
        }
    }

    fn recording(id: &str, title: &str, releases: &[&str]) -> Recording {
        Recording {
            id: id.to_string(),
            title: title.to_string(),
            artist_credit: vec![ArtistCredit {
                name: "Recording Artist".to_string(),
            }],
            releases: releases
                .iter()
                .map(|r| ReleaseRef { id: r.to_string() })
                .collect(),
            relations: Vec::new(),
        }
    }

    async fn provider(
        lookup: MockLookup,
        config: AcoustIdConfig,
    ) -> (AcoustIdProvider<MockLookup>, tempfile::TempDir) {
        let store = CacheStore::in_memory(true).await.unwrap();
        let covers_dir = tempfile::tempdir().unwrap();
        let provider = AcoustIdProvider::new(
            &config,
            "/library",
            lookup,
            &store,
            CoverCache::new(covers_dir.path()),
        )
        .await
        .unwrap();
        (provider, covers_dir)
    }

    /// Bypass fpcalc by priming the lookup cache for the item.
    async fn prime_lookup(provider: &AcoustIdProvider<MockLookup>, item: &MediaItem) {
        let key = provider.cache_key(&item.source);
        provider
            .lookups
            .put_encoded(&[&key], &provider.client.matches)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn applicability_needs_key_and_clean_path() {
        let cfg = AcoustIdConfig {
            exclude: vec!["sfx".to_string()],
            ..config()
        };
        let (provider, _d) = provider(MockLookup::default(), cfg).await;
        assert!(provider.is_applicable(&MediaItem::new("/library/music/song.mp3")));
        assert!(!provider.is_applicable(&MediaItem::new("/library/sfx/boom.mp3")));

        let (keyless, _d2) = self::provider(MockLookup::default(), AcoustIdConfig::default()).await;
        assert!(!keyless.is_applicable(&MediaItem::new("/library/music/song.mp3")));
    }

    #[tokio::test]
    async fn resolves_best_match_through_musicbrainz() {
        let mut lookup = MockLookup::default();
        lookup.matches = vec![FingerprintMatch {
            score: 0.97,
            recording_id: "rec-1".to_string(),
        }];
        lookup
            .recordings
            .insert("rec-1".to_string(), recording("rec-1", "The Song", &["rel-1"]));
        lookup
            .releases
            .insert("rel-1".to_string(), release("rel-1", "The Album", true));
        lookup
            .cover_data
            .insert("rel-1".to_string(), vec![0xFF, 0xD8, 0xFF]);

        let (provider, _d) = provider(lookup, config()).await;
        let item = MediaItem::new("/library/unknown.opus");
        prime_lookup(&provider, &item).await;

        let resolved = provider.fetch(&item).await.unwrap().unwrap();
        assert_eq!(resolved.metadata.get_text("title").as_deref(), Some("The Song"));
        assert_eq!(resolved.metadata.get_text("album").as_deref(), Some("The Album"));
        assert_eq!(resolved.metadata.get_text("year").as_deref(), Some("2015"));
        assert_eq!(resolved.metadata.get_text("mbid").as_deref(), Some("rec-1"));
        assert_eq!(resolved.metadata.get_text("mb-similarity").as_deref(), Some("0.97"));
        assert_eq!(resolved.provenance(), Some("song-scout/acoustid"));
        // Artist credits union release and recording
        assert_eq!(
            resolved.metadata.get("artist").unwrap().display(),
            "Release Artist, Recording Artist"
        );
    }

    #[tokio::test]
    async fn sub_threshold_score_is_a_miss() {
        let mut lookup = MockLookup::default();
        lookup.matches = vec![FingerprintMatch {
            score: 0.4,
            recording_id: "rec-1".to_string(),
        }];
        let (provider, _d) = provider(lookup, config()).await;
        let item = MediaItem::new("/library/unknown.opus");
        prime_lookup(&provider, &item).await;
        assert!(provider.fetch(&item).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn coverless_release_is_skipped_for_the_next() {
        let mut lookup = MockLookup::default();
        lookup.matches = vec![FingerprintMatch {
            score: 0.95,
            recording_id: "rec-1".to_string(),
        }];
        lookup.recordings.insert(
            "rec-1".to_string(),
            recording("rec-1", "The Song", &["bare", "covered"]),
        );
        lookup
            .releases
            .insert("bare".to_string(), release("bare", "Bare", false));
        lookup
            .releases
            .insert("covered".to_string(), release("covered", "Covered", true));
        lookup
            .cover_data
            .insert("covered".to_string(), vec![0x89, 0x50]);

        let (provider, _d) = provider(lookup, config()).await;
        let item = MediaItem::new("/library/unknown.opus");
        prime_lookup(&provider, &item).await;

        let resolved = provider.fetch(&item).await.unwrap().unwrap();
        assert_eq!(resolved.metadata.get_text("album").as_deref(), Some("Covered"));
    }

    #[tokio::test]
    async fn allow_missing_cover_takes_black_placeholder() {
        let mut lookup = MockLookup::default();
        lookup.matches = vec![FingerprintMatch {
            score: 0.95,
            recording_id: "rec-1".to_string(),
        }];
        lookup
            .recordings
            .insert("rec-1".to_string(), recording("rec-1", "The Song", &["bare"]));
        lookup
            .releases
            .insert("bare".to_string(), release("bare", "Bare", false));

        let cfg = AcoustIdConfig {
            allow_missing_cover: true,
            ..config()
        };
        let (provider, _d) = provider(lookup, cfg).await;
        let item = MediaItem::new("/library/unknown.opus");
        prime_lookup(&provider, &item).await;

        let resolved = provider.fetch(&item).await.unwrap().unwrap();
        let cover_image = resolved.cover.unwrap();
        assert_eq!(
            cover_image.data,
            cover::placeholder(cover::PLACEHOLDER_BLACK).data
        );
    }

    #[tokio::test]
    async fn related_work_fallback_tags_the_album() {
        let mut lookup = MockLookup::default();
        lookup.matches = vec![FingerprintMatch {
            score: 0.95,
            recording_id: "rec-1".to_string(),
        }];
        let mut primary = recording("rec-1", "The Song", &[]);
        primary.relations = vec![Relation {
            target_type: "work".to_string(),
            attributes: vec!["cover".to_string()],
            work: Some(WorkRef {
                id: "work-1".to_string(),
            }),
            recording: None,
        }];
        lookup.recordings.insert("rec-1".to_string(), primary);
        lookup.works.insert(
            "work-1".to_string(),
            dto::Work {
                id: "work-1".to_string(),
                relations: vec![Relation {
                    target_type: "recording".to_string(),
                    attributes: Vec::new(),
                    work: None,
                    recording: Some(dto::RecordingRef {
                        id: "rec-2".to_string(),
                    }),
                }],
            },
        );
        lookup.recordings.insert(
            "rec-2".to_string(),
            recording("rec-2", "The Song (Original)", &["rel-orig"]),
        );
        lookup
            .releases
            .insert("rel-orig".to_string(), release("rel-orig", "Origins", true));
        lookup
            .cover_data
            .insert("rel-orig".to_string(), vec![1, 2, 3]);

        let (provider, _d) = provider(lookup, config()).await;
        let item = MediaItem::new("/library/unknown.opus");
        prime_lookup(&provider, &item).await;

        let resolved = provider.fetch(&item).await.unwrap().unwrap();
        assert_eq!(
            resolved.metadata.get_text("album").as_deref(),
            Some("Origins (cover)")
        );
        // Title stays the matched recording's, not the related one's
        assert_eq!(resolved.metadata.get_text("title").as_deref(), Some("The Song"));
    }

    #[tokio::test]
    async fn missing_archive_art_rejects_the_match() {
        let mut lookup = MockLookup::default();
        lookup.matches = vec![FingerprintMatch {
            score: 0.95,
            recording_id: "rec-1".to_string(),
        }];
        lookup
            .recordings
            .insert("rec-1".to_string(), recording("rec-1", "The Song", &["rel-1"]));
        // Release claims front art but the archive serves nothing
        lookup
            .releases
            .insert("rel-1".to_string(), release("rel-1", "The Album", true));

        let (provider, _d) = provider(lookup, config()).await;
        let item = MediaItem::new("/library/unknown.opus");
        prime_lookup(&provider, &item).await;
        assert!(provider.fetch(&item).await.unwrap().is_none());
    }
}
