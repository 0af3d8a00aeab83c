//! Music catalog HTTP client (YouTube Music web API).
//!
//! The catalog has no official API; like every third-party client we POST
//! to the `youtubei/v1` endpoints the web player uses and dig the useful
//! fields out of the renderer trees. All interpretation happens here, at
//! the transport boundary - the provider only ever sees the flat shapes
//! in [`super::dto`].
//!
//! The renderer trees are too irregular for typed DTOs to survive contact
//! with reality, so extraction uses path navigation over
//! `serde_json::Value` with every path written out once.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::dto::{Album, AlbumMode, AlbumRef, Artist, ArtistRef, PlayStatus, SearchResult, Song, Track};
use crate::cache::{CacheStore, CacheTable};
use crate::providers::ProviderError;

/// The five call shapes, each with its own cache table. The discography
/// listing carries a mode discriminator and search carries its filter, as
/// composite keys.
pub const SONG_CACHE: (&str, &[&str]) = ("ytm_songs", &["video_id"]);
pub const ARTIST_CACHE: (&str, &[&str]) = ("ytm_artists", &["channel_id"]);
pub const ARTIST_ALBUMS_CACHE: (&str, &[&str]) = ("ytm_artist_albums", &["channel_id", "mode"]);
pub const ALBUM_CACHE: (&str, &[&str]) = ("ytm_albums", &["browse_id"]);
pub const SEARCH_CACHE: (&str, &[&str]) = ("ytm_search", &["query", "filter"]);

/// Songs-filter token for the search endpoint.
const SEARCH_FILTER_SONGS: &str = "EgWKAQIIAWoKEAoQAxAEEAkQBQ%3D%3D";

/// Catalog operations, abstracted so the matching logic can be tested
/// against a scripted catalog.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_song(&self, video_id: &str) -> Result<Song, ProviderError>;

    /// None when the channel does not resolve to a catalog artist
    /// (deleted, or an auto-generated channel with no artist page).
    async fn get_artist(&self, channel_id: &str) -> Result<Option<Artist>, ProviderError>;

    async fn get_artist_albums(
        &self,
        channel_id: &str,
        mode: AlbumMode,
    ) -> Result<Vec<AlbumRef>, ProviderError>;

    async fn get_album(&self, browse_id: &str) -> Result<Album, ProviderError>;

    async fn search_songs(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError>;

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Real web-API client.
pub struct YtMusicClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl Default for YtMusicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YtMusicClient {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent("Mozilla/5.0 (compatible; song-scout)")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: "https://music.youtube.com/youtubei/v1".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// POST a youtubei endpoint with the standard web-remix context.
    async fn post(&self, endpoint: &str, mut body: Value) -> Result<Value, ProviderError> {
        body["context"] = json!({
            "client": {
                "clientName": "WEB_REMIX",
                "clientVersion": "1.20240101.01.00",
            }
        });
        let url = format!("{}/{}?prettyPrint=false", self.base_url, endpoint);
        let response = self.http_client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "catalog {} returned HTTP {}",
                endpoint, status
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::transient(format!("parse {} response: {}", endpoint, e)))
    }
}

#[async_trait]
impl CatalogApi for YtMusicClient {
    async fn get_song(&self, video_id: &str) -> Result<Song, ProviderError> {
        let raw = self.post("player", json!({ "videoId": video_id })).await?;
        parse_song(video_id, &raw)
    }

    async fn get_artist(&self, channel_id: &str) -> Result<Option<Artist>, ProviderError> {
        let raw = self.post("browse", json!({ "browseId": channel_id })).await?;
        Ok(parse_artist(channel_id, &raw))
    }

    async fn get_artist_albums(
        &self,
        channel_id: &str,
        mode: AlbumMode,
    ) -> Result<Vec<AlbumRef>, ProviderError> {
        let raw = self.post("browse", json!({ "browseId": channel_id })).await?;
        let Some(section) = find_discography_section(&raw, mode) else {
            return Ok(Vec::new());
        };

        // A "more" button means the carousel is truncated and a dedicated
        // grid page exists; follow it for the full listing.
        if let Some((browse_id, params)) = more_content_target(section) {
            let full = self
                .post("browse", json!({ "browseId": browse_id, "params": params }))
                .await?;
            return Ok(parse_album_grid(&full));
        }

        Ok(parse_album_carousel(section))
    }

    async fn get_album(&self, browse_id: &str) -> Result<Album, ProviderError> {
        let raw = self.post("browse", json!({ "browseId": browse_id })).await?;
        parse_album(browse_id, &raw)
    }

    async fn search_songs(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        let raw = self
            .post(
                "search",
                json!({ "query": query, "params": SEARCH_FILTER_SONGS }),
            )
            .await?;
        Ok(parse_search_results(&raw))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::transient(format!(
                "image fetch returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ============================================================================
// Renderer-tree extraction
// ============================================================================

/// Walk a path of object keys / array indices ("0" etc.).
fn nav<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = match current {
            Value::Object(map) => map.get(*key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn nav_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    nav(value, path)?.as_str()
}

/// `{ "runs": [{"text": ...}] }` → the first run's text.
fn runs_text(value: &Value) -> Option<String> {
    nav_str(value, &["runs", "0", "text"]).map(str::to_string)
}

/// All runs of a text node, for subtitle lines like "Album • 2019".
fn all_runs(value: &Value) -> Vec<(String, Option<String>)> {
    let Some(runs) = nav(value, &["runs"]).and_then(Value::as_array) else {
        return Vec::new();
    };
    runs.iter()
        .filter_map(|run| {
            let text = run.get("text")?.as_str()?.to_string();
            let browse_id = nav_str(run, &["navigationEndpoint", "browseEndpoint", "browseId"])
                .map(str::to_string);
            Some((text, browse_id))
        })
        .collect()
}

/// Largest thumbnail URL from a `{thumbnails: [...]}` array.
fn best_thumbnail(value: &Value) -> Option<String> {
    nav(value, &["thumbnails"])
        .and_then(Value::as_array)?
        .iter()
        .max_by_key(|t| {
            t.get("width").and_then(Value::as_u64).unwrap_or(0)
                * t.get("height").and_then(Value::as_u64).unwrap_or(0)
        })
        .and_then(|t| t.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_song(video_id: &str, raw: &Value) -> Result<Song, ProviderError> {
    let status = nav_str(raw, &["playabilityStatus", "status"])
        .map(PlayStatus::from_api)
        .unwrap_or(PlayStatus::Error);
    let details = nav(raw, &["videoDetails"]);
    Ok(Song {
        video_id: details
            .and_then(|d| nav_str(d, &["videoId"]))
            .unwrap_or(video_id)
            .to_string(),
        title: details
            .and_then(|d| nav_str(d, &["title"]))
            .unwrap_or_default()
            .to_string(),
        channel_id: details
            .and_then(|d| nav_str(d, &["channelId"]))
            .map(str::to_string),
        status,
    })
}

fn parse_artist(channel_id: &str, raw: &Value) -> Option<Artist> {
    let header = nav(raw, &["header"])?;
    // Artist pages use one of two header renderers
    let name = nav(header, &["musicImmersiveHeaderRenderer", "title"])
        .or_else(|| nav(header, &["musicVisualHeaderRenderer", "title"]))
        .and_then(runs_text)?;
    Some(Artist {
        channel_id: channel_id.to_string(),
        name,
    })
}

/// Locate the discography carousel for albums or singles on an artist page.
fn find_discography_section(raw: &Value, mode: AlbumMode) -> Option<&Value> {
    let sections = nav(
        raw,
        &[
            "contents",
            "singleColumnBrowseResultsRenderer",
            "tabs",
            "0",
            "tabRenderer",
            "content",
            "sectionListRenderer",
            "contents",
        ],
    )?
    .as_array()?;

    let wanted = match mode {
        AlbumMode::Albums => "Albums",
        AlbumMode::Singles => "Singles",
    };
    sections.iter().find_map(|section| {
        let shelf = nav(section, &["musicCarouselShelfRenderer"])?;
        let title = nav(
            shelf,
            &[
                "header",
                "musicCarouselShelfBasicHeaderRenderer",
                "title",
            ],
        )
        .and_then(runs_text)?;
        (title == wanted).then_some(shelf)
    })
}

/// Browse target of a carousel's "more" button, when present.
fn more_content_target(shelf: &Value) -> Option<(String, String)> {
    let endpoint = nav(
        shelf,
        &[
            "header",
            "musicCarouselShelfBasicHeaderRenderer",
            "moreContentButton",
            "buttonRenderer",
            "navigationEndpoint",
            "browseEndpoint",
        ],
    )?;
    Some((
        nav_str(endpoint, &["browseId"])?.to_string(),
        nav_str(endpoint, &["params"]).unwrap_or_default().to_string(),
    ))
}

fn parse_album_carousel(shelf: &Value) -> Vec<AlbumRef> {
    let Some(items) = nav(shelf, &["contents"]).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| parse_two_row_item(nav(item, &["musicTwoRowItemRenderer"])?))
        .collect()
}

fn parse_album_grid(raw: &Value) -> Vec<AlbumRef> {
    let Some(items) = nav(
        raw,
        &[
            "contents",
            "singleColumnBrowseResultsRenderer",
            "tabs",
            "0",
            "tabRenderer",
            "content",
            "sectionListRenderer",
            "contents",
            "0",
            "gridRenderer",
            "items",
        ],
    )
    .and_then(Value::as_array) else {
        // The grid page occasionally comes back without a gridRenderer;
        // treat it as an empty discography rather than failing the item
        tracing::warn!("Discography grid missing gridRenderer, returning empty list");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| parse_two_row_item(nav(item, &["musicTwoRowItemRenderer"])?))
        .collect()
}

fn parse_two_row_item(renderer: &Value) -> Option<AlbumRef> {
    let browse_id = nav_str(
        renderer,
        &["navigationEndpoint", "browseEndpoint", "browseId"],
    )?
    .to_string();
    let title = nav(renderer, &["title"]).and_then(runs_text)?;
    // Subtitle runs end with the release year when the catalog knows it
    let year = nav(renderer, &["subtitle"])
        .map(all_runs)
        .and_then(|runs| runs.last().map(|(text, _)| text.clone()))
        .filter(|text| text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()));
    Some(AlbumRef {
        browse_id,
        title,
        year,
    })
}

fn parse_album(browse_id: &str, raw: &Value) -> Result<Album, ProviderError> {
    let header = nav(raw, &["header", "musicDetailHeaderRenderer"])
        .or_else(|| nav(raw, &["header", "musicResponsiveHeaderRenderer"]))
        .ok_or_else(|| ProviderError::transient("album response missing header"))?;

    let title = nav(header, &["title"])
        .and_then(runs_text)
        .ok_or_else(|| ProviderError::transient("album response missing title"))?;

    let subtitle_runs = nav(header, &["subtitle"]).map(all_runs).unwrap_or_default();
    let year = subtitle_runs
        .last()
        .map(|(text, _)| text.clone())
        .filter(|text| text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()));
    let artists: Vec<ArtistRef> = subtitle_runs
        .iter()
        .filter(|(_, browse)| browse.is_some())
        .map(|(text, browse)| ArtistRef {
            id: browse.clone(),
            name: text.clone(),
        })
        .collect();

    let thumbnail_url = nav(
        header,
        &["thumbnail", "croppedSquareThumbnailRenderer", "thumbnail"],
    )
    .and_then(best_thumbnail);

    let tracks = nav(
        raw,
        &[
            "contents",
            "singleColumnBrowseResultsRenderer",
            "tabs",
            "0",
            "tabRenderer",
            "content",
            "sectionListRenderer",
            "contents",
            "0",
            "musicShelfRenderer",
            "contents",
        ],
    )
    .and_then(Value::as_array)
    .map(|items| {
        items
            .iter()
            .filter_map(|item| parse_track(nav(item, &["musicResponsiveListItemRenderer"])?))
            .collect()
    })
    .unwrap_or_default();

    Ok(Album {
        browse_id: browse_id.to_string(),
        title,
        year,
        artists,
        tracks,
        thumbnail_url,
    })
}

fn parse_track(renderer: &Value) -> Option<Track> {
    let video_id = nav_str(renderer, &["playlistItemData", "videoId"])?.to_string();
    let title = nav(
        renderer,
        &[
            "flexColumns",
            "0",
            "musicResponsiveListItemFlexColumnRenderer",
            "text",
        ],
    )
    .and_then(runs_text)?;
    let artists = nav(
        renderer,
        &[
            "flexColumns",
            "1",
            "musicResponsiveListItemFlexColumnRenderer",
            "text",
        ],
    )
    .map(all_runs)
    .unwrap_or_default()
    .into_iter()
    .filter(|(text, _)| text != " • " && text != ", " && text != " & ")
    .map(|(name, id)| ArtistRef { id, name })
    .collect();
    Some(Track {
        video_id,
        title,
        artists,
    })
}

fn parse_search_results(raw: &Value) -> Vec<SearchResult> {
    let Some(sections) = nav(
        raw,
        &[
            "contents",
            "tabbedSearchResultsRenderer",
            "tabs",
            "0",
            "tabRenderer",
            "content",
            "sectionListRenderer",
            "contents",
        ],
    )
    .and_then(Value::as_array) else {
        return Vec::new();
    };

    sections
        .iter()
        .filter_map(|section| nav(section, &["musicShelfRenderer", "contents"]))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|item| parse_search_row(nav(item, &["musicResponsiveListItemRenderer"])?))
        .collect()
}

fn parse_search_row(renderer: &Value) -> Option<SearchResult> {
    let track = parse_track(renderer)?;
    // The album link hides in the secondary flex column's runs
    let album_browse_id = nav(
        renderer,
        &[
            "flexColumns",
            "1",
            "musicResponsiveListItemFlexColumnRenderer",
            "text",
        ],
    )
    .map(all_runs)
    .unwrap_or_default()
    .into_iter()
    .find_map(|(_, browse)| browse.filter(|id| id.starts_with("MPREb")));

    Some(SearchResult {
        video_id: track.video_id,
        title: track.title,
        artists: track.artists,
        album_browse_id,
    })
}

// ============================================================================
// Caching wrapper
// ============================================================================

/// Read-through cache over a [`CatalogApi`], one table per call shape.
///
/// Keys are structured columns, never concatenated strings: the
/// discography table keys on (channel_id, mode) and the search table on
/// (query, filter), so shapes that share an id cannot collide.
pub struct CachedCatalog<C: CatalogApi> {
    client: C,
    songs: CacheTable,
    artists: CacheTable,
    artist_albums: CacheTable,
    albums: CacheTable,
    search: CacheTable,
}

impl<C: CatalogApi> CachedCatalog<C> {
    pub async fn new(client: C, store: &CacheStore) -> sqlx::Result<Self> {
        Ok(Self {
            client,
            songs: store.table(SONG_CACHE.0, SONG_CACHE.1).await?,
            artists: store.table(ARTIST_CACHE.0, ARTIST_CACHE.1).await?,
            artist_albums: store
                .table(ARTIST_ALBUMS_CACHE.0, ARTIST_ALBUMS_CACHE.1)
                .await?,
            albums: store.table(ALBUM_CACHE.0, ALBUM_CACHE.1).await?,
            search: store.table(SEARCH_CACHE.0, SEARCH_CACHE.1).await?,
        })
    }

    pub async fn get_song(&self, video_id: &str) -> Result<Song, ProviderError> {
        if let Some(Ok(cached)) = self.songs.get_decoded(&[video_id]).await? {
            return Ok(cached);
        }
        let song = self.client.get_song(video_id).await?;
        self.songs.put_encoded(&[video_id], &song).await?;
        Ok(song)
    }

    pub async fn get_artist(&self, channel_id: &str) -> Result<Option<Artist>, ProviderError> {
        if let Some(Ok(cached)) = self.artists.get_decoded(&[channel_id]).await? {
            return Ok(cached);
        }
        let artist = self.client.get_artist(channel_id).await?;
        self.artists.put_encoded(&[channel_id], &artist).await?;
        Ok(artist)
    }

    pub async fn get_artist_albums(
        &self,
        channel_id: &str,
        mode: AlbumMode,
    ) -> Result<Vec<AlbumRef>, ProviderError> {
        let key = [channel_id, mode.as_str()];
        if let Some(Ok(cached)) = self.artist_albums.get_decoded(&key).await? {
            return Ok(cached);
        }
        let refs = self.client.get_artist_albums(channel_id, mode).await?;
        self.artist_albums.put_encoded(&key, &refs).await?;
        Ok(refs)
    }

    pub async fn get_album(&self, browse_id: &str) -> Result<Album, ProviderError> {
        if let Some(Ok(cached)) = self.albums.get_decoded(&[browse_id]).await? {
            return Ok(cached);
        }
        let album = self.client.get_album(browse_id).await?;
        self.albums.put_encoded(&[browse_id], &album).await?;
        Ok(album)
    }

    pub async fn search_songs(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        let key = [query, "songs"];
        if let Some(Ok(cached)) = self.search.get_decoded(&key).await? {
            return Ok(cached);
        }
        let results = self.client.search_songs(query).await?;
        self.search.put_encoded(&key, &results).await?;
        Ok(results)
    }

    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.client.fetch_image(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_with_custom_url() {
        let client = YtMusicClient::with_base_url("http://localhost:8080");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn nav_walks_objects_and_arrays() {
        let value = json!({"a": [{"b": "found"}]});
        assert_eq!(nav_str(&value, &["a", "0", "b"]), Some("found"));
        assert!(nav(&value, &["a", "1"]).is_none());
        assert!(nav(&value, &["missing"]).is_none());
    }

    #[test]
    fn parses_song_player_response() {
        let raw = json!({
            "playabilityStatus": {"status": "OK"},
            "videoDetails": {
                "videoId": "dQw4w9WgXcQ",
                "title": "Never Gonna Give You Up",
                "channelId": "UCrick",
            }
        });
        let song = parse_song("dQw4w9WgXcQ", &raw).unwrap();
        assert_eq!(song.status, PlayStatus::Ok);
        assert_eq!(song.title, "Never Gonna Give You Up");
        assert_eq!(song.channel_id.as_deref(), Some("UCrick"));
    }

    #[test]
    fn song_without_details_is_an_error_status() {
        let raw = json!({"playabilityStatus": {"status": "ERROR"}});
        let song = parse_song("gone", &raw).unwrap();
        assert_eq!(song.status, PlayStatus::Error);
        assert_eq!(song.video_id, "gone");
        assert!(song.channel_id.is_none());
    }

    #[test]
    fn parses_album_header_and_tracks() {
        let raw = json!({
            "header": {"musicDetailHeaderRenderer": {
                "title": {"runs": [{"text": "Whenever You Need Somebody"}]},
                "subtitle": {"runs": [
                    {"text": "Album"},
                    {"text": " • "},
                    {"text": "Rick Astley", "navigationEndpoint": {"browseEndpoint": {"browseId": "UCrick"}}},
                    {"text": " • "},
                    {"text": "1987"},
                ]},
            }},
            "contents": {"singleColumnBrowseResultsRenderer": {"tabs": [{"tabRenderer": {"content": {"sectionListRenderer": {"contents": [{"musicShelfRenderer": {"contents": [
                {"musicResponsiveListItemRenderer": {
                    "playlistItemData": {"videoId": "dQw4w9WgXcQ"},
                    "flexColumns": [
                        {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": "Never Gonna Give You Up"}]}}},
                        {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": "Rick Astley"}]}}},
                    ],
                }}
            ]}}]}}}}]}}
        });
        let album = parse_album("MPREb_abc", &raw).unwrap();
        assert_eq!(album.title, "Whenever You Need Somebody");
        assert_eq!(album.year.as_deref(), Some("1987"));
        assert_eq!(album.artists.len(), 1);
        assert_eq!(album.tracks.len(), 1);
        assert_eq!(album.tracks[0].video_id, "dQw4w9WgXcQ");
    }
}
