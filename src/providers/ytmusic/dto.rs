//! Music catalog (YouTube Music) data shapes.
//!
//! The web client's raw responses are deeply nested renderer trees; the
//! HTTP client flattens them into these shapes at the transport boundary,
//! and these are what gets cached per call. Each call shape gets its own
//! cache table because the same id means different things to different
//! calls (a video id is not a browse id).

use serde::{Deserialize, Serialize};

/// Playability of a catalog song entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStatus {
    Ok,
    /// Region-locked or withdrawn; the catalog entry may still resolve
    Unplayable,
    /// Removed or broken entry
    Error,
    LoginRequired,
}

impl PlayStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "OK" => PlayStatus::Ok,
            "UNPLAYABLE" => PlayStatus::Unplayable,
            "LOGIN_REQUIRED" => PlayStatus::LoginRequired,
            _ => PlayStatus::Error,
        }
    }
}

/// The catalog's own entry for a video id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub video_id: String,
    pub title: String,
    /// Uploading channel; starting point for artist resolution
    pub channel_id: Option<String>,
    pub status: PlayStatus,
}

/// A resolved catalog artist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub channel_id: String,
    pub name: String,
}

/// Reference to one of an artist's releases, from the discography listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRef {
    pub browse_id: String,
    pub title: String,
    pub year: Option<String>,
}

/// A release with its track list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub browse_id: String,
    pub title: String,
    pub year: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

/// One row of a songs-filtered catalog search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    /// Absent for some odd entries; those cannot be resolved to a release
    pub album_browse_id: Option<String>,
}

/// Discriminator for the artist discography call shape. Albums and singles
/// go through different catalog requests, so they cache separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumMode {
    Albums,
    Singles,
}

impl AlbumMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumMode::Albums => "albums",
            AlbumMode::Singles => "singles",
        }
    }
}
