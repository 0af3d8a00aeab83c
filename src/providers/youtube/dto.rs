//! YouTube Data API v3 response shapes.
//!
//! These types match what the `videos` endpoint returns, reduced to the
//! fields we read. They are cached verbatim (base64-of-JSON) and only
//! converted to metadata in the provider, so both derives are required.
//!
//! API Reference: https://developers.google.com/youtube/v3/docs/videos/list

use serde::{Deserialize, Serialize};

/// Top-level `videos.list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideosResponse {
    /// Empty when the id has no corresponding live video
    #[serde(default)]
    pub items: Vec<Video>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub snippet: Snippet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub channel_title: String,
    /// RFC 3339 timestamp
    pub published_at: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

/// Named thumbnail sizes; any of them may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
    pub standard: Option<Thumbnail>,
    pub maxres: Option<Thumbnail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl Thumbnails {
    /// Largest available thumbnail by pixel area.
    pub fn best(&self) -> Option<&Thumbnail> {
        [
            &self.maxres,
            &self.standard,
            &self.high,
            &self.medium,
            &self.default,
        ]
        .into_iter()
        .flatten()
        .max_by_key(|t| t.width as u64 * t.height as u64)
    }
}
