//! AcoustID and MusicBrainz wire shapes.
//!
//! These mirror what the APIs return; everything here gets cached
//! verbatim, so fields stay close to the wire. MusicBrainz uses kebab-case
//! keys throughout.
//!
//! AcoustID: https://acoustid.org/webservice#lookup
//! MusicBrainz: https://musicbrainz.org/doc/MusicBrainz_API

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AcoustID lookup

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<LookupResult>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupResult {
    pub id: String,
    /// Match confidence, 0.0 to 1.0
    pub score: f32,
    #[serde(default)]
    pub recordings: Vec<RecordingRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingRef {
    pub id: String,
}

/// One fingerprint match flattened to what resolution needs. This is the
/// shape cached per library-relative path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FingerprintMatch {
    pub score: f32,
    pub recording_id: String,
}

/// Flatten a lookup response into (score, recording) pairs, best first.
pub fn flatten_matches(response: &LookupResponse) -> Vec<FingerprintMatch> {
    let mut matches: Vec<FingerprintMatch> = response
        .results
        .iter()
        .flat_map(|result| {
            result.recordings.iter().map(|rec| FingerprintMatch {
                score: result.score,
                recording_id: rec.id.clone(),
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

// ---------------------------------------------------------------------------
// MusicBrainz

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Recording {
    pub id: String,
    pub title: String,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub releases: Vec<ReleaseRef>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistCredit {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseRef {
    pub id: String,
}

/// A relationship edge; only work and recording targets are followed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Relation {
    #[serde(rename = "target-type")]
    pub target_type: String,
    /// Qualifiers like "cover" or "live"; surfaced in the album title
    /// when a release was found through a related work
    #[serde(default)]
    pub attributes: Vec<String>,
    pub work: Option<WorkRef>,
    pub recording: Option<RecordingRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Work {
    pub id: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Release {
    pub id: String,
    pub title: Option<String>,
    /// "YYYY-MM-DD", sometimes just "YYYY"
    pub date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(rename = "release-group")]
    pub release_group: Option<ReleaseGroup>,
    #[serde(rename = "cover-art-archive")]
    pub cover_art: Option<CoverArtArchive>,
}

impl Release {
    pub fn has_front_cover(&self) -> bool {
        self.cover_art.as_ref().is_some_and(|c| c.front)
    }

    /// Album title: the release group's when known, else the release's own.
    pub fn album_title(&self) -> Option<&str> {
        self.release_group
            .as_ref()
            .map(|g| g.title.as_str())
            .or(self.title.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseGroup {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoverArtArchive {
    pub front: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_orders_by_score_descending() {
        let response = LookupResponse {
            status: "ok".to_string(),
            results: vec![
                LookupResult {
                    id: "a".to_string(),
                    score: 0.5,
                    recordings: vec![RecordingRef { id: "rec-low".to_string() }],
                },
                LookupResult {
                    id: "b".to_string(),
                    score: 0.97,
                    recordings: vec![
                        RecordingRef { id: "rec-high-1".to_string() },
                        RecordingRef { id: "rec-high-2".to_string() },
                    ],
                },
            ],
        };
        let matches = flatten_matches(&response);
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].recording_id, "rec-high-1");
        assert_eq!(matches[2].recording_id, "rec-low");
    }

    #[test]
    fn parses_kebab_case_release() {
        let json = r#"{
            "id": "rel-1",
            "title": "The Release",
            "date": "2019-04-01",
            "artist-credit": [{"name": "Someone"}],
            "release-group": {"id": "rg-1", "title": "The Album"},
            "cover-art-archive": {"front": true}
        }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert!(release.has_front_cover());
        assert_eq!(release.album_title(), Some("The Album"));
    }
}
