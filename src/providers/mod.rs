//! Identification providers.
//!
//! Each provider exposes a cheap, local-only applicability check and a
//! fetch that performs the actual (possibly remote, possibly cached)
//! lookup. Outcomes are data, never control flow by exception:
//!
//! - not applicable: `is_applicable` returns false, chain skips silently
//! - not found: `fetch` returns `Ok(None)`, chain continues
//! - transient remote failure: `Err(ProviderError::Transient)`, logged by
//!   the resolver and treated as a miss for that item
//! - fatal configuration problem: `Err(ProviderError::Config)`, provider
//!   is disabled for the rest of the run
//!
//! A provider that structurally cannot run (missing credential) must say
//! not-applicable rather than erroring on every call.

pub mod acoustid;
pub mod file;
pub mod niconico;
pub mod youtube;
pub mod ytmusic;

use async_trait::async_trait;
use regex::Regex;

use crate::model::MediaItem;

/// Stable identifiers for the configurable provider chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    File,
    Youtube,
    Niconico,
    YtMusic,
    AcoustId,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::File => "file",
            ProviderId::Youtube => "youtube",
            ProviderId::Niconico => "niconico",
            ProviderId::YtMusic => "ytmusic",
            ProviderId::AcoustId => "acoustid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(ProviderId::File),
            "youtube" => Some(ProviderId::Youtube),
            "niconico" => Some(ProviderId::Niconico),
            "ytmusic" => Some(ProviderId::YtMusic),
            "acoustid" => Some(ProviderId::AcoustId),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a provider can surface to the resolver. "Not found" is not an
/// error; fetch returns `Ok(None)` for that.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Network failure, malformed response, unexpected schema, failed
    /// subprocess - anything worth retrying on a later run
    #[error("transient failure: {0}")]
    Transient(String),

    /// The provider cannot work at all this run (bad credential, missing
    /// tool); the resolver disables it after the first occurrence
    #[error("configuration problem: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<sqlx::Error> for ProviderError {
    fn from(e: sqlx::Error) -> Self {
        ProviderError::Transient(format!("cache: {}", e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transient(format!("http: {}", e))
    }
}

/// A pluggable identification source.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Cheap, local-only check: filename pattern, credential presence.
    fn is_applicable(&self, item: &MediaItem) -> bool;

    /// Perform the lookup. `Ok(None)` means the provider ran and found no
    /// match; the chain continues.
    async fn fetch(&self, item: &MediaItem) -> Result<Option<MediaItem>, ProviderError>;
}

/// Compile configured id-extraction patterns, skipping (and logging)
/// invalid ones rather than poisoning the whole provider.
pub(crate) fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Ignoring invalid filename regex {:?}: {}", p, e);
                None
            }
        })
        .collect()
}

/// Extract an id from a filename using the first pattern whose first
/// capture group matches.
pub(crate) fn extract_id(patterns: &[Regex], filename: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(filename)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_patterns() -> Vec<Regex> {
        compile_patterns(&[
            r"-([A-Za-z0-9\-_]{11})\.".to_string(),
            r"\[([A-Za-z0-9\-_]{11})\]\.".to_string(),
        ])
    }

    #[test]
    fn extracts_suffix_style_id() {
        let id = extract_id(&id_patterns(), "My Song-dQw4w9WgXcQ.webm");
        assert_eq!(id.as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn extracts_bracket_style_id() {
        let id = extract_id(&id_patterns(), "My Song [dQw4w9WgXcQ].mkv");
        assert_eq!(id.as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn rejects_wrong_length_or_missing_ids() {
        assert!(extract_id(&id_patterns(), "My Song.mp3").is_none());
        assert!(extract_id(&id_patterns(), "My Song-short.mp3").is_none());
        assert!(extract_id(&id_patterns(), "").is_none());
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let patterns = compile_patterns(&["(unclosed".to_string(), r"(\d+)".to_string()]);
        assert_eq!(patterns.len(), 1);
    }

    #[test]
    fn provider_id_round_trips() {
        for id in [
            ProviderId::File,
            ProviderId::Youtube,
            ProviderId::Niconico,
            ProviderId::YtMusic,
            ProviderId::AcoustId,
        ] {
            assert_eq!(ProviderId::parse(id.as_str()), Some(id));
        }
        assert_eq!(ProviderId::parse("spotify"), None);
    }
}
