//! Candidate matching policy for catalog search results.
//!
//! Search results are tried against the source file with a fixed ladder
//! of methods, strictest first. The ladder always starts with exact id
//! equality; the looser text methods are opt-in through config because
//! they can mis-tag covers and re-uploads.

use strsim::normalized_levenshtein;

use super::dto::SearchResult;
use crate::config::YtMusicConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// Candidate's video id equals the file's extracted id
    ExactId,
    /// Case-insensitive title equality
    ExactTitle,
    /// File title contains candidate title or vice versa
    Substring,
    /// Normalized Levenshtein similarity at or above the threshold
    Similarity,
}

/// Methods to try, in order, for the active configuration.
pub fn configured_methods(config: &YtMusicConfig) -> Vec<MatchMethod> {
    let mut methods = vec![MatchMethod::ExactId];
    if config.title_match {
        methods.push(MatchMethod::ExactTitle);
    }
    if config.substring_match {
        methods.push(MatchMethod::Substring);
    }
    if config.similarity_match {
        methods.push(MatchMethod::Similarity);
    }
    methods
}

/// Whether any method beyond exact id matching is enabled. The search
/// pass is pointless without one: every exact-id candidate was already
/// covered by the discography pass.
pub fn fuzzy_enabled(config: &YtMusicConfig) -> bool {
    config.title_match || config.substring_match || config.similarity_match
}

/// First candidate accepted by `method`, if any.
pub fn select<'a>(
    method: MatchMethod,
    candidates: &'a [SearchResult],
    video_id: &str,
    title: &str,
    similarity_threshold: f64,
) -> Option<&'a SearchResult> {
    candidates
        .iter()
        .find(|candidate| accepts(method, candidate, video_id, title, similarity_threshold))
}

fn accepts(
    method: MatchMethod,
    candidate: &SearchResult,
    video_id: &str,
    title: &str,
    similarity_threshold: f64,
) -> bool {
    match method {
        MatchMethod::ExactId => candidate.video_id == video_id,
        MatchMethod::ExactTitle => candidate.title.eq_ignore_ascii_case(title),
        MatchMethod::Substring => {
            let candidate_title = candidate.title.to_lowercase();
            let title = title.to_lowercase();
            candidate_title.contains(&title) || title.contains(&candidate_title)
        }
        MatchMethod::Similarity => {
            // Strictly above: a ratio equal to the threshold is rejected.
            similarity(&candidate.title, title) > similarity_threshold
        }
    }
}

/// Normalized Levenshtein similarity over lowercased titles, in 0..=1.
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}
