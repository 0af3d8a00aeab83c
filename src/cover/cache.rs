//! Cover art disk cache.
//!
//! Binary artwork is cached on disk, not in the response database, because
//! it is large and keyed by its own identifiers: a platform video id for
//! thumbnails, a MusicBrainz release id for archive art, an owner id for
//! channel icons.

use std::fs;
use std::path::{Path, PathBuf};

use super::CoverImage;

/// Cover art disk cache.
#[derive(Clone)]
pub struct CoverCache {
    cache_dir: PathBuf,
}

impl CoverCache {
    /// Create a new cache in the specified directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let _ = fs::create_dir_all(&cache_dir);
        Self { cache_dir }
    }

    /// Get cached cover art by key.
    pub fn get(&self, key: &str) -> Option<CoverImage> {
        let path = self.find(key)?;
        let data = fs::read(&path).ok()?;
        Some(CoverImage::from_bytes(data))
    }

    /// Store cover art under a key. Failures are logged, not fatal; the
    /// cache is an optimization.
    pub fn put(&self, key: &str, cover: &CoverImage) {
        let path = self
            .cache_dir
            .join(format!("{}.{}", sanitize(key), cover.extension()));
        if let Err(e) = fs::write(&path, &cover.data) {
            tracing::warn!("Failed to cache cover art at {:?}: {}", path, e);
        }
    }

    /// Check if a key is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Locate the cached file for a key, whatever its extension.
    fn find(&self, key: &str) -> Option<PathBuf> {
        let stem = sanitize(key);
        for ext in ["png", "jpg", "jpeg", "gif", "webp"] {
            let path = self.cache_dir.join(format!("{}.{}", stem, ext));
            if path.is_file() {
                return Some(path);
            }
        }
        None
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Keys are opaque platform ids; strip anything that is not filename-safe.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path());
        let cover = crate::cover::placeholder(crate::cover::PLACEHOLDER_GREY);

        assert!(!cache.contains("dQw4w9WgXcQ"));
        cache.put("dQw4w9WgXcQ", &cover);
        assert!(cache.contains("dQw4w9WgXcQ"));

        let loaded = cache.get("dQw4w9WgXcQ").unwrap();
        assert_eq!(loaded.data, cover.data);
    }

    #[test]
    fn keys_with_separators_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path());
        let cover = CoverImage::from_bytes(vec![1, 2, 3]);
        cache.put("a/b\\c", &cover);
        assert!(cache.contains("a/b\\c"));
        // No nested directories were created
        assert!(dir.path().join("a").metadata().is_err());
    }
}
