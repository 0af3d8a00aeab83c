//! Detect sidecar cover art files in the same directory as a media file.
//!
//! The collection convention is a `cover.png` next to the tracks; a few
//! other common names are accepted as fallbacks.

use std::path::Path;

use super::CoverImage;

/// Cover filenames in priority order (lowercase for matching)
const COVER_FILENAMES: &[&str] = &["cover", "folder", "album", "front"];

/// Supported image extensions
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Find a sidecar cover art file in the same directory as the media file.
///
/// Returns None if no cover art is found or it cannot be read.
pub fn find_sidecar_cover(media_path: &Path) -> Option<CoverImage> {
    let parent = media_path.parent()?;

    for name in COVER_FILENAMES {
        for ext in IMAGE_EXTENSIONS {
            let cover_path = parent.join(format!("{}.{}", name, ext));
            if cover_path.is_file() {
                let data = std::fs::read(&cover_path).ok()?;
                return Some(CoverImage::from_bytes(data));
            }
        }
    }

    None
}
