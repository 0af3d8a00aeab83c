//! Cover artwork plumbing.
//!
//! Every resolved item must leave the pipeline with artwork attached. The
//! sources, in the order providers use them:
//!
//! 1. **Provider-fetched** - thumbnail or release art from the remote API
//! 2. **Sidecar files** - cover.png etc. next to the source file
//! 3. **Placeholder** - a synthesized flat-colour image, never an error
//!
//! Fetched binary art is cached to disk separately from the structured
//! response cache because it is large and keyed differently (release id,
//! video id, owner id).

mod cache;
mod placeholder;
mod sidecar;

pub use cache::CoverCache;
pub use placeholder::{placeholder, PLACEHOLDER_BLACK, PLACEHOLDER_GREY};
pub use sidecar::find_sidecar_cover;

/// Cover artwork bytes plus MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    /// Raw image data (JPEG or PNG)
    pub data: Vec<u8>,
    /// MIME type (image/jpeg, image/png)
    pub mime_type: String,
}

impl CoverImage {
    /// Wrap raw bytes, sniffing the MIME type from the image header.
    /// Unrecognized data is assumed to be JPEG (what thumbnail hosts serve).
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = match image::guess_format(&data) {
            Ok(image::ImageFormat::Png) => "image/png",
            Ok(image::ImageFormat::Gif) => "image/gif",
            Ok(image::ImageFormat::WebP) => "image/webp",
            _ => "image/jpeg",
        };
        Self {
            data,
            mime_type: mime_type.to_string(),
        }
    }

    /// File extension matching the MIME type, for disk caching.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_header() {
        // Minimal PNG signature is enough for format detection
        let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        let cover = CoverImage::from_bytes(png);
        assert_eq!(cover.mime_type, "image/png");
        assert_eq!(cover.extension(), "png");
    }

    #[test]
    fn unknown_bytes_default_to_jpeg() {
        let cover = CoverImage::from_bytes(vec![0, 1, 2, 3]);
        assert_eq!(cover.mime_type, "image/jpeg");
    }
}
