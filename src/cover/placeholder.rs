//! Synthesized placeholder artwork.
//!
//! A missing cover is never an error: when nothing supplies art we emit a
//! flat-colour 1000x1000 PNG so downstream tag writing always has an image.

use image::{ImageBuffer, Rgba};

use super::CoverImage;

/// Neutral grey used when a file simply has no art.
pub const PLACEHOLDER_GREY: [u8; 4] = [0x52, 0x52, 0x52, 0xff];

/// Black, used by the fingerprint provider's allow-missing-cover mode.
pub const PLACEHOLDER_BLACK: [u8; 4] = [0x00, 0x00, 0x00, 0xff];

const PLACEHOLDER_SIZE: u32 = 1000;

/// Synthesize a flat-colour square placeholder encoded as PNG.
pub fn placeholder(rgba: [u8; 4]) -> CoverImage {
    let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, Rgba(rgba));

    let mut data = Vec::new();
    buffer
        .write_to(
            &mut std::io::Cursor::new(&mut data),
            image::ImageFormat::Png,
        )
        .expect("encoding an in-memory PNG cannot fail");

    CoverImage {
        data,
        mime_type: "image/png".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_decodable_png() {
        let cover = placeholder(PLACEHOLDER_GREY);
        assert_eq!(cover.mime_type, "image/png");
        let decoded = image::load_from_memory(&cover.data).unwrap();
        assert_eq!(decoded.width(), PLACEHOLDER_SIZE);
        assert_eq!(decoded.height(), PLACEHOLDER_SIZE);
    }
}
