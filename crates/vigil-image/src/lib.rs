//! Pixel buffers and codec helpers for the inspection pipeline.
//!
//! Decoding turns on-disk or in-memory image bytes into [`Image`] buffers
//! (mono stays mono, everything else lands as 3-channel BGR). Encoding
//! produces the JPEG archive frames the persistence worker writes.

pub mod error;
pub mod types;

pub use error::ImageError;
pub use types::Image;

use crates_image::{DynamicImage, ImageEncoder};

/// Decode an image from raw bytes; the container format is auto-detected.
///
/// Single-channel sources decode to mono, all color sources are
/// converted to 8-bit BGR.
pub fn decode_image(data: &[u8]) -> Result<Image, ImageError> {
    let decoded = crates_image::load_from_memory(data)?;
    match decoded {
        DynamicImage::ImageLuma8(buf) => {
            let (width, height) = buf.dimensions();
            Image::new(width, height, 1, buf.into_raw())
        }
        other => {
            let rgb = other.to_rgb8();
            let (width, height) = rgb.dimensions();
            let mut data = rgb.into_raw();
            swap_red_blue(&mut data);
            Image::new(width, height, 3, data)
        }
    }
}

/// Encode an image as JPEG with the given quality (1-100).
pub fn encode_jpeg(image: &Image, quality: u8) -> Result<Vec<u8>, ImageError> {
    let (color, data): (crates_image::ExtendedColorType, Vec<u8>) = if image.is_color() {
        let mut rgb = image.as_bytes().to_vec();
        swap_red_blue(&mut rgb);
        (crates_image::ExtendedColorType::Rgb8, rgb)
    } else {
        (crates_image::ExtendedColorType::L8, image.as_bytes().to_vec())
    };

    let mut out = Vec::new();
    let encoder = crates_image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(&data, image.width(), image.height(), color)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out)
}

/// In-place BGR <-> RGB reorder of an interleaved 3-channel buffer.
fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}
