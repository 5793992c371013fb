//! Profile image encoding
//!
//! Images travel through the database as base64 text of a JPEG. Encoding is
//! lossy (JPEG at a configurable quality). Decoding never fails loudly: any
//! malformed record is treated as "no image".

use crate::errors::{CoreError, CoreResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GenericImageView};
use tracing::debug;

/// Highest JPEG quality, used for profile pictures by default
pub const MAX_JPEG_QUALITY: u8 = 100;

/// A decoded picture (avatar)
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileImage(DynamicImage);

impl ProfileImage {
    pub fn new(image: DynamicImage) -> Self {
        Self(image)
    }

    /// Decode any supported image file format
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        image::load_from_memory(bytes)
            .map(Self)
            .map_err(|e| CoreError::DecodeFailure(e.to_string()))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.0
    }

    pub fn into_inner(self) -> DynamicImage {
        self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }
}

impl From<DynamicImage> for ProfileImage {
    fn from(image: DynamicImage) -> Self {
        Self(image)
    }
}

/// Compress to JPEG at `quality` (1-100) and base64 the bytes
pub fn encode_profile_image(image: &ProfileImage, quality: u8) -> CoreResult<String> {
    let flattened = match image.0.color() {
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => {
            DynamicImage::ImageLuma8(image.0.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(image.0.to_rgb8()),
    };

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, MAX_JPEG_QUALITY));
    flattened
        .write_with_encoder(encoder)
        .map_err(|e| CoreError::Serialization(format!("JPEG encoding failed: {}", e)))?;

    Ok(STANDARD.encode(&bytes))
}

/// Decode a stored image, reporting why it failed
///
/// Line breaks and other whitespace inside the base64 text are ignored;
/// records written by line-wrapping encoders contain them.
pub fn try_decode_profile_image(encoded: &str) -> CoreResult<ProfileImage> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(CoreError::DecodeFailure("empty image".to_string()));
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CoreError::DecodeFailure(format!("invalid base64: {}", e)))?;
    ProfileImage::from_bytes(&bytes)
}

/// Decode a stored image, `None` if it is malformed
pub fn decode_profile_image(encoded: &str) -> Option<ProfileImage> {
    match try_decode_profile_image(encoded) {
        Ok(image) => Some(image),
        Err(e) => {
            debug!(error = %e, "Treating undecodable image as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use proptest::prelude::*;

    fn gray(width: u32, height: u32, level: u8) -> ProfileImage {
        ProfileImage::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            width,
            height,
            Luma([level]),
        )))
    }

    #[test]
    fn test_uniform_image_round_trips_exactly() {
        let original = gray(16, 16, 128);
        let encoded = encode_profile_image(&original, MAX_JPEG_QUALITY).unwrap();
        let decoded = decode_profile_image(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_color_image_round_trip_is_close() {
        let original = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 90]));
        let encoded =
            encode_profile_image(&ProfileImage::new(DynamicImage::ImageRgb8(original.clone())), 100)
                .unwrap();
        let decoded = decode_profile_image(&encoded).unwrap();

        assert_eq!(decoded.dimensions(), (32, 24));
        let decoded = decoded.image().to_rgb8();
        for (a, b) in original.pixels().zip(decoded.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i16 - b[c] as i16).abs() <= 24, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_line_wrapped_base64_accepted() {
        let encoded = encode_profile_image(&gray(8, 8, 128), 100).unwrap();
        let wrapped: String = encoded
            .as_bytes()
            .chunks(76)
            .map(|chunk| format!("{}\n", std::str::from_utf8(chunk).unwrap()))
            .collect();
        assert!(decode_profile_image(&wrapped).is_some());
    }

    #[test]
    fn test_garbage_is_absent() {
        assert!(decode_profile_image("").is_none());
        assert!(decode_profile_image("not base64 at all!").is_none());
        // valid base64, not an image
        assert!(decode_profile_image("aGVsbG8gd29ybGQ=").is_none());
        assert!(matches!(
            try_decode_profile_image("aGVsbG8gd29ybGQ="),
            Err(CoreError::DecodeFailure(_))
        ));
    }

    proptest! {
        #[test]
        fn decode_never_panics(input in ".*") {
            let _ = decode_profile_image(&input);
        }

        #[test]
        fn decode_of_random_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_profile_image(&STANDARD.encode(&bytes));
        }
    }
}
