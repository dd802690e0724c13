//! Image decoder backed by the `image` crate

use contracts::{DecodeError, DecodeHints, Decoder, Fetched, Image, ScaleMode};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError};
use tracing::{debug, warn};

/// Decodes PNG/JPEG/GIF/... into RGBA8 and applies rotation then resize
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    filter: FilterType,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    fn rotate(image: DynamicImage, degrees: f32) -> DynamicImage {
        let quarter_turns = (degrees / 90.0).round() as i64;
        if (quarter_turns as f32 * 90.0 - degrees).abs() > f32::EPSILON {
            warn!(degrees, "Only right-angle rotations are supported, rounding");
        }
        match quarter_turns.rem_euclid(4) {
            1 => image.rotate90(),
            2 => image.rotate180(),
            3 => image.rotate270(),
            _ => image,
        }
    }

    fn resize(&self, image: DynamicImage, width: u32, height: u32, scale: ScaleMode) -> DynamicImage {
        match scale {
            ScaleMode::Fit => image.resize_exact(width, height, self.filter),
            ScaleMode::CenterCrop => image.resize_to_fill(width, height, self.filter),
            ScaleMode::CenterInside => image.resize(width, height, self.filter),
        }
    }
}

impl Decoder for ImageDecoder {
    fn decode(&self, fetched: Fetched, hints: &DecodeHints) -> Result<Image, DecodeError> {
        let mut image = image::load_from_memory(&fetched.bytes).map_err(|e| match e {
            ImageError::Unsupported(_) => DecodeError::UnsupportedFormat,
            other => DecodeError::Malformed(other.to_string()),
        })?;

        if let Some(degrees) = hints.rotation_degrees.filter(|d| *d != 0.0) {
            image = Self::rotate(image, degrees);
        }
        if let Some((width, height)) = hints.resize {
            image = self.resize(image, width, height, hints.scale);
        }

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!(width, height, "Image decoded");
        Ok(Image::new(width, height, rgba.into_raw()))
    }
}
