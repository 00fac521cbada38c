use std::borrow::Cow;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
use log::debug;
use serde::Serialize;

use super::error::AnalysisError;

/// Maximum accepted upload size. Prevents OOM on corrupt or adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// JPEG end-of-image marker.
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Side length of the synthetic sample image.
pub const SAMPLE_SIZE: u32 = 512;

/// Gray level of the synthetic sample image.
pub const SAMPLE_GRAY_LEVEL: u8 = 128;

/// Colour representation of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Grayscale,
    Rgb,
}

#[derive(Debug, Clone)]
enum Pixels {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// A decoded raster, immutable once constructed.
///
/// Alpha channels are dropped during decoding; sources without colour
/// information stay single-channel.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: Pixels,
}

impl Image {
    /// Decodes raw PNG or JPEG bytes.
    ///
    /// # Errors
    /// - `Decode` if the input is empty or larger than 50 MiB
    /// - `Decode` if the format is not recognized or the data is corrupt or truncated
    /// - `Decode` if the decoded image has a zero dimension
    pub fn decode(bytes: &[u8]) -> Result<Self, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::Decode("Input is empty".into()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AnalysisError::Decode(format!(
                "Input is too large ({} bytes, max is {})",
                bytes.len(),
                MAX_IMAGE_BYTES
            )));
        }

        let format = image::guess_format(bytes)
            .map_err(|e| AnalysisError::Decode(format!("Unrecognized image format: {}", e)))?;
        debug!("Decoding {} bytes as {:?}", bytes.len(), format);

        // The JPEG backend fills missing scan data with gray instead of failing
        if format == ImageFormat::Jpeg && !has_jpeg_eoi(bytes) {
            return Err(AnalysisError::Decode(
                "JPEG data is truncated (missing end-of-image marker)".into(),
            ));
        }

        let decoded = image::load_from_memory_with_format(bytes, format)?;
        Self::from_dynamic(decoded)
    }

    /// Normalizes an already decoded image into the pipeline's colour modes.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, AnalysisError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AnalysisError::Decode(format!(
                "Image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let pixels = if image.color().has_color() {
            Pixels::Rgb(image.into_rgb8())
        } else {
            Pixels::Gray(image.into_luma8())
        };
        Ok(Self { pixels })
    }

    /// The no-upload fallback: a uniform mid-gray 512x512 grayscale image.
    pub fn sample() -> Self {
        Self {
            pixels: Pixels::Gray(GrayImage::from_pixel(
                SAMPLE_SIZE,
                SAMPLE_SIZE,
                Luma([SAMPLE_GRAY_LEVEL]),
            )),
        }
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.width(),
            Pixels::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.height(),
            Pixels::Rgb(img) => img.height(),
        }
    }

    pub fn color_mode(&self) -> ColorMode {
        match &self.pixels {
            Pixels::Gray(_) => ColorMode::Grayscale,
            Pixels::Rgb(_) => ColorMode::Rgb,
        }
    }

    /// Three-channel view, replicating the luminance channel for grayscale images.
    pub fn to_rgb(&self) -> Cow<'_, RgbImage> {
        match &self.pixels {
            Pixels::Rgb(img) => Cow::Borrowed(img),
            Pixels::Gray(img) => Cow::Owned(DynamicImage::ImageLuma8(img.clone()).into_rgb8()),
        }
    }

    /// Single-channel projection using ITU-R BT.601 luma weights.
    pub fn to_gray(&self) -> Cow<'_, GrayImage> {
        match &self.pixels {
            Pixels::Gray(img) => Cow::Borrowed(img),
            Pixels::Rgb(img) => {
                let mut gray = GrayImage::new(img.width(), img.height());
                for (x, y, p) in img.enumerate_pixels() {
                    gray.put_pixel(x, y, Luma([bt601_luma(p.0)]));
                }
                Cow::Owned(gray)
            }
        }
    }
}

/// True when the last marker, ignoring trailing zero or whitespace padding, is EOI.
fn has_jpeg_eoi(bytes: &[u8]) -> bool {
    let end = bytes
        .iter()
        .rposition(|b| !matches!(b, 0x00 | b' ' | b'\r' | b'\n'))
        .map_or(0, |pos| pos + 1);
    bytes[..end].ends_with(&JPEG_EOI)
}

/// Fixed-point BT.601: L = R*299/1000 + G*587/1000 + B*114/1000, rounded.
fn bt601_luma([r, g, b]: [u8; 3]) -> u8 {
    let weighted = r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000;
    (weighted >> 16) as u8
}
