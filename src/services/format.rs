//! Output format handling service
//!
//! Serializes RGBA buffers into the supported output containers.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, RgbaImage};

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA buffer into the requested format
    ///
    /// `quality` is accepted for every format; PNG and WebP (lossless) ignore it.
    ///
    /// # Errors
    /// - `EncodeFailure` when the underlying encoder fails
    /// - `UnsupportedFormat` when WebP support is not compiled in
    pub fn encode(image: &RgbaImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        log::debug!(
            "Encoding {}x{} buffer as {} (quality {})",
            width,
            height,
            Self::get_extension(format),
            quality
        );

        match format {
            OutputFormat::Png => {
                let mut buffer = Vec::new();
                PngEncoder::new(&mut buffer)
                    .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                    .map_err(BgRemovalError::EncodeFailure)?;
                Ok(buffer)
            },
            OutputFormat::WebP => Self::encode_webp(image),
            OutputFormat::Rgba8 => Ok(image.as_raw().clone()),
        }
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(image: &RgbaImage) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        let mut buffer = Vec::new();
        image::codecs::webp::WebPEncoder::new_lossless(&mut buffer)
            .encode(image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(BgRemovalError::EncodeFailure)?;
        Ok(buffer)
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(_image: &RgbaImage) -> Result<Vec<u8>> {
        Err(BgRemovalError::unsupported_format(
            "WebP output requires the webp-support feature",
        ))
    }

    /// Get the file extension for a format
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Rgba8 => "raw",
        }
    }
}
