//! Image I/O operations service
//!
//! All decoding goes through this service so the byte cap and the
//! header-dimension cap are checked before any pixel data is allocated.

use crate::{
    config::ResourceLimits,
    error::{BgRemovalError, Result},
};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::{io::Cursor, path::Path};

/// Decoded input with the container format it was read from
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Service for guarded decoding and file input/output
pub struct ImageIOService;

impl ImageIOService {
    /// Reject inputs whose encoded size exceeds the byte cap
    ///
    /// # Errors
    /// `InputTooLarge` when `bytes.len() > limits.max_input_bytes`.
    pub fn check_byte_limit(bytes: &[u8], limits: &ResourceLimits) -> Result<()> {
        let actual = bytes.len() as u64;
        if actual > limits.max_input_bytes {
            log::warn!(
                "Rejecting {} byte input (limit {} bytes)",
                actual,
                limits.max_input_bytes
            );
            return Err(BgRemovalError::input_too_large(
                "input bytes",
                actual,
                limits.max_input_bytes,
            ));
        }
        Ok(())
    }

    /// Identify the container and read native dimensions from the header only
    ///
    /// # Errors
    /// - `UnsupportedFormat` for unrecognized or empty input
    /// - `DecodeFailure` for a recognized container with an unreadable header
    pub fn probe(bytes: &[u8]) -> Result<(ImageFormat, (u32, u32))> {
        if bytes.is_empty() {
            return Err(BgRemovalError::unsupported_format("empty input"));
        }

        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader.format().ok_or_else(|| {
            BgRemovalError::unsupported_format("unrecognized image container")
        })?;
        let dimensions = reader.into_dimensions().map_err(Self::map_decode_error)?;
        Ok((format, dimensions))
    }

    /// Decode bytes after enforcing the byte and header-dimension caps
    ///
    /// # Errors
    /// - `InputTooLarge` for the byte cap or an oversized header
    /// - `UnsupportedFormat` for unknown containers or codecs not compiled in
    /// - `DecodeFailure` for corrupt data
    pub fn decode_guarded(bytes: &[u8], limits: &ResourceLimits) -> Result<DecodedImage> {
        Self::check_byte_limit(bytes, limits)?;

        let (format, (width, height)) = Self::probe(bytes)?;
        let native_pixels = u64::from(width) * u64::from(height);
        if native_pixels > limits.max_input_pixels {
            return Err(BgRemovalError::input_too_large(
                "input pixels",
                native_pixels,
                limits.max_input_pixels,
            ));
        }
        if native_pixels == 0 {
            return Err(BgRemovalError::DecodeFailure(ImageError::Limits(
                image::error::LimitError::from_kind(image::error::LimitErrorKind::DimensionError),
            )));
        }

        log::debug!("Decoding {:?} input ({}x{})", format, width, height);
        let image = ImageReader::with_format(Cursor::new(bytes), format)
            .decode()
            .map_err(Self::map_decode_error)?;

        Ok(DecodedImage { image, format })
    }

    // Decoding reads from memory, so an I/O error here means truncated data.
    fn map_decode_error(error: ImageError) -> BgRemovalError {
        match error {
            ImageError::Unsupported(unsupported) => {
                BgRemovalError::unsupported_format(unsupported.to_string())
            },
            other => BgRemovalError::DecodeFailure(other),
        }
    }

    /// Read a whole file into memory
    ///
    /// # Errors
    /// `Io` with the path in its message.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        std::fs::read(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("read image file", path_ref, &e))
    }

    /// Write bytes to a file, creating the parent directory when needed
    ///
    /// # Errors
    /// `Io` with the path in its message.
    pub fn save_bytes<P: AsRef<Path>>(bytes: &[u8], path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BgRemovalError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        std::fs::write(path_ref, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output file", path_ref, &e))
    }

    /// Read an async stream to the end, stopping once it passes the byte cap
    ///
    /// # Errors
    /// - `Io` when the stream fails
    /// - `InputTooLarge` when the stream is longer than `limits.max_input_bytes`
    pub async fn read_all<R: tokio::io::AsyncRead + Unpin>(
        reader: R,
        limits: &ResourceLimits,
    ) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        let mut limited = reader.take(limits.max_input_bytes.saturating_add(1));
        limited.read_to_end(&mut buffer).await?;
        Self::check_byte_limit(&buffer, limits)?;
        Ok(buffer)
    }

    /// Check if a path has an input extension this build can decode
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        let Some(extension) = path.as_ref().extension().and_then(|s| s.to_str()) else {
            return false;
        };
        let Some(format) = ImageFormat::from_extension(extension) else {
            return false;
        };
        format.reading_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([20, 40, 60, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_byte_limit_rejects_before_decoding() {
        let limits = ResourceLimits {
            max_input_bytes: 8,
            ..ResourceLimits::default()
        };
        // Not an image at all; the cap must fire first.
        let err = ImageIOService::decode_guarded(&[0u8; 9], &limits).unwrap_err();
        assert!(matches!(
            err,
            BgRemovalError::InputTooLarge {
                what: "input bytes",
                actual: 9,
                limit: 8
            }
        ));
    }

    #[test]
    fn test_probe_reads_header() {
        let bytes = png_bytes(7, 3);
        let (format, dims) = ImageIOService::probe(&bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(dims, (7, 3));
    }

    #[test]
    fn test_header_pixel_cap() {
        let bytes = png_bytes(20, 20);
        let limits = ResourceLimits {
            max_input_pixels: 399,
            ..ResourceLimits::default()
        };
        let err = ImageIOService::decode_guarded(&bytes, &limits).unwrap_err();
        assert!(matches!(
            err,
            BgRemovalError::InputTooLarge {
                what: "input pixels",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_container_is_unsupported() {
        let err =
            ImageIOService::decode_guarded(b"definitely not an image", &ResourceLimits::default())
                .unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));

        let err = ImageIOService::decode_guarded(&[], &ResourceLimits::default()).unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_truncated_png_is_decode_failure() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(40);
        let err = ImageIOService::decode_guarded(&bytes, &ResourceLimits::default()).unwrap_err();
        assert!(matches!(err, BgRemovalError::DecodeFailure(_)));
    }

    #[test]
    fn test_decode_guarded_success() {
        let bytes = png_bytes(5, 4);
        let decoded = ImageIOService::decode_guarded(&bytes, &ResourceLimits::default()).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!(decoded.image.width(), 5);
        assert_eq!(decoded.image.height(), 4);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let bytes = png_bytes(2, 2);

        ImageIOService::save_bytes(&bytes, &path).unwrap();
        let loaded = ImageIOService::load_file(&path).unwrap();
        assert_eq!(loaded, bytes);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = ImageIOService::load_file("/nonexistent/input.png").unwrap_err();
        assert!(matches!(err, BgRemovalError::Io(_)));
        assert!(err.to_string().contains("/nonexistent/input.png"));
    }

    #[test]
    fn test_is_supported_format() {
        assert!(ImageIOService::is_supported_format("photo.PNG"));
        assert!(ImageIOService::is_supported_format("photo.jpg"));
        assert!(!ImageIOService::is_supported_format("notes.txt"));
        assert!(!ImageIOService::is_supported_format("no_extension"));
    }

    #[tokio::test]
    async fn test_read_all_from_reader() {
        let bytes = png_bytes(3, 3);
        let read = ImageIOService::read_all(Cursor::new(bytes.clone()), &ResourceLimits::default())
            .await
            .unwrap();
        assert_eq!(read, bytes);

        let limits = ResourceLimits {
            max_input_bytes: 10,
            ..ResourceLimits::default()
        };
        let err = ImageIOService::read_all(Cursor::new(vec![0u8; 64]), &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InputTooLarge { actual: 11, .. }));
    }
}
