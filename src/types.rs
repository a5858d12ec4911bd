//! Core types for masks, detected regions and processing results

use crate::{
    config::{OutputFormat, PrimaryAlgorithm},
    error::{BgRemovalError, Result},
    services::{ImageIOService, OutputFormatHandler},
};
use chrono::{DateTime, Utc};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Single-channel opacity mask aligned with a pixel buffer
///
/// `0` marks foreground (keep) and `255` marks background (remove).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    pub const FOREGROUND: u8 = 0;
    pub const BACKGROUND: u8 = 255;
    /// Values below this are treated as foreground when a mask is binarized
    pub const MIDPOINT: u8 = 128;

    /// Create a mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Wrap existing data
    ///
    /// # Errors
    /// `InvalidConfig` when `data.len() != width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(BgRemovalError::invalid_config(format!(
                "mask data has {} values, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Set every pixel inside `rect` to `value`
    pub fn fill_rect(&mut self, rect: Rect, value: u8) {
        let rect = rect.clamp_to(self.width, self.height);
        let width = self.width as usize;
        for y in rect.y..rect.bottom() {
            let row = y as usize * width;
            self.data[row + rect.x as usize..row + rect.right() as usize].fill(value);
        }
    }

    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.get(x, y) < Self::MIDPOINT
    }

    /// Share of pixels classified as foreground (value < 128)
    #[must_use]
    pub fn foreground_share(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let count = self.data.iter().filter(|&&v| v < Self::MIDPOINT).count();
        count as f32 / self.data.len() as f32
    }

    /// Convert to a grayscale image (for resampling and saving)
    #[must_use]
    pub fn to_gray_image(&self) -> GrayImage {
        // Dimensions and length are kept in sync by every constructor.
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    #[must_use]
    pub fn from_gray_image(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning the inclusive corner points
    #[must_use]
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x.saturating_sub(min_x) + 1,
            height: max_y.saturating_sub(min_y) + 1,
        }
    }

    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersect with the `width x height` image frame
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.right().min(width) - x,
            height: self.bottom().min(height) - y,
        }
    }

    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Kind of a detected subject region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Face,
    Body,
    Hair,
    Clothing,
    Object,
}

impl std::fmt::Display for RegionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Face => "face",
            Self::Body => "body",
            Self::Hair => "hair",
            Self::Clothing => "clothing",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Diagnostic label for generic object regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    Product,
    Animal,
    Plant,
}

impl std::fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Product => "product",
            Self::Animal => "animal",
            Self::Plant => "plant",
        };
        f.write_str(name)
    }
}

/// A detected subject region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
    pub bounds: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ObjectCategory>,
}

impl Region {
    #[must_use]
    pub fn new(kind: RegionKind, confidence: f32, bounds: Rect) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            bounds,
            category: None,
        }
    }

    #[must_use]
    pub fn object(category: ObjectCategory, confidence: f32, bounds: Rect) -> Self {
        Self {
            category: Some(category),
            ..Self::new(RegionKind::Object, confidence, bounds)
        }
    }

    /// Label used in `objects_detected`
    #[must_use]
    pub fn label(&self) -> String {
        match self.category {
            Some(category) => category.to_string(),
            None => self.kind.to_string(),
        }
    }
}

/// Output of the region detector; read-only downstream
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// 255 everywhere except inside region bounds (0)
    pub subject_mask: Mask,
    pub regions: Vec<Region>,
    /// Bounding boxes of the border-connected un-stamped components
    pub background_regions: Vec<Rect>,
}

impl DetectionResult {
    pub fn regions_of(&self, kind: RegionKind) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.kind == kind)
    }

    /// Distinct labels of all regions, in detection order
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for region in &self.regions {
            let label = region.label();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }
}

/// The five heuristic mask families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskKind {
    Edge,
    Color,
    Texture,
    Gradient,
    Object,
}

impl MaskKind {
    pub const ALL: [MaskKind; 5] = [
        MaskKind::Edge,
        MaskKind::Color,
        MaskKind::Texture,
        MaskKind::Gradient,
        MaskKind::Object,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::Color => "color",
            Self::Texture => "texture",
            Self::Gradient => "gradient",
            Self::Object => "object",
        }
    }
}

/// A generator's mask together with its confidence
#[derive(Debug, Clone)]
pub struct GeneratedMask {
    pub kind: MaskKind,
    pub mask: Mask,
    /// Agreement with the detector's subject mask, in `[0, 1]`
    pub confidence: f32,
    /// Generator-specific side signal (gradient direction coherence)
    pub auxiliary: Option<f32>,
}

/// Per-generator diagnostics exposed on the result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneratorReport {
    pub kind: MaskKind,
    pub confidence: f32,
    /// Normalized fusion weight actually applied
    pub weight: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<f32>,
}

/// Heuristic quality estimates of the final mask
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Share of mask boundary pixels that coincide with detected edges
    pub edge_accuracy: f32,
    /// Share of detected subject pixels kept as foreground
    pub detail_preservation: f32,
    /// Share of background pixels that are fully (>= 240) transparent
    pub background_cleanness: f32,
}

/// Per-stage timing breakdown in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub resize_ms: u64,
    pub detection_ms: u64,
    pub generation_ms: u64,
    pub fusion_ms: u64,
    pub refinement_ms: u64,
    pub compositing_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

/// Processing metadata and statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub timings: ProcessingTimings,
    pub original_dimensions: (u32, u32),
    pub working_dimensions: (u32, u32),
    pub scale: f32,
    /// Container format of the input, when it came from bytes
    pub input_format: Option<String>,
    pub primary_algorithm: PrimaryAlgorithm,
    pub seed: u64,
    pub processed_at: DateTime<Utc>,
}

/// Result of a background removal job
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// RGBA output at the original resolution
    pub image: RgbaImage,
    /// `image` serialized in `output_format`
    pub encoded: Vec<u8>,
    pub output_format: OutputFormat,
    /// Final refined mask at the original resolution (0 = foreground)
    pub mask: Mask,
    /// Fusion-weighted mean of generator confidences
    pub confidence: f32,
    /// Names of the mask generators that contributed
    pub models_used: Vec<String>,
    /// Distinct labels of detected regions, such as `"face"` or `"product"`
    ///
    /// Labels only; the detected regions themselves are in [`Self::regions`].
    pub objects_detected: Vec<String>,
    /// Every detected region with bounds and confidence, in detection order
    pub regions: Vec<Region>,
    pub quality_metrics: QualityMetrics,
    pub generator_reports: Vec<GeneratorReport>,
    pub metadata: ProcessingMetadata,
}

impl ProcessingResult {
    /// Re-encode the output image
    ///
    /// # Errors
    /// `EncodeFailure` or `UnsupportedFormat` from the encoder.
    pub fn to_bytes(&self, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        if format == self.output_format {
            return Ok(self.encoded.clone());
        }
        OutputFormatHandler::encode(&self.image, format, quality)
    }

    /// Write the encoded output to `path`
    ///
    /// # Errors
    /// `Io` when the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageIOService::save_bytes(&self.encoded, path)
    }

    /// Write the final mask as a grayscale PNG (white = foreground)
    ///
    /// # Errors
    /// `EncodeFailure` or `Io`.
    pub fn save_mask<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut alpha = self.mask.to_gray_image();
        for value in alpha.pixels_mut() {
            value.0[0] = 255 - value.0[0];
        }
        let mut bytes = Vec::new();
        alpha
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(BgRemovalError::EncodeFailure)?;
        ImageIOService::save_bytes(&bytes, path)
    }

    /// Output dimensions (always the original input resolution)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_from_raw_checks_length() {
        assert!(Mask::from_raw(2, 2, vec![0; 4]).is_ok());
        assert!(Mask::from_raw(2, 2, vec![0; 5]).is_err());
    }

    #[test]
    fn test_mask_fill_rect_clamps() {
        let mut mask = Mask::filled(4, 4, Mask::BACKGROUND);
        mask.fill_rect(Rect::new(2, 2, 10, 10), Mask::FOREGROUND);

        assert_eq!(mask.get(1, 1), 255);
        assert_eq!(mask.get(2, 2), 0);
        assert_eq!(mask.get(3, 3), 0);
        assert!((mask.foreground_share() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mask_gray_image_round_trip() {
        let mask = Mask::from_raw(3, 1, vec![0, 128, 255]).unwrap();
        let gray = mask.to_gray_image();
        assert_eq!(gray.get_pixel(1, 0).0[0], 128);
        assert_eq!(Mask::from_gray_image(gray), mask);
    }

    #[test]
    fn test_rect_geometry() {
        let rect = Rect::from_corners(2, 3, 5, 4);
        assert_eq!(rect, Rect::new(2, 3, 4, 2));
        assert_eq!(rect.right(), 6);
        assert_eq!(rect.bottom(), 5);
        assert_eq!(rect.area(), 8);
        assert!(rect.contains(5, 4));
        assert!(!rect.contains(6, 4));

        let clamped = Rect::new(8, 8, 10, 10).clamp_to(10, 9);
        assert_eq!(clamped, Rect::new(8, 8, 2, 1));
        assert!(clamped.fits_within(10, 9));

        let outside = Rect::new(20, 20, 5, 5).clamp_to(10, 10);
        assert!(outside.is_empty());
    }

    #[test]
    fn test_region_labels() {
        let face = Region::new(RegionKind::Face, 1.4, Rect::new(0, 0, 2, 2));
        assert_eq!(face.confidence, 1.0);
        assert_eq!(face.label(), "face");

        let plant = Region::object(ObjectCategory::Plant, 0.4, Rect::new(0, 0, 2, 2));
        assert_eq!(plant.label(), "plant");

        let detection = DetectionResult {
            subject_mask: Mask::filled(2, 2, 0),
            regions: vec![face, plant, face],
            background_regions: Vec::new(),
        };
        assert_eq!(detection.labels(), vec!["face", "plant"]);
        assert_eq!(detection.regions_of(RegionKind::Face).count(), 2);
    }

    #[test]
    fn test_generator_report_serde() {
        let report = GeneratorReport {
            kind: MaskKind::Gradient,
            confidence: 0.5,
            weight: 0.2,
            auxiliary: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"kind":"gradient","confidence":0.5,"weight":0.2}"#);
    }
}
