//! Configuration types for background removal and compositing operations

use crate::{
    error::BgRemovalError,
    services::{CancellationToken, ProgressHandle, ProgressReporter},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Seed used for color-cluster initialization unless the caller overrides it
pub const DEFAULT_SEED: u64 = 0x0005_EED0_2024;

/// Default sensitivity (10-100)
pub const DEFAULT_SENSITIVITY: u8 = 25;

/// Default feathering search radius in pixels
pub const DEFAULT_FEATHER_RADIUS: f32 = 15.0;

/// Heuristic selection for the region detector and refiner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryAlgorithm {
    /// Run the people cascade and the generic object detectors
    #[default]
    Auto,
    /// People cascade only (face, body, hair, clothing)
    Portrait,
    /// Generic object detectors only
    Object,
    /// Everything, with dense sampling and hole-filling closing
    Precise,
}

impl PrimaryAlgorithm {
    #[must_use]
    pub fn runs_people_cascade(self) -> bool {
        !matches!(self, Self::Object)
    }

    #[must_use]
    pub fn runs_object_detectors(self) -> bool {
        !matches!(self, Self::Portrait)
    }
}

impl std::fmt::Display for PrimaryAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Portrait => write!(f, "portrait"),
            Self::Object => write!(f, "object"),
            Self::Precise => write!(f, "precise"),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// WebP with alpha channel transparency (lossless)
    WebP,
    /// Raw RGBA8 pixel data (4 bytes per pixel)
    Rgba8,
}

/// Hard resource ceilings enforced by the dimension governor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Largest accepted encoded input, checked before decoding
    pub max_input_bytes: u64,
    /// Largest accepted native pixel count, checked from the header
    pub max_input_pixels: u64,
    /// Working-resolution pixel ceiling
    pub max_safe_pixels: u64,
    /// Memory ceiling for `width * height * 4 * pass_count`
    pub memory_ceiling_bytes: u64,
    /// Number of full-size RGBA-equivalent buffers a job keeps alive
    pub pass_count: u32,
}

impl ResourceLimits {
    pub const DEFAULT_MAX_INPUT_BYTES: u64 = 20 * 1024 * 1024;
    pub const DEFAULT_MAX_INPUT_PIXELS: u64 = 100_000_000;
    pub const DEFAULT_MAX_SAFE_PIXELS: u64 = 2048 * 2048;
    pub const DEFAULT_MEMORY_CEILING_BYTES: u64 = 100 * 1024 * 1024;
    pub const DEFAULT_PASS_COUNT: u32 = 8;
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: Self::DEFAULT_MAX_INPUT_BYTES,
            max_input_pixels: Self::DEFAULT_MAX_INPUT_PIXELS,
            max_safe_pixels: Self::DEFAULT_MAX_SAFE_PIXELS,
            memory_ceiling_bytes: Self::DEFAULT_MEMORY_CEILING_BYTES,
            pass_count: Self::DEFAULT_PASS_COUNT,
        }
    }
}

/// Base fusion weights, rescaled per job by each generator's confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub edge: f32,
    pub color: f32,
    pub texture: f32,
    pub gradient: f32,
    pub object: f32,
}

impl FusionWeights {
    pub const EDGE: f32 = 0.25;
    pub const COLOR: f32 = 0.25;
    pub const TEXTURE: f32 = 0.15;
    pub const GRADIENT: f32 = 0.15;
    pub const OBJECT: f32 = 0.20;

    #[must_use]
    pub fn total(&self) -> f32 {
        self.edge + self.color + self.texture + self.gradient + self.object
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            edge: Self::EDGE,
            color: Self::COLOR,
            texture: Self::TEXTURE,
            gradient: Self::GRADIENT,
            object: Self::OBJECT,
        }
    }
}

/// Thresholds for the region detector cascade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// Sampling stride for skin classification (`precise` forces 1)
    pub skin_stride: u32,
    /// A skin sample joins a cluster within this many pixels of a member
    pub skin_cluster_radius: u32,
    /// Minimum number of stride samples for a face cluster
    pub min_face_samples: usize,
    /// Minimum mean skin score for a face cluster
    pub min_face_confidence: f32,
    /// Regions larger than this share of the image are treated as background
    pub max_region_share: f32,
    /// Body box width as a multiple of face width
    pub body_width_factor: f32,
    /// Body box height as a multiple of face height
    pub body_height_factor: f32,
    /// Minimum fraction of validating samples for a body region
    pub min_body_confidence: f32,
    /// Saturation band (0-1) of a clothing-like body sample
    pub body_saturation_range: (f32, f32),
    /// Brightness band (0-255) of a clothing-like body sample
    pub body_brightness_range: (f32, f32),
    /// Hair pixels are at most this bright (0-255 luminance)
    pub hair_max_brightness: f32,
    /// Hair pixels are at most this saturated (0-1)
    pub hair_max_saturation: f32,
    /// Hair pixels have at least this 5x5 luminance variance
    pub hair_min_variance: f32,
    /// Minimum number of hair pixels for a hair region
    pub min_hair_pixels: usize,
    /// Clothing pixels are at least this saturated (0-1)
    pub clothing_min_saturation: f32,
    /// Color distance for the clothing uniformity count
    pub clothing_color_distance: f32,
    /// Minimum share of uniform neighbors for a clothing pixel
    pub clothing_min_uniformity: f32,
    /// Minimum number of clothing pixels for a clothing region
    pub min_clothing_pixels: usize,
    /// Minimum edge strength for the product detector
    pub object_edge_threshold: f32,
    /// Minimum 5x5 variance for the animal detector
    pub animal_min_variance: f32,
    /// Green must exceed red and blue by this much for the plant detector
    pub plant_green_margin: f32,
    /// Minimum component size for generic objects, as a share of the image
    pub min_object_share: f32,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            skin_stride: 2,
            skin_cluster_radius: 4,
            min_face_samples: 24,
            min_face_confidence: 0.45,
            max_region_share: 0.6,
            body_width_factor: 3.0,
            body_height_factor: 6.0,
            min_body_confidence: 0.3,
            body_saturation_range: (0.08, 0.95),
            body_brightness_range: (25.0, 235.0),
            hair_max_brightness: 90.0,
            hair_max_saturation: 0.45,
            hair_min_variance: 40.0,
            min_hair_pixels: 16,
            clothing_min_saturation: 0.25,
            clothing_color_distance: 30.0,
            clothing_min_uniformity: 0.6,
            min_clothing_pixels: 32,
            object_edge_threshold: 30.0,
            animal_min_variance: 250.0,
            plant_green_margin: 20.0,
            min_object_share: 0.01,
        }
    }
}

/// Tuning constants for the mask generators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneratorTuning {
    /// Edge strength threshold at sensitivity 0, scaled down as sensitivity rises
    pub edge_base_threshold: f32,
    /// Number of k-means clusters
    pub kmeans_clusters: usize,
    /// Weight of normalized spatial distance in k-means assignment
    pub kmeans_spatial_weight: f32,
    /// Iteration cap for k-means
    pub kmeans_iterations: usize,
    /// Sample budget for k-means (pixels are strided to fit)
    pub kmeans_max_samples: usize,
    /// Clusters scoring at least this share of the best score are background
    pub background_cluster_ratio: f32,
    /// Base color distance for background classification
    pub color_base_distance: f32,
    /// LBP transition score below which a pixel is low texture
    pub texture_threshold: f32,
    /// Gradient magnitude at sensitivity 0 below which a pixel is background
    pub gradient_base_threshold: f32,
}

impl Default for GeneratorTuning {
    fn default() -> Self {
        Self {
            edge_base_threshold: 40.0,
            kmeans_clusters: 8,
            kmeans_spatial_weight: 0.3,
            kmeans_iterations: 12,
            kmeans_max_samples: 4096,
            background_cluster_ratio: 0.6,
            color_base_distance: 30.0,
            texture_threshold: 0.3,
            gradient_base_threshold: 20.0,
        }
    }
}

/// Configuration for one background removal job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Which detector families and refinement profile to use
    pub primary_algorithm: PrimaryAlgorithm,

    /// Sensitivity (10-100); higher values classify more pixels as subject
    pub sensitivity: u8,

    /// Feathering search radius in pixels, `None` disables feathering
    pub edge_feathering: Option<f32>,

    /// Detail-preservation strength (0-1), `None` disables it
    pub detail_preservation: Option<f32>,

    /// Number of closing iterations after the opening pass (0-10)
    pub smoothing_level: u8,

    /// Optional caller ceiling on the working resolution
    pub max_dimensions: Option<(u32, u32)>,

    /// Halve the pixel and memory ceilings
    pub memory_optimized: bool,

    /// Output format
    pub output_format: OutputFormat,

    /// Output quality (10-100, used by lossy encoders)
    pub quality: u8,

    /// Seed for color-cluster initialization
    pub seed: u64,

    /// Resource ceilings
    pub limits: ResourceLimits,

    /// Base fusion weights
    pub fusion_weights: FusionWeights,

    /// Region detector thresholds
    pub thresholds: DetectionThresholds,

    /// Mask generator constants
    pub tuning: GeneratorTuning,

    /// Optional progress observer
    #[serde(skip)]
    pub progress: ProgressHandle,

    /// Cooperative cancellation flag
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            primary_algorithm: PrimaryAlgorithm::default(),
            sensitivity: DEFAULT_SENSITIVITY,
            edge_feathering: Some(DEFAULT_FEATHER_RADIUS),
            detail_preservation: Some(0.5),
            smoothing_level: 1,
            max_dimensions: None,
            memory_optimized: false,
            output_format: OutputFormat::default(),
            quality: 90,
            seed: DEFAULT_SEED,
            limits: ResourceLimits::default(),
            fusion_weights: FusionWeights::default(),
            thresholds: DetectionThresholds::default(),
            tuning: GeneratorTuning::default(),
            progress: ProgressHandle::default(),
            cancellation: CancellationToken::default(),
        }
    }
}

impl ProcessingOptions {
    /// Create a new options builder for fluent construction
    ///
    /// ```rust
    /// use heuristic_bgremove::{ProcessingOptions, PrimaryAlgorithm, OutputFormat};
    ///
    /// let options = ProcessingOptions::builder()
    ///     .primary_algorithm(PrimaryAlgorithm::Portrait)
    ///     .sensitivity(40)
    ///     .output_format(OutputFormat::WebP)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(options.sensitivity, 40);
    /// ```
    #[must_use]
    pub fn builder() -> ProcessingOptionsBuilder {
        ProcessingOptionsBuilder::default()
    }

    /// Sensitivity mapped to `[0.1, 1.0]`
    #[must_use]
    pub fn sensitivity_factor(&self) -> f32 {
        f32::from(self.sensitivity.clamp(10, 100)) / 100.0
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Sensitivity or quality outside 10-100
    /// - Smoothing level above 10
    /// - Feather radius outside 1-64 or detail strength outside 0-1
    /// - Zero max dimensions, zero limits, or degenerate fusion weights
    pub fn validate(&self) -> crate::Result<()> {
        if !(10..=100).contains(&self.sensitivity) {
            return Err(BgRemovalError::config_value_error(
                "sensitivity",
                self.sensitivity,
                "10-100",
                Some(DEFAULT_SENSITIVITY),
            ));
        }

        if !(10..=100).contains(&self.quality) {
            return Err(BgRemovalError::config_value_error(
                "quality",
                self.quality,
                "10-100",
                Some(90),
            ));
        }

        if self.smoothing_level > 10 {
            return Err(BgRemovalError::config_value_error(
                "smoothing level",
                self.smoothing_level,
                "0-10",
                Some(1),
            ));
        }

        if let Some(radius) = self.edge_feathering {
            if !(1.0..=64.0).contains(&radius) {
                return Err(BgRemovalError::config_value_error(
                    "feather radius",
                    radius,
                    "1-64",
                    Some(DEFAULT_FEATHER_RADIUS),
                ));
            }
        }

        if let Some(strength) = self.detail_preservation {
            if !(0.0..=1.0).contains(&strength) {
                return Err(BgRemovalError::config_value_error(
                    "detail preservation",
                    strength,
                    "0-1",
                    Some(0.5),
                ));
            }
        }

        if let Some((width, height)) = self.max_dimensions {
            if width == 0 || height == 0 {
                return Err(BgRemovalError::invalid_config(
                    "max dimensions must be at least 1x1",
                ));
            }
        }

        let limits = &self.limits;
        if limits.max_input_bytes == 0
            || limits.max_input_pixels == 0
            || limits.max_safe_pixels == 0
            || limits.memory_ceiling_bytes == 0
            || limits.pass_count == 0
        {
            return Err(BgRemovalError::invalid_config(
                "resource limits must all be non-zero",
            ));
        }

        let weights = &self.fusion_weights;
        let all_weights = [
            weights.edge,
            weights.color,
            weights.texture,
            weights.gradient,
            weights.object,
        ];
        if all_weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.total() <= 0.0 {
            return Err(BgRemovalError::invalid_config(
                "fusion weights must be finite, non-negative and sum to more than zero",
            ));
        }

        if self.tuning.kmeans_clusters == 0 || self.tuning.kmeans_iterations == 0 {
            return Err(BgRemovalError::invalid_config(
                "k-means needs at least one cluster and one iteration",
            ));
        }

        if self.thresholds.skin_stride == 0 {
            return Err(BgRemovalError::invalid_config(
                "skin sampling stride must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Builder for `ProcessingOptions`
#[derive(Debug, Default)]
pub struct ProcessingOptionsBuilder {
    options: ProcessingOptions,
}

impl ProcessingOptionsBuilder {
    #[must_use]
    pub fn primary_algorithm(mut self, algorithm: PrimaryAlgorithm) -> Self {
        self.options.primary_algorithm = algorithm;
        self
    }

    /// Set sensitivity, clamped to 10-100
    #[must_use]
    pub fn sensitivity(mut self, sensitivity: u8) -> Self {
        self.options.sensitivity = sensitivity.clamp(10, 100);
        self
    }

    /// Enable feathering with the given search radius
    #[must_use]
    pub fn edge_feathering(mut self, radius: f32) -> Self {
        self.options.edge_feathering = Some(radius);
        self
    }

    #[must_use]
    pub fn disable_feathering(mut self) -> Self {
        self.options.edge_feathering = None;
        self
    }

    /// Enable detail preservation, strength clamped to 0-1
    #[must_use]
    pub fn detail_preservation(mut self, strength: f32) -> Self {
        self.options.detail_preservation = Some(strength.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn disable_detail_preservation(mut self) -> Self {
        self.options.detail_preservation = None;
        self
    }

    /// Set smoothing level, clamped to 0-10
    #[must_use]
    pub fn smoothing_level(mut self, level: u8) -> Self {
        self.options.smoothing_level = level.min(10);
        self
    }

    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.options.max_dimensions = Some((width, height));
        self
    }

    #[must_use]
    pub fn memory_optimized(mut self, enabled: bool) -> Self {
        self.options.memory_optimized = enabled;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.options.output_format = format;
        self
    }

    /// Set output quality, clamped to 10-100
    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.options.quality = quality.clamp(10, 100);
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.options.limits = limits;
        self
    }

    /// Override only the encoded-size cap
    #[must_use]
    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.options.limits.max_input_bytes = bytes;
        self
    }

    #[must_use]
    pub fn fusion_weights(mut self, weights: FusionWeights) -> Self {
        self.options.fusion_weights = weights;
        self
    }

    #[must_use]
    pub fn thresholds(mut self, thresholds: DetectionThresholds) -> Self {
        self.options.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn tuning(mut self, tuning: GeneratorTuning) -> Self {
        self.options.tuning = tuning;
        self
    }

    /// Attach a progress observer
    #[must_use]
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.options.progress = ProgressHandle::new(reporter);
        self
    }

    /// Attach a `fn(percent, stage)` style callback
    #[must_use]
    pub fn progress_callback<F>(self, callback: F) -> Self
    where
        F: Fn(u8, &str) + Send + Sync + 'static,
    {
        self.progress_reporter(Arc::new(crate::services::CallbackProgressReporter::new(
            callback,
        )))
    }

    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = token;
        self
    }

    /// Build and validate the options
    ///
    /// # Errors
    /// Any violation reported by [`ProcessingOptions::validate`].
    pub fn build(self) -> crate::Result<ProcessingOptions> {
        let options = self.options;
        options.validate()?;
        Ok(options)
    }
}

/// Kind of background drawn behind the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    #[default]
    Transparent,
    Color,
    Gradient,
    Blur,
    Image,
}

/// Background description for the compositor
///
/// `value` is interpreted per kind: a hex color for `Color`, gradient stops
/// (`"#c1,#c2[,...][;angle]"`) for `Gradient`, ignored for `Transparent` and
/// `Blur`, and a free-form reference label for `Image` (the pixels come from
/// `image_data`). For `Blur`, `image_data` holds the original pre-removal
/// image; without it the subject's own color channels are blurred.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackgroundConfig {
    pub kind: BackgroundKind,
    pub value: String,
    /// Gaussian sigma for `Blur`
    pub blur_amount: Option<f32>,
    /// Encoded background image for `Image`, original image for `Blur`
    #[serde(skip)]
    pub image_data: Option<Vec<u8>>,
}

impl BackgroundConfig {
    #[must_use]
    pub fn transparent() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn color<S: Into<String>>(hex: S) -> Self {
        Self {
            kind: BackgroundKind::Color,
            value: hex.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn gradient<S: Into<String>>(stops: S) -> Self {
        Self {
            kind: BackgroundKind::Gradient,
            value: stops.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn blur(amount: f32) -> Self {
        Self {
            kind: BackgroundKind::Blur,
            blur_amount: Some(amount),
            ..Self::default()
        }
    }

    /// Attach encoded image bytes (the original photo for `Blur`)
    #[must_use]
    pub fn with_image_data(mut self, data: Vec<u8>) -> Self {
        self.image_data = Some(data);
        self
    }

    #[must_use]
    pub fn image<S: Into<String>>(reference: S, data: Vec<u8>) -> Self {
        Self {
            kind: BackgroundKind::Image,
            value: reference.into(),
            image_data: Some(data),
            ..Self::default()
        }
    }
}

/// Options for the background compositor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositingOptions {
    /// Shadow opacity (0-1); 0 disables the shadow
    pub shadow_intensity: f32,
    /// Shadow offset in pixels (x, y)
    pub shadow_offset: (i32, i32),
    /// Gaussian sigma used to soften the shadow
    pub shadow_softness: f32,
    /// Output quality (10-100)
    pub quality: u8,
    /// Output format of the composed image
    pub output_format: OutputFormat,
    /// Caps applied when decoding the subject and any background image
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl Default for CompositingOptions {
    fn default() -> Self {
        Self {
            shadow_intensity: 0.0,
            shadow_offset: (0, 0),
            shadow_softness: 6.0,
            quality: 90,
            output_format: OutputFormat::Png,
            limits: ResourceLimits::default(),
        }
    }
}

impl CompositingOptions {
    /// Validate compositing parameters
    ///
    /// # Errors
    /// Shadow intensity outside 0-1, negative softness, quality outside
    /// 10-100, zero input limits.
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.shadow_intensity) {
            return Err(BgRemovalError::config_value_error(
                "shadow intensity",
                self.shadow_intensity,
                "0-1",
                Some(0.5),
            ));
        }
        if !self.shadow_softness.is_finite() || self.shadow_softness < 0.0 {
            return Err(BgRemovalError::config_value_error(
                "shadow softness",
                self.shadow_softness,
                ">= 0",
                Some(6.0),
            ));
        }
        if !(10..=100).contains(&self.quality) {
            return Err(BgRemovalError::config_value_error(
                "quality",
                self.quality,
                "10-100",
                Some(90),
            ));
        }
        if self.limits.max_input_bytes == 0 || self.limits.max_input_pixels == 0 {
            return Err(BgRemovalError::invalid_config(
                "compositing input limits must be non-zero",
            ));
        }
        Ok(())
    }
}
