//! Background removal processor
//!
//! `BackgroundRemovalProcessor` composes the stateless stages (governor,
//! region detector, mask generators, fusion, refiner, alpha compositor,
//! encoder) into one job. Every stage reports a progress checkpoint and
//! checks the job's cancellation token before it starts.

use crate::{
    compositor,
    config::ProcessingOptions,
    detection::RegionDetector,
    error::{BgRemovalError, Result},
    fusion::MaskFusionEngine,
    governor,
    masks::{self, MaskGenerator},
    refine::MaskRefiner,
    services::{ImageIOService, OutputFormatHandler, ProcessingStage, ProgressTracker},
    types::{Mask, MaskKind, ProcessingMetadata, ProcessingResult, ProcessingTimings, QualityMetrics},
    utils::LumaPlane,
};
use image::DynamicImage;
use instant::Instant;
use log::{debug, info};
use std::path::Path;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Runs the full removal pipeline for one set of options
///
/// The processor holds no per-image state, so one instance can serve any
/// number of jobs, including concurrently from several threads.
pub struct BackgroundRemovalProcessor {
    options: ProcessingOptions,
    generators: Vec<Box<dyn MaskGenerator>>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<MaskKind> = self.generators.iter().map(|g| g.kind()).collect();
        f.debug_struct("BackgroundRemovalProcessor")
            .field("options", &self.options)
            .field("generators", &kinds)
            .finish()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor with the five default generators
    ///
    /// # Errors
    /// `InvalidConfig` when the options fail validation.
    pub fn new(options: ProcessingOptions) -> Result<Self> {
        Self::with_generators(options, masks::default_generators())
    }

    /// Create a processor with a custom generator set
    ///
    /// # Errors
    /// `InvalidConfig` when the options fail validation or no generator is given.
    pub fn with_generators(
        options: ProcessingOptions,
        generators: Vec<Box<dyn MaskGenerator>>,
    ) -> Result<Self> {
        options.validate()?;
        if generators.is_empty() {
            return Err(BgRemovalError::invalid_config(
                "at least one mask generator is required",
            ));
        }
        Ok(Self {
            options,
            generators,
        })
    }

    #[must_use]
    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Names of the generators this processor runs, in fusion order
    #[must_use]
    pub fn models_used(&self) -> Vec<String> {
        self.generators
            .iter()
            .map(|g| g.kind().name().to_string())
            .collect()
    }

    /// Decode and process encoded image bytes
    ///
    /// # Errors
    /// - `InputTooLarge` for inputs over the byte or pixel caps (nothing is decoded)
    /// - `UnsupportedFormat` / `DecodeFailure` for bad input
    /// - `ProcessingFailure`, `EncodeFailure` or `Cancelled` from later stages
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub fn process_bytes(&self, image_bytes: &[u8]) -> Result<ProcessingResult> {
        let mut tracker = ProgressTracker::new(self.options.progress.clone());
        let result = self.run_from_bytes(image_bytes, &mut tracker);
        if let Err(ref e) = result {
            tracker.report_error(&e.to_string());
        }
        result
    }

    /// Process an already decoded image
    ///
    /// # Errors
    /// Same as [`Self::process_bytes`] minus the decoding failures.
    pub fn process_image(&self, image: &DynamicImage) -> Result<ProcessingResult> {
        let mut tracker = ProgressTracker::new(self.options.progress.clone());
        let result = self.run_from_image(image.clone(), None, &mut tracker, ProcessingTimings::default());
        if let Err(ref e) = result {
            tracker.report_error(&e.to_string());
        }
        result
    }

    /// Read and process an image file
    ///
    /// # Errors
    /// `Io` when the file can't be read, then as [`Self::process_bytes`].
    pub fn process_file<P: AsRef<Path>>(&self, input_path: P) -> Result<ProcessingResult> {
        let bytes = ImageIOService::load_file(input_path.as_ref())?;
        debug!(
            "Loaded {} ({} bytes)",
            input_path.as_ref().display(),
            bytes.len()
        );
        self.process_bytes(&bytes)
    }

    fn run_from_bytes(&self, image_bytes: &[u8], tracker: &mut ProgressTracker) -> Result<ProcessingResult> {
        let cancel = &self.options.cancellation;
        let mut timings = ProcessingTimings::default();

        tracker.report_stage(ProcessingStage::InputValidation);
        cancel.check(ProcessingStage::InputValidation.key())?;
        ImageIOService::check_byte_limit(image_bytes, &self.options.limits)?;

        tracker.report_stage(ProcessingStage::ImageDecoding);
        cancel.check(ProcessingStage::ImageDecoding.key())?;
        let decode_start = Instant::now();
        let decoded = {
            let _span = span!(Level::DEBUG, "decode", bytes = image_bytes.len()).entered();
            ImageIOService::decode_guarded(image_bytes, &self.options.limits)?
        };
        timings.decode_ms = elapsed_ms(decode_start);

        let format = format!("{:?}", decoded.format).to_lowercase();
        self.run_from_image(decoded.image, Some(format), tracker, timings)
    }

    #[allow(clippy::too_many_lines)]
    fn run_from_image(
        &self,
        image: DynamicImage,
        input_format: Option<String>,
        tracker: &mut ProgressTracker,
        mut timings: ProcessingTimings,
    ) -> Result<ProcessingResult> {
        let total_start = Instant::now();
        let options = &self.options;
        let cancel = &options.cancellation;
        let original_dimensions = (image.width(), image.height());

        let native_pixels = u64::from(image.width()) * u64::from(image.height());
        if native_pixels > options.limits.max_input_pixels {
            return Err(BgRemovalError::input_too_large(
                "input pixels",
                native_pixels,
                options.limits.max_input_pixels,
            ));
        }

        trace_info!(
            width = original_dimensions.0,
            height = original_dimensions.1,
            algorithm = %options.primary_algorithm,
            sensitivity = options.sensitivity,
            "Starting background removal"
        );

        // Resize
        tracker.report_stage(ProcessingStage::Resizing);
        cancel.check(ProcessingStage::Resizing.key())?;
        let resize_start = Instant::now();
        let resolution = governor::compute_working_resolution(
            original_dimensions.0,
            original_dimensions.1,
            options,
        )?;
        let working = {
            let _span = span!(
                Level::DEBUG,
                "resize",
                working_width = resolution.working.0,
                working_height = resolution.working.1,
                scale = resolution.scale
            )
            .entered();
            governor::downscale(image.into_rgba8(), &resolution)
        };
        timings.resize_ms = elapsed_ms(resize_start);

        // Region detection
        tracker.report_stage(ProcessingStage::RegionDetection);
        cancel.check(ProcessingStage::RegionDetection.key())?;
        let detection_start = Instant::now();
        let detection = RegionDetector::new(options).detect(&working, cancel)?;
        timings.detection_ms = elapsed_ms(detection_start);
        debug!("Detected {} regions", detection.regions.len());

        // Mask generation
        tracker.report_stage(ProcessingStage::MaskGeneration);
        cancel.check(ProcessingStage::MaskGeneration.key())?;
        let generation_start = Instant::now();
        let plane = LumaPlane::from_rgba(&working);
        let generated = {
            let _span = span!(Level::DEBUG, "mask_generation", generators = self.generators.len()).entered();
            let input = masks::input_for(&working, &plane, &detection, options);
            masks::run_generators(&self.generators, &input, cancel)?
        };
        timings.generation_ms = elapsed_ms(generation_start);

        // Fusion
        tracker.report_stage(ProcessingStage::MaskFusion);
        cancel.check(ProcessingStage::MaskFusion.key())?;
        let fusion_start = Instant::now();
        let fused = {
            let _span = span!(Level::DEBUG, "fusion").entered();
            MaskFusionEngine::new(options.fusion_weights).fuse(&generated)?
        };
        timings.fusion_ms = elapsed_ms(fusion_start);

        // Refinement
        tracker.report_stage(ProcessingStage::Refinement);
        cancel.check(ProcessingStage::Refinement.key())?;
        let refinement_start = Instant::now();
        let refined = MaskRefiner::new(options).refine(&fused.mask)?;
        let edge_fallback;
        let edges = match generated.iter().find(|m| m.kind == MaskKind::Edge) {
            Some(edge) => &edge.mask,
            None => {
                edge_fallback = Mask::filled(refined.width(), refined.height(), Mask::BACKGROUND);
                &edge_fallback
            },
        };
        let quality_metrics: QualityMetrics =
            compositor::quality_metrics(&refined, edges, &detection.subject_mask);
        timings.refinement_ms = elapsed_ms(refinement_start);

        // Alpha compositing and encoding
        tracker.report_stage(ProcessingStage::AlphaCompositing);
        cancel.check(ProcessingStage::AlphaCompositing.key())?;
        let compositing_start = Instant::now();
        let composited = compositor::apply_alpha(working, &refined, &resolution)?;
        timings.compositing_ms = elapsed_ms(compositing_start);

        let encode_start = Instant::now();
        let encoded =
            OutputFormatHandler::encode(&composited.image, options.output_format, options.quality)?;
        timings.encode_ms = elapsed_ms(encode_start);
        timings.total_ms = timings.decode_ms + elapsed_ms(total_start);

        tracker.report_stage(ProcessingStage::Completed);
        tracker.report_completion(timings.clone());

        trace_debug!(
            confidence = fused.confidence,
            edge_accuracy = quality_metrics.edge_accuracy,
            detail_preservation = quality_metrics.detail_preservation,
            background_cleanness = quality_metrics.background_cleanness,
            "Mask quality"
        );
        info!(
            "Processed {}x{} image in {}ms (working {}x{}, confidence {:.2})",
            original_dimensions.0,
            original_dimensions.1,
            timings.total_ms,
            resolution.working.0,
            resolution.working.1,
            fused.confidence
        );

        Ok(ProcessingResult {
            image: composited.image,
            encoded,
            output_format: options.output_format,
            mask: composited.mask,
            confidence: fused.confidence,
            models_used: self.models_used(),
            objects_detected: detection.labels(),
            regions: detection.regions,
            quality_metrics,
            generator_reports: fused.reports,
            metadata: ProcessingMetadata {
                timings,
                original_dimensions,
                working_dimensions: resolution.working,
                scale: resolution.scale,
                input_format,
                primary_algorithm: options.primary_algorithm,
                seed: options.seed,
                processed_at: chrono::Utc::now(),
            },
        })
    }
}
