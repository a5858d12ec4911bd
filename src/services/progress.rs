//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.
//! Reporting is observational only: a job produces identical output whether
//! or not a reporter is attached.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Progress stages of one background removal job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Checking byte size and header dimensions
    InputValidation,
    /// Decoding the input container
    ImageDecoding,
    /// Computing the working resolution and downscaling
    Resizing,
    /// Running the skin, body, hair, clothing and object detectors
    RegionDetection,
    /// Running the five mask generators
    MaskGeneration,
    /// Confidence-weighted fusion of the generator masks
    MaskFusion,
    /// Morphology, feathering and detail preservation
    Refinement,
    /// Writing alpha, upsampling and encoding the output
    AlphaCompositing,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::InputValidation => "Validating input",
            ProcessingStage::ImageDecoding => "Decoding image",
            ProcessingStage::Resizing => "Preparing working resolution",
            ProcessingStage::RegionDetection => "Detecting subject regions",
            ProcessingStage::MaskGeneration => "Generating heuristic masks",
            ProcessingStage::MaskFusion => "Fusing masks",
            ProcessingStage::Refinement => "Refining mask",
            ProcessingStage::AlphaCompositing => "Applying transparency",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the progress checkpoint for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::InputValidation => 5,
            ProcessingStage::ImageDecoding => 15,
            ProcessingStage::Resizing => 25,
            ProcessingStage::RegionDetection => 45,
            ProcessingStage::MaskGeneration => 55,
            ProcessingStage::MaskFusion => 70,
            ProcessingStage::Refinement => 85,
            ProcessingStage::AlphaCompositing => 95,
            ProcessingStage::Completed => 100,
        }
    }

    /// Short stage key used in errors and cancellation reports
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            ProcessingStage::InputValidation => "input_validation",
            ProcessingStage::ImageDecoding => "decode",
            ProcessingStage::Resizing => "resize",
            ProcessingStage::RegionDetection => "region_detection",
            ProcessingStage::MaskGeneration => "mask_generation",
            ProcessingStage::MaskFusion => "fusion",
            ProcessingStage::Refinement => "refinement",
            ProcessingStage::AlphaCompositing => "alpha_compositing",
            ProcessingStage::Completed => "completed",
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during background removal operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("✅ Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Decode: {}ms", timings.decode_ms);
            log::info!("    • Region detection: {}ms", timings.detection_ms);
            log::info!("    • Mask generation: {}ms", timings.generation_ms);
            log::info!("    • Fusion: {}ms", timings.fusion_ms);
            log::info!("    • Refinement: {}ms", timings.refinement_ms);
            log::info!("    • Compositing: {}ms", timings.compositing_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

type ProgressCallback = dyn Fn(u8, &str) + Send + Sync;

/// Reporter that forwards `(percent, stage description)` to a closure
pub struct CallbackProgressReporter {
    callback: Box<ProgressCallback>,
}

impl CallbackProgressReporter {
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u8, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl ProgressReporter for CallbackProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        (self.callback)(update.progress, &update.description);
    }

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Shareable, optional progress reporter carried by `ProcessingOptions`
#[derive(Clone, Default)]
pub struct ProgressHandle(Option<Arc<dyn ProgressReporter>>);

impl ProgressHandle {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self(Some(reporter))
    }

    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.is_some()
    }

    fn reporter(&self) -> Option<&dyn ProgressReporter> {
        self.0.as_deref()
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProgressHandle")
            .field(&if self.is_attached() { "attached" } else { "none" })
            .finish()
    }
}

impl PartialEq for ProgressHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

/// Progress tracker that owns the job start instant and forwards to the reporter
pub struct ProgressTracker {
    handle: ProgressHandle,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter handle
    #[must_use]
    pub fn new(handle: ProgressHandle) -> Self {
        Self {
            handle,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        if let Some(reporter) = self.handle.reporter() {
            reporter.report_progress(ProgressUpdate::new(stage, self.start_time));
        }
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: ProcessingTimings) {
        if let Some(reporter) = self.handle.reporter() {
            reporter.report_completion(timings);
        }
    }

    /// Report an error during processing
    pub fn report_error(&self, error: &str) {
        let stage = self
            .current_stage
            .unwrap_or(ProcessingStage::InputValidation);
        if let Some(reporter) = self.handle.reporter() {
            reporter.report_error(stage, error);
        }
    }
}
