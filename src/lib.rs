#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

//! # Heuristic Background Removal
//!
//! Background segmentation and compositing for raster images without a
//! trained model. Five classical heuristics (multi-scale edges, spatial
//! color clustering, local binary patterns, gradient flow and a
//! skin/body/hair/clothing/object region cascade) each classify every pixel,
//! and a confidence-weighted fusion turns them into one opacity mask.
//!
//! ## Features
//!
//! - **Deterministic**: a fixed default seed; equal bytes and options give
//!   bit-identical masks
//! - **Bounded**: byte, pixel and memory ceilings checked before decoding
//! - **Parallel**: generators run concurrently on the rayon pool
//! - **Compositing**: solid color, gradient, blurred or image backgrounds
//!   with an optional drop shadow
//! - **Async and Sync APIs**: tokio wrappers move the work to the blocking pool
//! - **CLI Integration**: enable the `cli` feature for the `heuristic-bgremove` binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heuristic_bgremove::{remove_background, ProcessingOptions, PrimaryAlgorithm};
//!
//! # fn example(bytes: &[u8]) -> anyhow::Result<()> {
//! let options = ProcessingOptions::builder()
//!     .primary_algorithm(PrimaryAlgorithm::Portrait)
//!     .sensitivity(40)
//!     .build()?;
//! let result = remove_background(bytes, &options)?;
//! result.save("subject.png")?;
//! println!("confidence {:.2}", result.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, tracing subscriber and progress bars
//! - `webp-support` (default): lossless WebP output
//! - `tracing-json`: JSON log output for the CLI

pub mod background;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod detection;
pub mod error;
pub mod fusion;
pub mod governor;
pub mod masks;
pub mod processor;
pub mod refine;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

pub use background::compose_image;
pub use config::{
    BackgroundConfig, BackgroundKind, CompositingOptions, DetectionThresholds, FusionWeights,
    GeneratorTuning, OutputFormat, PrimaryAlgorithm, ProcessingOptions, ProcessingOptionsBuilder,
    ResourceLimits,
};
pub use error::{BgRemovalError, Result};
pub use governor::WorkingResolution;
pub use masks::MaskGenerator;
pub use processor::BackgroundRemovalProcessor;
pub use services::{
    CallbackProgressReporter, CancellationToken, ConsoleProgressReporter, ImageIOService,
    NoOpProgressReporter, OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressTracker,
    ProgressUpdate,
};
pub use types::{
    DetectionResult, GeneratorReport, Mask, MaskKind, ObjectCategory, ProcessingMetadata,
    ProcessingResult, ProcessingTimings, QualityMetrics, Rect, Region, RegionKind,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from encoded image bytes
///
/// Builds a [`BackgroundRemovalProcessor`] for `options` and runs one job.
///
/// # Errors
/// See [`BackgroundRemovalProcessor::process_bytes`].
pub fn remove_background(image_bytes: &[u8], options: &ProcessingOptions) -> Result<ProcessingResult> {
    BackgroundRemovalProcessor::new(options.clone())?.process_bytes(image_bytes)
}

/// Composite a transparent subject onto a new background
///
/// `subject_bytes` is an encoded image (normally the PNG or WebP produced by
/// [`remove_background`]); the result is encoded with
/// `options.output_format`.
///
/// # Errors
/// Decode, configuration and encode failures.
pub fn compose_background(
    subject_bytes: &[u8],
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<Vec<u8>> {
    background::compose_background(subject_bytes, config, options)
}

/// Composite a raw RGBA8 subject (the `Rgba8` output of [`remove_background`])
///
/// # Errors
/// `InvalidConfig` when `subject_rgba` is not `width * height * 4` bytes,
/// then as [`compose_background`].
pub fn compose_background_raw(
    subject_rgba: &[u8],
    width: u32,
    height: u32,
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<Vec<u8>> {
    background::compose_background_raw(subject_rgba, width, height, config, options)
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| BgRemovalError::stage("blocking_task", e))?
}

/// Remove the background from image bytes on the tokio blocking pool
///
/// # Examples
/// ```rust,no_run
/// use heuristic_bgremove::{remove_background_from_bytes, ProcessingOptions};
///
/// # async fn example(bytes: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_background_from_bytes(bytes, &ProcessingOptions::default()).await?;
/// result.save("output.png")?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// See [`remove_background`].
pub async fn remove_background_from_bytes(
    image_bytes: Vec<u8>,
    options: &ProcessingOptions,
) -> Result<ProcessingResult> {
    let options = options.clone();
    run_blocking(move || remove_background(&image_bytes, &options)).await
}

/// Read an async stream to the end and remove the background
///
/// The byte cap is enforced while reading, so an oversized stream is
/// rejected without being buffered in full.
///
/// # Errors
/// `Io` for stream failures, then as [`remove_background`].
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    options: &ProcessingOptions,
) -> Result<ProcessingResult> {
    let bytes = ImageIOService::read_all(reader, &options.limits).await?;
    remove_background_from_bytes(bytes, options).await
}

/// Async [`compose_background`] on the tokio blocking pool
///
/// # Errors
/// See [`compose_background`].
pub async fn compose_background_from_bytes(
    subject_bytes: Vec<u8>,
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<Vec<u8>> {
    let config = config.clone();
    let options = *options;
    run_blocking(move || compose_background(&subject_bytes, &config, &options)).await
}
