//! Dimension governor
//!
//! Picks the working resolution for a job so that the pixel count and the
//! estimated buffer memory stay under their ceilings.

use crate::{
    config::{ProcessingOptions, ResourceLimits},
    error::{BgRemovalError, Result},
};
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};

/// Native and working resolution of one job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingResolution {
    pub original: (u32, u32),
    pub working: (u32, u32),
    /// Uniform scale factor (`<= 1`) applied before flooring
    pub scale: f32,
}

impl WorkingResolution {
    #[must_use]
    pub fn is_downscaled(&self) -> bool {
        self.working != self.original
    }

    #[must_use]
    pub fn working_pixels(&self) -> u64 {
        u64::from(self.working.0) * u64::from(self.working.1)
    }
}

/// Effective pixel ceiling after the memory estimate and `memory_optimized`
#[must_use]
pub fn pixel_ceiling(limits: &ResourceLimits, memory_optimized: bool) -> u64 {
    let divisor = if memory_optimized { 2 } else { 1 };
    let safe_pixels = limits.max_safe_pixels / divisor;
    let memory_bytes = limits.memory_ceiling_bytes / divisor;
    let bytes_per_pixel = 4 * u64::from(limits.pass_count.max(1));
    let memory_pixels = memory_bytes / bytes_per_pixel;

    safe_pixels.min(memory_pixels).max(1)
}

/// Compute the working resolution for a `width x height` input
///
/// # Errors
/// `ProcessingFailure` at stage `resize` for a zero-sized input.
pub fn compute_working_resolution(
    width: u32,
    height: u32,
    options: &ProcessingOptions,
) -> Result<WorkingResolution> {
    if width == 0 || height == 0 {
        return Err(BgRemovalError::processing_stage_error(
            "resize",
            "input has a zero dimension",
            Some(&format!("{width}x{height}")),
        ));
    }

    let ceiling = pixel_ceiling(&options.limits, options.memory_optimized);
    let native_pixels = u64::from(width) * u64::from(height);

    let mut scale = 1.0f64;
    if native_pixels > ceiling {
        scale = scale.min((ceiling as f64 / native_pixels as f64).sqrt());
    }
    if let Some((max_width, max_height)) = options.max_dimensions {
        scale = scale
            .min(f64::from(max_width) / f64::from(width))
            .min(f64::from(max_height) / f64::from(height));
    }

    let (mut new_width, mut new_height) = if scale < 1.0 {
        (
            ((f64::from(width) * scale).floor() as u32).max(1),
            ((f64::from(height) * scale).floor() as u32).max(1),
        )
    } else {
        (width, height)
    };

    // Flooring to one pixel on a thin axis can leave the other axis too long.
    if u64::from(new_width) * u64::from(new_height) > ceiling {
        if new_width >= new_height {
            new_width = (ceiling / u64::from(new_height)).max(1) as u32;
        } else {
            new_height = (ceiling / u64::from(new_width)).max(1) as u32;
        }
    }
    if let Some((max_width, max_height)) = options.max_dimensions {
        new_width = new_width.min(max_width.max(1));
        new_height = new_height.min(max_height.max(1));
    }

    let resolution = WorkingResolution {
        original: (width, height),
        working: (new_width, new_height),
        scale: scale as f32,
    };

    if resolution.is_downscaled() {
        log::info!(
            "Downscaling {}x{} to {}x{} (scale {:.3}, ceiling {} px)",
            width,
            height,
            new_width,
            new_height,
            scale,
            ceiling
        );
    }

    Ok(resolution)
}

/// Resample `image` to the working resolution (Triangle filter)
#[must_use]
pub fn downscale(image: RgbaImage, resolution: &WorkingResolution) -> RgbaImage {
    if !resolution.is_downscaled() {
        return image;
    }
    let (width, height) = resolution.working;
    imageops::resize(&image, width, height, imageops::FilterType::Triangle)
}
