//! Mask generators
//!
//! Five independent generators each classify every working pixel as
//! foreground (0) or background (255). They run concurrently on the rayon
//! pool and are joined, in a fixed order, before fusion.

pub mod color;
pub mod edge;
pub mod gradient;
pub mod object;
pub mod texture;

use crate::{
    config::{GeneratorTuning, ProcessingOptions},
    error::{BgRemovalError, Result},
    services::CancellationToken,
    types::{DetectionResult, GeneratedMask, Mask, MaskKind},
    utils::LumaPlane,
};
use image::RgbaImage;
use tracing::{debug as trace_debug, span, Level};

/// Everything a generator may read; shared immutably across tasks
pub struct GeneratorInput<'a> {
    pub image: &'a RgbaImage,
    pub plane: &'a LumaPlane,
    pub detection: &'a DetectionResult,
    /// Sensitivity mapped to `[0.1, 1.0]`
    pub sensitivity: f32,
    pub tuning: &'a GeneratorTuning,
    pub seed: u64,
}

/// A generator's classification plus its optional side signal
#[derive(Debug, Clone)]
pub struct MaskOutput {
    pub mask: Mask,
    pub auxiliary: Option<f32>,
}

impl From<Mask> for MaskOutput {
    fn from(mask: Mask) -> Self {
        Self {
            mask,
            auxiliary: None,
        }
    }
}

/// One heuristic background-likelihood mask
pub trait MaskGenerator: Send + Sync {
    fn kind(&self) -> MaskKind;

    /// Produce a mask with the working buffer's dimensions
    ///
    /// # Errors
    /// Implementations report internal inconsistencies as stage failures.
    fn generate(&self, input: &GeneratorInput<'_>) -> Result<MaskOutput>;
}

/// The five generators in fusion order
#[must_use]
pub fn default_generators() -> Vec<Box<dyn MaskGenerator>> {
    vec![
        Box::new(edge::EdgeMaskGenerator),
        Box::new(color::ColorClusterMaskGenerator),
        Box::new(texture::TextureMaskGenerator),
        Box::new(gradient::GradientFlowMaskGenerator),
        Box::new(object::ObjectMaskGenerator),
    ]
}

/// Build the generator input for a job
#[must_use]
pub fn input_for<'a>(
    image: &'a RgbaImage,
    plane: &'a LumaPlane,
    detection: &'a DetectionResult,
    options: &'a ProcessingOptions,
) -> GeneratorInput<'a> {
    GeneratorInput {
        image,
        plane,
        detection,
        sensitivity: options.sensitivity_factor(),
        tuning: &options.tuning,
        seed: options.seed,
    }
}

/// Run every generator on the rayon pool and score them against the subject mask
///
/// Results come back in the order of `generators` regardless of which task
/// finishes first.
///
/// # Errors
/// - `Cancelled` when the token is set before a generator starts
/// - `ProcessingFailure` at stage `mask_generation` for generator failures
pub fn run_generators(
    generators: &[Box<dyn MaskGenerator>],
    input: &GeneratorInput<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<GeneratedMask>> {
    let mut slots: Vec<Option<Result<GeneratedMask>>> = generators.iter().map(|_| None).collect();

    rayon::scope(|scope| {
        for (slot, generator) in slots.iter_mut().zip(generators) {
            scope.spawn(move |_| {
                *slot = Some(run_one(generator.as_ref(), input, cancel));
            });
        }
    });

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(BgRemovalError::processing_stage_error(
                    "mask_generation",
                    "generator task did not complete",
                    None,
                ))
            })
        })
        .collect()
}

fn run_one(
    generator: &dyn MaskGenerator,
    input: &GeneratorInput<'_>,
    cancel: &CancellationToken,
) -> Result<GeneratedMask> {
    cancel.check("mask_generation")?;

    let kind = generator.kind();
    let _span = span!(Level::DEBUG, "mask_generator", generator = kind.name()).entered();

    let output = generator.generate(input)?;
    let expected = input.image.dimensions();
    if output.mask.dimensions() != expected {
        return Err(BgRemovalError::processing_stage_error(
            "mask_generation",
            &format!(
                "{} generator produced a {}x{} mask",
                kind.name(),
                output.mask.width(),
                output.mask.height()
            ),
            Some(&format!("{}x{} working buffer", expected.0, expected.1)),
        ));
    }

    let confidence = balanced_agreement(&output.mask, &input.detection.subject_mask);
    trace_debug!(generator = kind.name(), confidence, "mask generated");

    Ok(GeneratedMask {
        kind,
        mask: output.mask,
        confidence,
        auxiliary: output.auxiliary,
    })
}

/// Agreement of a mask's binary classification with the subject mask
///
/// Mean of the per-class match rates (subject foreground predicted
/// foreground, subject background predicted background). A class absent
/// from the subject mask is left out of the mean.
#[must_use]
pub fn balanced_agreement(mask: &Mask, subject: &Mask) -> f32 {
    let mut fg_total = 0u64;
    let mut fg_match = 0u64;
    let mut bg_total = 0u64;
    let mut bg_match = 0u64;

    for (&value, &reference) in mask.as_slice().iter().zip(subject.as_slice()) {
        let predicted_bg = value >= Mask::MIDPOINT;
        if reference >= Mask::MIDPOINT {
            bg_total += 1;
            bg_match += u64::from(predicted_bg);
        } else {
            fg_total += 1;
            fg_match += u64::from(!predicted_bg);
        }
    }

    let rates: Vec<f32> = [(fg_match, fg_total), (bg_match, bg_total)]
        .iter()
        .filter(|(_, total)| *total > 0)
        .map(|&(hits, total)| hits as f32 / total as f32)
        .collect();

    if rates.is_empty() {
        0.5
    } else {
        rates.iter().sum::<f32>() / rates.len() as f32
    }
}

/// Threshold shrinking linearly to half its base as sensitivity rises to 1
#[inline]
pub(crate) fn sensitivity_scaled(base: f32, sensitivity: f32) -> f32 {
    base * (1.0 - 0.5 * sensitivity.clamp(0.0, 1.0))
}
