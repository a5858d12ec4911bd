//! Confidence-weighted mask fusion

use crate::{
    config::FusionWeights,
    error::{BgRemovalError, Result},
    types::{GeneratedMask, GeneratorReport, Mask, MaskKind},
};
use rayon::prelude::*;

/// Fused mask plus the effective weight each generator received
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub mask: Mask,
    pub reports: Vec<GeneratorReport>,
    /// Weighted mean of the generator confidences
    pub confidence: f32,
}

pub struct MaskFusionEngine {
    weights: FusionWeights,
}

impl MaskFusionEngine {
    #[must_use]
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    fn base_weight(&self, kind: MaskKind) -> f32 {
        match kind {
            MaskKind::Edge => self.weights.edge,
            MaskKind::Color => self.weights.color,
            MaskKind::Texture => self.weights.texture,
            MaskKind::Gradient => self.weights.gradient,
            MaskKind::Object => self.weights.object,
        }
    }

    /// Base weights rescaled by `0.5 + confidence` and renormalized to 1
    ///
    /// # Errors
    /// Stage `fusion` when every effective weight is zero.
    pub fn effective_weights(&self, masks: &[GeneratedMask]) -> Result<Vec<f32>> {
        let raw: Vec<f32> = masks
            .iter()
            .map(|m| (self.base_weight(m.kind) * (0.5 + m.confidence.clamp(0.0, 1.0))).max(0.0))
            .collect();
        let total: f32 = raw.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(BgRemovalError::processing_stage_error(
                "fusion",
                "fusion weights sum to zero",
                Some(&format!("{} masks", masks.len())),
            ));
        }
        Ok(raw.into_iter().map(|w| w / total).collect())
    }

    /// Per-pixel weighted average of `masks`, rounded to the nearest value
    ///
    /// # Errors
    /// Stage `fusion` for an empty mask set, mismatched dimensions or zero
    /// total weight.
    pub fn fuse(&self, masks: &[GeneratedMask]) -> Result<FusionOutcome> {
        let first = masks.first().ok_or_else(|| {
            BgRemovalError::processing_stage_error("fusion", "no masks to fuse", None)
        })?;
        let (width, height) = first.mask.dimensions();
        if let Some(odd) = masks.iter().find(|m| m.mask.dimensions() != (width, height)) {
            return Err(BgRemovalError::processing_stage_error(
                "fusion",
                &format!(
                    "{} mask is {}x{}",
                    odd.kind.name(),
                    odd.mask.width(),
                    odd.mask.height()
                ),
                Some(&format!("expected {width}x{height}")),
            ));
        }

        let weights = self.effective_weights(masks)?;
        let sources: Vec<&[u8]> = masks.iter().map(|m| m.mask.as_slice()).collect();

        let mut data = vec![0u8; width as usize * height as usize];
        data.par_iter_mut().enumerate().for_each(|(i, value)| {
            let sum: f32 = sources
                .iter()
                .zip(&weights)
                .map(|(source, w)| f32::from(source[i]) * w)
                .sum();
            *value = sum.round().clamp(0.0, 255.0) as u8;
        });

        let confidence = masks
            .iter()
            .zip(&weights)
            .map(|(m, w)| m.confidence * w)
            .sum::<f32>()
            .clamp(0.0, 1.0);

        let reports = masks
            .iter()
            .zip(&weights)
            .map(|(m, &weight)| GeneratorReport {
                kind: m.kind,
                confidence: m.confidence,
                weight,
                auxiliary: m.auxiliary,
            })
            .collect();

        log::debug!(
            "Fused {} masks into {}x{} (confidence {:.3})",
            masks.len(),
            width,
            height,
            confidence
        );

        Ok(FusionOutcome {
            mask: Mask::from_raw(width, height, data)?,
            reports,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(kind: MaskKind, value: u8, confidence: f32) -> GeneratedMask {
        GeneratedMask {
            kind,
            mask: Mask::filled(4, 4, value),
            confidence,
            auxiliary: None,
        }
    }

    #[test]
    fn test_weights_renormalize() {
        let engine = MaskFusionEngine::new(FusionWeights::default());
        let masks: Vec<GeneratedMask> = MaskKind::ALL
            .iter()
            .map(|&kind| generated(kind, 0, 0.5))
            .collect();
        let weights = engine.effective_weights(&masks).unwrap();
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        // Equal confidence keeps the base proportions.
        assert!((weights[0] - 0.25).abs() < 1e-5);
        assert!((weights[2] - 0.15).abs() < 1e-5);
    }

    #[test]
    fn test_confidence_shifts_weight() {
        let engine = MaskFusionEngine::new(FusionWeights::default());
        let masks = vec![
            generated(MaskKind::Edge, 0, 1.0),
            generated(MaskKind::Color, 255, 0.0),
        ];
        // 0.25 * 1.5 vs 0.25 * 0.5: edge carries three quarters.
        let outcome = engine.fuse(&masks).unwrap();
        assert_eq!(outcome.mask.get(0, 0), 64);
        assert!((outcome.reports[0].weight - 0.75).abs() < 1e-5);
        assert!((outcome.confidence - 0.75).abs() < 1e-5);
    }

    #[test]
    fn test_zero_weights_fail() {
        let engine = MaskFusionEngine::new(FusionWeights {
            edge: 0.0,
            color: 0.0,
            texture: 0.0,
            gradient: 0.0,
            object: 0.0,
        });
        let err = engine.fuse(&[generated(MaskKind::Edge, 0, 1.0)]).unwrap_err();
        assert_eq!(err.stage_name(), Some("fusion"));
    }

    #[test]
    fn test_mismatched_masks_fail() {
        let engine = MaskFusionEngine::new(FusionWeights::default());
        let mut odd = generated(MaskKind::Color, 0, 1.0);
        odd.mask = Mask::filled(2, 2, 0);
        let err = engine
            .fuse(&[generated(MaskKind::Edge, 0, 1.0), odd])
            .unwrap_err();
        assert_eq!(err.stage_name(), Some("fusion"));
        assert!(engine.fuse(&[]).is_err());
    }
}
