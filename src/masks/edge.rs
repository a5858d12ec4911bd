//! Multi-scale Sobel edge mask

use super::{sensitivity_scaled, GeneratorInput, MaskGenerator, MaskOutput};
use crate::{
    error::Result,
    types::{Mask, MaskKind},
    utils::LumaPlane,
};
use rayon::prelude::*;

const SCALES: [u32; 3] = [1, 2, 3];

/// Strong multi-scale gradients mark subject boundaries
pub struct EdgeMaskGenerator;

/// Edge strength combining Sobel at tap offsets 1-3 with weights `1/scale`
#[must_use]
pub fn multi_scale_strength(plane: &LumaPlane) -> Vec<f32> {
    let width = plane.width() as usize;
    let mut out = vec![0.0f32; width * plane.height() as usize];
    if width == 0 {
        return out;
    }
    let weight_sum: f32 = SCALES.iter().map(|&s| 1.0 / s as f32).sum();

    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, value) in row.iter_mut().enumerate() {
            let mut total = 0.0;
            for &scale in &SCALES {
                let (gx, gy) = plane.sobel(x as u32, y as u32, i64::from(scale));
                total += (gx * gx + gy * gy).sqrt() / 4.0 / scale as f32;
            }
            *value = total / weight_sum;
        }
    });
    out
}

impl MaskGenerator for EdgeMaskGenerator {
    fn kind(&self) -> MaskKind {
        MaskKind::Edge
    }

    fn generate(&self, input: &GeneratorInput<'_>) -> Result<MaskOutput> {
        let threshold = sensitivity_scaled(input.tuning.edge_base_threshold, input.sensitivity);
        let strength = multi_scale_strength(input.plane);
        let data = strength
            .iter()
            .map(|&s| if s > threshold { Mask::FOREGROUND } else { Mask::BACKGROUND })
            .collect();

        let (width, height) = input.image.dimensions();
        Ok(Mask::from_raw(width, height, data)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_step_strength_decays_with_distance() {
        let image = RgbaImage::from_fn(20, 5, |x, _| {
            if x < 10 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        });
        let strength = multi_scale_strength(&LumaPlane::from_rgba(&image));
        let row = &strength[2 * 20..3 * 20];

        // Adjacent to the step every scale sees the full contrast.
        assert!((row[9] - 200.0).abs() < 1.0);
        assert!(row[9] > row[8]);
        assert!(row[8] > row[7]);
        assert!(row[0].abs() < 1e-3);
    }

    #[test]
    fn test_flat_image_is_background() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        let strength = multi_scale_strength(&LumaPlane::from_rgba(&image));
        assert!(strength.iter().all(|&s| s < 35.0));
    }
}
