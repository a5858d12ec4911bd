//! Gradient-flow mask over a 5x5 inverse-distance neighborhood

use super::{sensitivity_scaled, GeneratorInput, MaskGenerator, MaskOutput};
use crate::{
    error::Result,
    types::{Mask, MaskKind},
    utils::LumaPlane,
};
use rayon::prelude::*;

/// Offsets of the 5x5 window with `(dx/d^2, dy/d^2)` weights precomputed
struct Kernel {
    taps: Vec<(i64, i64, f32, f32)>,
    norm_x: f32,
    norm_y: f32,
}

impl Kernel {
    fn new() -> Self {
        let mut taps = Vec::with_capacity(24);
        let mut norm_x = 0.0;
        let mut norm_y = 0.0;
        for dy in -2i64..=2 {
            for dx in -2i64..=2 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                // Inverse-distance weight times the unit direction component.
                let d2 = (dx * dx + dy * dy) as f32;
                let wx = dx as f32 / d2;
                let wy = dy as f32 / d2;
                norm_x += wx * dx as f32;
                norm_y += wy * dy as f32;
                taps.push((dx, dy, wx, wy));
            }
        }
        Self {
            taps,
            norm_x,
            norm_y,
        }
    }

    /// Gradient in luminance units per pixel
    fn apply(&self, plane: &LumaPlane, x: u32, y: u32) -> (f32, f32) {
        let center = plane.get(x, y);
        let (x, y) = (i64::from(x), i64::from(y));
        let (mut gx, mut gy) = (0.0, 0.0);
        for &(dx, dy, wx, wy) in &self.taps {
            let diff = plane.get_clamped(x + dx, y + dy) - center;
            gx += wx * diff;
            gy += wy * diff;
        }
        (gx / self.norm_x, gy / self.norm_y)
    }
}

/// Per-pixel gradient vectors
#[must_use]
pub fn gradient_field(plane: &LumaPlane) -> Vec<(f32, f32)> {
    let kernel = Kernel::new();
    let width = plane.width() as usize;
    let mut out = vec![(0.0f32, 0.0f32); width * plane.height() as usize];
    if width == 0 {
        return out;
    }
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, value) in row.iter_mut().enumerate() {
            *value = kernel.apply(plane, x as u32, y as u32);
        }
    });
    out
}

/// Mean cosine between each strong gradient and its 3x3 neighbors, in `[0, 1]`
///
/// Returns `None` when no pixel has a gradient at or above `min_magnitude`.
#[must_use]
pub fn direction_coherence(field: &[(f32, f32)], width: u32, height: u32, min_magnitude: f32) -> Option<f32> {
    let w = width as i64;
    let h = height as i64;
    let magnitude = |(gx, gy): (f32, f32)| (gx * gx + gy * gy).sqrt();

    let (sum, count) = (0..h)
        .into_par_iter()
        .map(|y| {
            let mut sum = 0.0f64;
            let mut count = 0u64;
            for x in 0..w {
                let g = field[(y * w + x) as usize];
                let m = magnitude(g);
                if m < min_magnitude {
                    continue;
                }
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if (dx == 0 && dy == 0) || nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        let n = field[(ny * w + nx) as usize];
                        let nm = magnitude(n);
                        if nm < min_magnitude {
                            continue;
                        }
                        let cos = (g.0 * n.0 + g.1 * n.1) / (m * nm);
                        sum += f64::from(cos);
                        count += 1;
                    }
                }
            }
            (sum, count)
        })
        .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    (count > 0).then(|| ((1.0 + sum / count as f64) / 2.0) as f32)
}

/// Low gradient magnitude is background
pub struct GradientFlowMaskGenerator;

impl MaskGenerator for GradientFlowMaskGenerator {
    fn kind(&self) -> MaskKind {
        MaskKind::Gradient
    }

    fn generate(&self, input: &GeneratorInput<'_>) -> Result<MaskOutput> {
        let threshold =
            sensitivity_scaled(input.tuning.gradient_base_threshold, input.sensitivity);
        let (width, height) = input.image.dimensions();
        let field = gradient_field(input.plane);

        let data = field
            .iter()
            .map(|&(gx, gy)| {
                if (gx * gx + gy * gy).sqrt() >= threshold {
                    Mask::FOREGROUND
                } else {
                    Mask::BACKGROUND
                }
            })
            .collect();

        let auxiliary = direction_coherence(&field, width, height, threshold);
        Ok(MaskOutput {
            mask: Mask::from_raw(width, height, data)?,
            auxiliary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_linear_ramp_has_unit_slope() {
        // Luminance rises by 10 per column.
        let image = RgbaImage::from_fn(20, 9, |x, _| {
            let v = (x * 10) as u8;
            Rgba([v, v, v, 255])
        });
        let field = gradient_field(&LumaPlane::from_rgba(&image));
        let (gx, gy) = field[4 * 20 + 10];
        assert!((gx - 10.0).abs() < 0.05, "gx = {gx}");
        assert!(gy.abs() < 0.05);
    }

    #[test]
    fn test_step_gradient_band() {
        let image = RgbaImage::from_fn(20, 9, |x, _| {
            if x < 10 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([100, 100, 100, 255])
            }
        });
        let field = gradient_field(&LumaPlane::from_rgba(&image));
        let magnitude = |x: usize| {
            let (gx, gy) = field[4 * 20 + x];
            (gx * gx + gy * gy).sqrt()
        };
        assert!(magnitude(9) > magnitude(8));
        assert!(magnitude(8) > 0.0);
        assert!(magnitude(2).abs() < 1e-4);
    }

    #[test]
    fn test_straight_edge_is_coherent() {
        let image = RgbaImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        });
        let field = gradient_field(&LumaPlane::from_rgba(&image));
        let coherence = direction_coherence(&field, 20, 20, 1.0).unwrap();
        assert!(coherence > 0.99);

        let flat = vec![(0.0, 0.0); 400];
        assert!(direction_coherence(&flat, 20, 20, 1.0).is_none());
    }
}
