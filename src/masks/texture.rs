//! Local binary pattern texture mask

use super::{sensitivity_scaled, GeneratorInput, MaskGenerator, MaskOutput};
use crate::{
    error::Result,
    types::{Mask, MaskKind},
    utils::LumaPlane,
};
use rayon::prelude::*;

/// Neighbor offsets in circular order, bit 0 first
const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// Flat (all equal) plus the half run at its four even rotations
const UNIFORM_PATTERNS: [u8; 6] = [0x00, 0xFF, 0x0F, 0x3C, 0xF0, 0xC3];

/// Textured neighborhoods are subject, flat or single-step ones background
pub struct TextureMaskGenerator;

/// 8-neighbor LBP code; a bit is set when the neighbor is at least the center
#[must_use]
pub fn lbp_code(plane: &LumaPlane, x: u32, y: u32) -> u8 {
    let center = plane.get(x, y);
    NEIGHBORS
        .iter()
        .enumerate()
        .fold(0u8, |code, (bit, &(dx, dy))| {
            let neighbor = plane.get_clamped(i64::from(x) + dx, i64::from(y) + dy);
            if neighbor >= center {
                code | (1 << bit)
            } else {
                code
            }
        })
}

/// Circular bit transitions / 8; uniform patterns score zero
#[must_use]
pub fn texture_score(code: u8) -> f32 {
    if UNIFORM_PATTERNS.contains(&code) {
        return 0.0;
    }
    (code ^ code.rotate_left(1)).count_ones() as f32 / 8.0
}

impl MaskGenerator for TextureMaskGenerator {
    fn kind(&self) -> MaskKind {
        MaskKind::Texture
    }

    fn generate(&self, input: &GeneratorInput<'_>) -> Result<MaskOutput> {
        let threshold = sensitivity_scaled(input.tuning.texture_threshold, input.sensitivity);
        let plane = input.plane;
        let (width, height) = input.image.dimensions();

        let mut data = vec![Mask::BACKGROUND; width as usize * height as usize];
        if width > 0 {
            data.par_chunks_mut(width as usize)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, value) in row.iter_mut().enumerate() {
                        let score = texture_score(lbp_code(plane, x as u32, y as u32));
                        if score >= threshold {
                            *value = Mask::FOREGROUND;
                        }
                    }
                });
        }

        Ok(Mask::from_raw(width, height, data)?.into())
    }
}
