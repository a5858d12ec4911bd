//! Mask refinement: morphology, feathering and detail preservation
//!
//! Works on the fused mask in place of a trained matting stage. Foreground
//! is the low end of the scale, so eroding the foreground is a 3x3 max
//! filter and dilating it a 3x3 min filter.

use crate::{
    config::{PrimaryAlgorithm, ProcessingOptions},
    error::Result,
    types::Mask,
};
use rayon::prelude::*;
use tracing::{span, Level};

/// Larger than any squared pixel distance the governor allows
const FAR: f64 = 1.0e12;

/// Detail boost per unit of strength
const DETAIL_GAIN: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Extremum {
    Min,
    Max,
}

/// Refinement steps resolved from the processing options
#[derive(Debug, Clone, PartialEq)]
pub struct MaskRefiner {
    closing_iterations: u8,
    feather_radius: Option<f32>,
    detail_strength: Option<f32>,
}

impl MaskRefiner {
    #[must_use]
    pub fn new(options: &ProcessingOptions) -> Self {
        let precise = options.primary_algorithm == PrimaryAlgorithm::Precise;
        let closing_iterations = if precise {
            options.smoothing_level.max(1)
        } else {
            options.smoothing_level
        };
        Self {
            closing_iterations,
            feather_radius: options.edge_feathering.filter(|r| *r > 0.0),
            detail_strength: options.detail_preservation.filter(|s| *s > 0.0),
        }
    }

    #[must_use]
    pub fn closing_iterations(&self) -> u8 {
        self.closing_iterations
    }

    /// Run opening, closing, feathering and detail preservation in order
    ///
    /// # Errors
    /// Only if a rebuilt mask fails its length check.
    pub fn refine(&self, mask: &Mask) -> Result<Mask> {
        let _span = span!(
            Level::DEBUG,
            "refine",
            closing = self.closing_iterations,
            feather = self.feather_radius.unwrap_or(0.0)
        )
        .entered();

        let mut current = opening(mask)?;
        for _ in 0..self.closing_iterations {
            current = closing(&current)?;
        }
        if let Some(radius) = self.feather_radius {
            current = feather(&current, radius)?;
        }
        if let Some(strength) = self.detail_strength {
            preserve_detail(&mut current, strength);
        }
        Ok(current)
    }
}

/// 3x3 min or max filter, separable; out-of-bounds neighbors are ignored
fn filter3(mask: &Mask, op: Extremum) -> Result<Mask> {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Ok(mask.clone());
    }
    let pick = move |a: u8, b: u8| match op {
        Extremum::Min => a.min(b),
        Extremum::Max => a.max(b),
    };
    let src = mask.as_slice();

    let mut horizontal = vec![0u8; w * h];
    horizontal
        .par_chunks_mut(w)
        .zip(src.par_chunks(w))
        .for_each(|(out, row)| {
            for x in 0..w {
                let mut v = row[x];
                if x > 0 {
                    v = pick(v, row[x - 1]);
                }
                if x + 1 < w {
                    v = pick(v, row[x + 1]);
                }
                out[x] = v;
            }
        });

    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, value) in row.iter_mut().enumerate() {
            let mut v = horizontal[y * w + x];
            if y > 0 {
                v = pick(v, horizontal[(y - 1) * w + x]);
            }
            if y + 1 < h {
                v = pick(v, horizontal[(y + 1) * w + x]);
            }
            *value = v;
        }
    });
    Mask::from_raw(width, height, out)
}

/// Erode then dilate the foreground; removes specks thinner than 3px
///
/// # Errors
/// Propagates mask construction failures.
pub fn opening(mask: &Mask) -> Result<Mask> {
    filter3(&filter3(mask, Extremum::Max)?, Extremum::Min)
}

/// Dilate then erode the foreground; fills pinholes
///
/// # Errors
/// Propagates mask construction failures.
pub fn closing(mask: &Mask) -> Result<Mask> {
    filter3(&filter3(mask, Extremum::Min)?, Extremum::Max)
}

/// Exact 1D squared distance transform (lower envelope of parabolas)
fn edt_1d(f: &[f64], out: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        let qf = q as f64;
        loop {
            let p = v[k] as f64;
            let s = ((f[q] + qf * qf) - (f[v[k]] + p * p)) / (2.0 * qf - 2.0 * p);
            // z[0] is -inf, so this never underflows.
            if s <= z[k] {
                k -= 1;
                continue;
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
            break;
        }
    }

    k = 0;
    for (q, slot) in out.iter_mut().enumerate() {
        let qf = q as f64;
        while z[k + 1] < qf {
            k += 1;
        }
        let p = v[k] as f64;
        *slot = (qf - p) * (qf - p) + f[v[k]];
    }
}

/// Euclidean distance from every pixel to the nearest foreground pixel
///
/// Foreground pixels are at distance 0. Pixels in a mask with no
/// foreground at all get `f32::INFINITY`.
#[must_use]
pub fn distance_to_foreground(mask: &Mask) -> Vec<f32> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let src = mask.as_slice();

    let columns: Vec<Vec<f64>> = (0..w)
        .into_par_iter()
        .map(|x| {
            let f: Vec<f64> = (0..h)
                .map(|y| if src[y * w + x] < Mask::MIDPOINT { 0.0 } else { FAR })
                .collect();
            let mut out = vec![0.0; h];
            edt_1d(&f, &mut out);
            out
        })
        .collect();

    let mut distances = vec![0.0f32; w * h];
    distances
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            let f: Vec<f64> = columns.iter().map(|column| column[y]).collect();
            let mut out = vec![0.0; w];
            edt_1d(&f, &mut out);
            for (slot, d2) in row.iter_mut().zip(out) {
                *slot = if d2 >= FAR { f32::INFINITY } else { d2.sqrt() as f32 };
            }
        });
    distances
}

/// Ramp background pixels within `radius` of the foreground toward opacity
///
/// A background value `v` at distance `d` becomes
/// `ceil(128 + (v - 128) * d / radius)`; it never drops below 128 and never
/// rises above `v`.
///
/// # Errors
/// Propagates mask construction failures.
pub fn feather(mask: &Mask, radius: f32) -> Result<Mask> {
    if radius <= 0.0 {
        return Ok(mask.clone());
    }
    let distances = distance_to_foreground(mask);
    let midpoint = f32::from(Mask::MIDPOINT);
    let data = mask
        .as_slice()
        .par_iter()
        .zip(distances.par_iter())
        .map(|(&value, &d)| {
            if value < Mask::MIDPOINT || d >= radius {
                return value;
            }
            let ramped = (midpoint + (f32::from(value) - midpoint) * d / radius).ceil();
            (ramped.clamp(midpoint, f32::from(value))) as u8
        })
        .collect();
    Mask::from_raw(mask.width(), mask.height(), data)
}

/// Boost foreground opacity by `1 + 0.2 * strength`, clamped to opaque
pub fn preserve_detail(mask: &mut Mask, strength: f32) {
    let gain = 1.0 + DETAIL_GAIN * strength.clamp(0.0, 1.0);
    mask.as_mut_slice().par_iter_mut().for_each(|value| {
        if *value < Mask::MIDPOINT {
            let alpha = (f32::from(255 - *value) * gain).round().min(255.0);
            *value = 255 - alpha as u8;
        }
    });
}
