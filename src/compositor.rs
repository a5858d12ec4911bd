//! Alpha compositing and mask quality metrics

use crate::{
    error::{BgRemovalError, Result},
    governor::WorkingResolution,
    types::{Mask, QualityMetrics},
};
use image::{imageops, imageops::FilterType, GrayImage, RgbaImage};
use rayon::prelude::*;

/// Background values at or above this count as cleanly removed
const CLEAN_BACKGROUND: u8 = 240;

/// Alpha-composited subject at the native resolution plus its mask
#[derive(Debug, Clone)]
pub struct CompositedImage {
    pub image: RgbaImage,
    pub mask: Mask,
}

/// Write `255 - mask` into the alpha channel and upsample to the native size
///
/// # Errors
/// Stage `alpha_compositing` when the mask does not match the working buffer.
pub fn apply_alpha(
    mut working: RgbaImage,
    mask: &Mask,
    resolution: &WorkingResolution,
) -> Result<CompositedImage> {
    if working.dimensions() != mask.dimensions() {
        return Err(BgRemovalError::processing_stage_error(
            "alpha_compositing",
            &format!("mask is {}x{}", mask.width(), mask.height()),
            Some(&format!(
                "{}x{} working buffer",
                working.width(),
                working.height()
            )),
        ));
    }

    let width = working.width() as usize;
    if width > 0 {
        let alphas = mask.as_slice();
        working
            .par_chunks_mut(width * 4)
            .zip(alphas.par_chunks(width))
            .for_each(|(row, mask_row)| {
                for (pixel, &value) in row.chunks_exact_mut(4).zip(mask_row) {
                    pixel[3] = 255 - value;
                }
            });
    }

    if !resolution.is_downscaled() {
        return Ok(CompositedImage {
            image: working,
            mask: mask.clone(),
        });
    }

    let (width, height) = resolution.original;
    log::debug!(
        "Upsampling {}x{} -> {}x{}",
        resolution.working.0,
        resolution.working.1,
        width,
        height
    );
    let image = imageops::resize(&working, width, height, FilterType::Triangle);
    let gray: GrayImage = imageops::resize(&mask.to_gray_image(), width, height, FilterType::Triangle);

    Ok(CompositedImage {
        image,
        mask: Mask::from_gray_image(gray),
    })
}

/// Whether a 4-neighbor has the opposite class
fn is_boundary(mask: &Mask, x: u32, y: u32) -> bool {
    let here = mask.is_foreground(x, y);
    let (w, h) = mask.dimensions();
    let neighbors = [
        (x.checked_sub(1), Some(y)),
        ((x + 1 < w).then_some(x + 1), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), (y + 1 < h).then_some(y + 1)),
    ];
    neighbors.iter().any(|&(nx, ny)| match (nx, ny) {
        (Some(nx), Some(ny)) => mask.is_foreground(nx, ny) != here,
        _ => false,
    })
}

fn near_edge(edges: &Mask, x: u32, y: u32) -> bool {
    let (w, h) = edges.dimensions();
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x1 = (x + 1).min(w - 1);
    let y1 = (y + 1).min(h - 1);
    (y0..=y1).any(|ny| (x0..=x1).any(|nx| edges.is_foreground(nx, ny)))
}

fn share(hits: u64, total: u64) -> f32 {
    if total == 0 {
        1.0
    } else {
        hits as f32 / total as f32
    }
}

/// Score a refined working-resolution mask
///
/// - `edge_accuracy`: boundary pixels of `refined` lying within one pixel
///   of an edge-mask foreground pixel
/// - `detail_preservation`: subject-mask foreground kept as foreground
/// - `background_cleanness`: background pixels at 240 or above
///
/// Each metric is 1 when it has nothing to measure.
#[must_use]
pub fn quality_metrics(refined: &Mask, edges: &Mask, subject: &Mask) -> QualityMetrics {
    let (w, h) = refined.dimensions();
    if w == 0 || h == 0 {
        return QualityMetrics {
            edge_accuracy: 1.0,
            detail_preservation: 1.0,
            background_cleanness: 1.0,
        };
    }
    let aligned_edges = edges.dimensions() == (w, h);
    let aligned_subject = subject.dimensions() == (w, h);

    let totals = (0..h)
        .into_par_iter()
        .map(|y| {
            let mut t = [0u64; 6];
            for x in 0..w {
                if aligned_edges && is_boundary(refined, x, y) {
                    t[0] += 1;
                    t[1] += u64::from(near_edge(edges, x, y));
                }
                if aligned_subject && subject.is_foreground(x, y) {
                    t[2] += 1;
                    t[3] += u64::from(refined.is_foreground(x, y));
                }
                let value = refined.get(x, y);
                if value >= Mask::MIDPOINT {
                    t[4] += 1;
                    t[5] += u64::from(value >= CLEAN_BACKGROUND);
                }
            }
            t
        })
        .reduce(
            || [0u64; 6],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );

    QualityMetrics {
        edge_accuracy: share(totals[1], totals[0]),
        detail_preservation: share(totals[3], totals[2]),
        background_cleanness: share(totals[5], totals[4]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;
    use image::Rgba;

    fn resolution(original: (u32, u32), working: (u32, u32)) -> WorkingResolution {
        WorkingResolution {
            original,
            working,
            scale: working.0 as f32 / original.0 as f32,
        }
    }

    #[test]
    fn test_alpha_is_inverted_mask() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        let mask = Mask::from_raw(4, 2, vec![0, 255, 128, 40, 0, 0, 0, 0]).unwrap();
        let out = apply_alpha(image, &mask, &resolution((4, 2), (4, 2))).unwrap();
        assert_eq!(out.image.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(out.image.get_pixel(1, 0).0[3], 0);
        assert_eq!(out.image.get_pixel(2, 0).0[3], 127);
        assert_eq!(out.image.get_pixel(3, 0).0[3], 215);
        assert_eq!(out.mask, mask);
    }

    #[test]
    fn test_upsamples_to_original() {
        let image = RgbaImage::from_pixel(10, 5, Rgba([1, 2, 3, 255]));
        let mask = Mask::filled(10, 5, Mask::FOREGROUND);
        let out = apply_alpha(image, &mask, &resolution((40, 20), (10, 5))).unwrap();
        assert_eq!(out.image.dimensions(), (40, 20));
        assert_eq!(out.mask.dimensions(), (40, 20));
        assert!(out.mask.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_mismatched_mask_fails() {
        let image = RgbaImage::new(4, 4);
        let err = apply_alpha(image, &Mask::filled(2, 2, 0), &resolution((4, 4), (4, 4))).unwrap_err();
        assert_eq!(err.stage_name(), Some("alpha_compositing"));
    }

    #[test]
    fn test_quality_metrics() {
        let mut refined = Mask::filled(10, 10, Mask::BACKGROUND);
        refined.fill_rect(Rect::new(2, 2, 6, 6), Mask::FOREGROUND);
        let subject = refined.clone();
        let edges = refined.clone();

        let metrics = quality_metrics(&refined, &edges, &subject);
        assert!((metrics.edge_accuracy - 1.0).abs() < 1e-6);
        assert!((metrics.detail_preservation - 1.0).abs() < 1e-6);
        assert!((metrics.background_cleanness - 1.0).abs() < 1e-6);

        let mut grey = refined.clone();
        grey.set(0, 0, 200);
        let metrics = quality_metrics(&grey, &Mask::filled(10, 10, 255), &subject);
        assert_eq!(metrics.edge_accuracy, 0.0);
        assert!((metrics.background_cleanness - 63.0 / 64.0).abs() < 1e-6);
    }
}
