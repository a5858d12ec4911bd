//! Skin classification and face clustering

use super::flood::cluster_points;
use crate::{
    config::DetectionThresholds,
    types::{Rect, Region, RegionKind},
};
use image::{Rgba, RgbaImage};

/// Which RGB range rule accepted a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinRule {
    /// Uniform daylight illumination
    Daylight,
    /// Flash or lateral lighting on light skin
    Flash,
    /// Darker skin tones and low light
    Dark,
}

impl SkinRule {
    fn base_score(self) -> f32 {
        match self {
            SkinRule::Daylight => 0.9,
            SkinRule::Flash => 0.75,
            SkinRule::Dark => 0.65,
        }
    }
}

/// Apply the disjoint range rules; the relative channel rule is part of each
#[must_use]
pub fn classify(pixel: &Rgba<u8>) -> Option<SkinRule> {
    let [r, g, b, a] = pixel.0;
    if a < 128 {
        return None;
    }
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let spread = r.max(g).max(b) - r.min(g).min(b);

    if r > 95 && g > 40 && b > 20 && spread > 15 && (r - g).abs() > 15 && r > g && r > b {
        return Some(SkinRule::Daylight);
    }
    if r > 220 && g > 210 && b > 170 && (r - g).abs() <= 15 && r > b && g > b {
        return Some(SkinRule::Flash);
    }
    if r <= 95 && r > 50 && g > 25 && b > 10 && spread > 10 && r > g && r > b && g >= b {
        return Some(SkinRule::Dark);
    }
    None
}

/// Skin likelihood in `[0, 1]`, zero for non-skin pixels
///
/// Accepted pixels are scored by their rule, scaled by how close the
/// green/red ratio sits to the typical skin ratio.
#[must_use]
pub fn skin_score(pixel: &Rgba<u8>) -> f32 {
    let Some(rule) = classify(pixel) else {
        return 0.0;
    };
    let r = f32::from(pixel.0[0]).max(1.0);
    let ratio = f32::from(pixel.0[1]) / r;
    let fit = 1.0 - ((ratio - 0.72).abs() / 0.3).min(1.0);
    (rule.base_score() * (0.6 + 0.4 * fit)).clamp(0.0, 1.0)
}

/// Sample skin at `stride` and turn sufficiently large clusters into faces
#[must_use]
pub fn detect_faces(image: &RgbaImage, thresholds: &DetectionThresholds, stride: u32) -> Vec<Region> {
    let (width, height) = image.dimensions();
    let stride = stride.max(1);

    let mut points = Vec::new();
    let mut scores = Vec::new();
    for y in (0..height).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            let score = skin_score(image.get_pixel(x, y));
            if score > 0.0 {
                points.push((x, y));
                scores.push(score);
            }
        }
    }

    let radius = thresholds.skin_cluster_radius.max(stride);
    let image_area = f64::from(width) * f64::from(height);
    let max_area = image_area * f64::from(thresholds.max_region_share);

    let faces: Vec<Region> = cluster_points(&points, width, height, radius)
        .into_iter()
        .filter_map(|cluster| {
            if cluster.len() < thresholds.min_face_samples {
                return None;
            }
            let mean = cluster.members.iter().map(|&i| scores[i]).sum::<f32>() / cluster.len() as f32;
            if mean < thresholds.min_face_confidence {
                return None;
            }
            let bounds = extend_by_stride(cluster.bounds, stride, width, height);
            if bounds.area() as f64 > max_area {
                log::debug!("Dropping skin cluster covering {:?}: too large", bounds);
                return None;
            }
            Some(Region::new(RegionKind::Face, mean, bounds))
        })
        .collect();

    log::debug!(
        "Skin sampling found {} candidates, {} face regions",
        points.len(),
        faces.len()
    );
    faces
}

/// Grow sample-point bounds to cover the cells each sample stands for
pub(crate) fn extend_by_stride(bounds: Rect, stride: u32, width: u32, height: u32) -> Rect {
    Rect {
        width: bounds.width + stride - 1,
        height: bounds.height + stride - 1,
        ..bounds
    }
    .clamp_to(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: Rgba<u8> = Rgba([224, 172, 140, 255]);

    #[test]
    fn test_rules_are_disjoint_and_match_expected_tones() {
        assert_eq!(classify(&SKIN), Some(SkinRule::Daylight));
        assert_eq!(classify(&Rgba([240, 230, 200, 255])), Some(SkinRule::Flash));
        assert_eq!(classify(&Rgba([90, 60, 45, 255])), Some(SkinRule::Dark));
    }

    #[test]
    fn test_non_skin_colors() {
        assert_eq!(classify(&Rgba([255, 0, 0, 255])), None);
        assert_eq!(classify(&Rgba([0, 255, 0, 255])), None);
        assert_eq!(classify(&Rgba([128, 128, 128, 255])), None);
        assert_eq!(classify(&Rgba([20, 20, 200, 255])), None);
        assert_eq!(classify(&Rgba([224, 172, 140, 0])), None);
        assert_eq!(skin_score(&Rgba([0, 0, 255, 255])), 0.0);
    }

    #[test]
    fn test_skin_score_range() {
        let score = skin_score(&SKIN);
        assert!(score > 0.5 && score <= 1.0);
    }

    #[test]
    fn test_detect_single_face() {
        let mut image = RgbaImage::from_pixel(80, 80, Rgba([30, 60, 160, 255]));
        for y in 20..40 {
            for x in 30..46 {
                image.put_pixel(x, y, SKIN);
            }
        }

        let faces = detect_faces(&image, &DetectionThresholds::default(), 2);
        assert_eq!(faces.len(), 1);
        let face = faces[0];
        assert_eq!(face.kind, RegionKind::Face);
        assert_eq!(face.bounds, Rect::new(30, 20, 16, 20));
        assert!(face.confidence >= 0.45);
    }

    #[test]
    fn test_small_and_oversized_clusters_are_dropped() {
        let thresholds = DetectionThresholds::default();

        let mut speck = RgbaImage::from_pixel(60, 60, Rgba([30, 60, 160, 255]));
        for y in 10..14 {
            for x in 10..14 {
                speck.put_pixel(x, y, SKIN);
            }
        }
        assert!(detect_faces(&speck, &thresholds, 2).is_empty());

        let everywhere = RgbaImage::from_pixel(60, 60, SKIN);
        assert!(detect_faces(&everywhere, &thresholds, 2).is_empty());
    }
}
