//! Best-effort product, animal and plant detectors

use super::{
    flood::{cluster_points, PointCluster},
    skin::extend_by_stride,
};
use crate::{
    config::DetectionThresholds,
    types::{ObjectCategory, Rect, Region},
};
use image::RgbaImage;

/// Generic objects never report more than this confidence
const MAX_OBJECT_CONFIDENCE: f32 = 0.7;

/// Regions overlapping an earlier detection by this IoU are duplicates
const DUPLICATE_IOU: f32 = 0.5;

/// Per-image signals the object detectors read
pub struct ObjectContext<'a> {
    pub image: &'a RgbaImage,
    /// Unit-offset Sobel magnitudes, row-major
    pub edges: &'a [f32],
    /// 5x5 luminance variance, row-major
    pub variance: &'a [f32],
    pub thresholds: &'a DetectionThresholds,
    pub stride: u32,
}

impl ObjectContext<'_> {
    /// Run the three detectors, most specific first, dropping duplicates
    #[must_use]
    pub fn detect(&self) -> Vec<Region> {
        let t = self.thresholds;
        let mut regions: Vec<Region> = Vec::new();

        let detectors: [(ObjectCategory, Box<dyn Fn(u32, u32, usize) -> Option<f32> + '_>); 3] = [
            (
                ObjectCategory::Product,
                Box::new(|_, _, idx| {
                    let strength = self.edges[idx];
                    (strength >= t.object_edge_threshold)
                        .then_some(strength / (2.0 * t.object_edge_threshold))
                }),
            ),
            (
                ObjectCategory::Animal,
                Box::new(|_, _, idx| {
                    let variance = self.variance[idx];
                    (variance >= t.animal_min_variance)
                        .then_some(variance / (4.0 * t.animal_min_variance))
                }),
            ),
            (
                ObjectCategory::Plant,
                Box::new(|x, y, _| {
                    let [r, g, b, _] = self.image.get_pixel(x, y).0;
                    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
                    let margin = g - r.max(b);
                    (margin >= t.plant_green_margin).then_some(margin / 128.0)
                }),
            ),
        ];

        for (category, response) in &detectors {
            for candidate in self.components(|x, y, idx| response(x, y, idx)) {
                let duplicate = regions
                    .iter()
                    .any(|existing| iou(&existing.bounds, &candidate.bounds) >= DUPLICATE_IOU);
                if duplicate {
                    continue;
                }
                regions.push(Region::object(*category, candidate.confidence, candidate.bounds));
            }
        }

        log::debug!("Generic object detectors kept {} regions", regions.len());
        regions
    }

    /// Sample `response`, cluster the hits and keep object-like components
    fn components<F>(&self, response: F) -> Vec<Candidate>
    where
        F: Fn(u32, u32, usize) -> Option<f32>,
    {
        let t = self.thresholds;
        let (width, height) = self.image.dimensions();
        let stride = self.stride.max(1);

        let mut points = Vec::new();
        let mut strengths = Vec::new();
        let mut sampled = 0usize;
        for y in (0..height).step_by(stride as usize) {
            for x in (0..width).step_by(stride as usize) {
                sampled += 1;
                let idx = y as usize * width as usize + x as usize;
                if let Some(strength) = response(x, y, idx) {
                    points.push((x, y));
                    strengths.push(strength);
                }
            }
        }
        if points.is_empty() {
            return Vec::new();
        }

        let min_samples = ((sampled as f32 * t.min_object_share).ceil() as usize).max(4);
        let max_area = f64::from(width) * f64::from(height) * f64::from(t.max_region_share);

        cluster_points(&points, width, height, 2 * stride)
            .into_iter()
            .filter(|cluster| cluster.len() >= min_samples)
            .filter(|cluster| !is_background_like(cluster, width, height, stride, max_area))
            .map(|cluster| {
                let mean = cluster.members.iter().map(|&i| strengths[i]).sum::<f32>()
                    / cluster.len() as f32;
                Candidate {
                    bounds: extend_by_stride(cluster.bounds, stride, width, height),
                    confidence: (0.3 + 0.4 * mean.min(1.0)).min(MAX_OBJECT_CONFIDENCE),
                }
            })
            .collect()
    }
}

struct Candidate {
    bounds: Rect,
    confidence: f32,
}

/// Components reaching three borders or covering most of the frame are scenery
fn is_background_like(cluster: &PointCluster, width: u32, height: u32, stride: u32, max_area: f64) -> bool {
    cluster.borders_touched(width, height, stride) >= 3 || cluster.bounds.area() as f64 > max_area
}

fn iou(a: &Rect, b: &Rect) -> f32 {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = a.right().min(b.right());
    let y1 = a.bottom().min(b.bottom());
    if x1 <= x0 || y1 <= y0 {
        return 0.0;
    }
    let intersection = u64::from(x1 - x0) * u64::from(y1 - y0);
    let union = a.area() + b.area() - intersection;
    intersection as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::LumaPlane;
    use image::Rgba;

    fn run(image: &RgbaImage) -> Vec<Region> {
        let plane = LumaPlane::from_rgba(image);
        let edges = plane.sobel_magnitudes();
        let variance = plane.local_variance(2);
        let thresholds = DetectionThresholds::default();
        ObjectContext {
            image,
            edges: &edges,
            variance: &variance,
            thresholds: &thresholds,
            stride: 2,
        }
        .detect()
    }

    #[test]
    fn test_red_square_on_green_is_a_single_product() {
        let image = RgbaImage::from_fn(100, 100, |x, y| {
            if (30..70).contains(&x) && (30..70).contains(&y) {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        });
        let regions = run(&image);

        assert_eq!(regions.len(), 1, "{regions:?}");
        let region = regions[0];
        assert_eq!(region.category, Some(ObjectCategory::Product));
        assert!(region.confidence <= MAX_OBJECT_CONFIDENCE);
        // Bounds hug the square within the sampling stride.
        assert!(region.bounds.x >= 27 && region.bounds.x <= 31);
        assert!(region.bounds.right() >= 69 && region.bounds.right() <= 73);
    }

    #[test]
    fn test_uniform_image_has_no_objects() {
        let image = RgbaImage::from_pixel(50, 50, Rgba([0, 200, 0, 255]));
        assert!(run(&image).is_empty());
    }

    #[test]
    fn test_green_blob_is_a_plant() {
        let image = RgbaImage::from_fn(80, 80, |x, y| {
            let dx = x as i32 - 40;
            let dy = y as i32 - 40;
            if dx * dx + dy * dy < 225 {
                Rgba([40, 160, 40, 255])
            } else {
                Rgba([150, 150, 150, 255])
            }
        });
        let regions = run(&image);
        assert!(regions
            .iter()
            .any(|r| r.category == Some(ObjectCategory::Plant) || r.category == Some(ObjectCategory::Product)));
        assert!(regions.iter().all(|r| r.bounds.fits_within(80, 80)));
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0, 0, 10, 10);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &Rect::new(20, 20, 5, 5)), 0.0);
        let half = iou(&a, &Rect::new(5, 0, 10, 10));
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }
}
