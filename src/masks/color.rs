//! Spatially aware k-means color-cluster mask

use super::{GeneratorInput, MaskGenerator, MaskOutput};
use crate::{
    config::GeneratorTuning,
    error::Result,
    types::{Mask, MaskKind},
    utils::{rgb_distance, rgb_f32},
};
use image::RgbaImage;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;

/// Fraction of each dimension counted as the border band
const BORDER_BAND: f32 = 0.1;

const BORDER_WEIGHT: f32 = 0.5;
const CENTER_WEIGHT: f32 = 0.3;
const UNIFORMITY_WEIGHT: f32 = 0.2;

const MAX_COLOR_DISTANCE: f32 = 441.672_95; // 255 * sqrt(3)
const MAX_SPATIAL_DISTANCE: f32 = std::f32::consts::SQRT_2;

#[derive(Debug, Clone, Copy)]
struct Sample {
    color: [f32; 3],
    /// Position normalized to `[0, 1]` on both axes
    pos: [f32; 2],
    on_border: bool,
}

/// One k-means cluster after convergence
#[derive(Debug, Clone, PartialEq)]
pub struct ColorCluster {
    pub color: [f32; 3],
    pub pos: [f32; 2],
    pub size: usize,
    pub background_score: f32,
}

/// Pixels close in color to a border-heavy cluster are background
pub struct ColorClusterMaskGenerator;

fn collect_samples(image: &RgbaImage, max_samples: usize) -> Vec<Sample> {
    let (width, height) = image.dimensions();
    let pixels = width as usize * height as usize;
    let stride = ((pixels as f64 / max_samples.max(1) as f64).sqrt().ceil() as u32).max(1);
    let band_x = (width as f32 * BORDER_BAND).max(1.0);
    let band_y = (height as f32 * BORDER_BAND).max(1.0);
    let span_x = (width.saturating_sub(1)).max(1) as f32;
    let span_y = (height.saturating_sub(1)).max(1) as f32;

    let mut samples = Vec::new();
    for y in (0..height).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            let (fx, fy) = (x as f32, y as f32);
            samples.push(Sample {
                color: rgb_f32(image.get_pixel(x, y)),
                pos: [fx / span_x, fy / span_y],
                on_border: fx < band_x
                    || fy < band_y
                    || fx >= width as f32 - band_x
                    || fy >= height as f32 - band_y,
            });
        }
    }
    samples
}

fn combined_distance(sample: &Sample, color: &[f32; 3], pos: &[f32; 2], spatial_weight: f32) -> f32 {
    let color_term = rgb_distance(sample.color, *color) / MAX_COLOR_DISTANCE;
    let dx = sample.pos[0] - pos[0];
    let dy = sample.pos[1] - pos[1];
    let spatial_term = (dx * dx + dy * dy).sqrt() / MAX_SPATIAL_DISTANCE;
    (1.0 - spatial_weight) * color_term + spatial_weight * spatial_term
}

/// Cluster strided samples of `image` and score every cluster as background
///
/// Centroids are initialized from distinct samples drawn with a `StdRng`
/// seeded by `seed`, so equal inputs always give equal clusters.
#[must_use]
pub fn cluster_colors(image: &RgbaImage, tuning: &GeneratorTuning, seed: u64) -> Vec<ColorCluster> {
    let samples = collect_samples(image, tuning.kmeans_max_samples);
    if samples.is_empty() {
        return Vec::new();
    }

    let k = tuning.kmeans_clusters.min(samples.len()).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut init = rand::seq::index::sample(&mut rng, samples.len(), k).into_vec();
    init.sort_unstable();

    let mut centroids: Vec<([f32; 3], [f32; 2])> =
        init.iter().map(|&i| (samples[i].color, samples[i].pos)).collect();
    let mut assignment = vec![usize::MAX; samples.len()];
    let weight = tuning.kmeans_spatial_weight;

    for iteration in 0..tuning.kmeans_iterations.max(1) {
        let next: Vec<usize> = samples
            .par_iter()
            .map(|sample| {
                centroids
                    .iter()
                    .enumerate()
                    .map(|(i, (color, pos))| (i, combined_distance(sample, color, pos, weight)))
                    .fold((0, f32::INFINITY), |best, candidate| {
                        if candidate.1 < best.1 {
                            candidate
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect();

        let changed = next != assignment;
        assignment = next;
        if !changed {
            log::trace!("k-means converged after {} iterations", iteration);
            break;
        }

        let mut sums = vec![([0.0f64; 3], [0.0f64; 2], 0usize); centroids.len()];
        for (sample, &cluster) in samples.iter().zip(&assignment) {
            let entry = &mut sums[cluster];
            for c in 0..3 {
                entry.0[c] += f64::from(sample.color[c]);
            }
            entry.1[0] += f64::from(sample.pos[0]);
            entry.1[1] += f64::from(sample.pos[1]);
            entry.2 += 1;
        }
        for (centroid, (color, pos, count)) in centroids.iter_mut().zip(&sums) {
            if *count == 0 {
                continue;
            }
            let n = *count as f64;
            centroid.0 = [
                (color[0] / n) as f32,
                (color[1] / n) as f32,
                (color[2] / n) as f32,
            ];
            centroid.1 = [(pos[0] / n) as f32, (pos[1] / n) as f32];
        }
    }

    score_clusters(&samples, &assignment, &centroids)
}

fn score_clusters(
    samples: &[Sample],
    assignment: &[usize],
    centroids: &[([f32; 3], [f32; 2])],
) -> Vec<ColorCluster> {
    let mut sizes = vec![0usize; centroids.len()];
    let mut border_hits = vec![0usize; centroids.len()];
    for (sample, &cluster) in samples.iter().zip(assignment) {
        sizes[cluster] += 1;
        if sample.on_border {
            border_hits[cluster] += 1;
        }
    }

    let total = samples.len() as f32;
    centroids
        .iter()
        .enumerate()
        .filter(|(i, _)| sizes[*i] > 0)
        .map(|(i, &(color, pos))| {
            let size = sizes[i];
            let border = border_hits[i] as f32 / size as f32;
            let dx = pos[0] - 0.5;
            let dy = pos[1] - 0.5;
            let center = ((dx * dx + dy * dy).sqrt() / (MAX_SPATIAL_DISTANCE / 2.0)).min(1.0);
            // How much of the whole image shares this color.
            let uniformity = samples
                .iter()
                .filter(|s| rgb_distance(s.color, color) < 30.0)
                .count() as f32
                / total;

            ColorCluster {
                color,
                pos,
                size,
                background_score: BORDER_WEIGHT * border
                    + CENTER_WEIGHT * center
                    + UNIFORMITY_WEIGHT * uniformity,
            }
        })
        .collect()
}

/// Clusters scoring at least `ratio` of the best score
#[must_use]
pub fn background_clusters(clusters: &[ColorCluster], ratio: f32) -> Vec<&ColorCluster> {
    let best = clusters
        .iter()
        .map(|c| c.background_score)
        .fold(0.0f32, f32::max);
    if best <= 0.0 {
        return Vec::new();
    }
    clusters
        .iter()
        .filter(|c| c.background_score >= ratio * best)
        .collect()
}

impl MaskGenerator for ColorClusterMaskGenerator {
    fn kind(&self) -> MaskKind {
        MaskKind::Color
    }

    fn generate(&self, input: &GeneratorInput<'_>) -> Result<MaskOutput> {
        let tuning = input.tuning;
        let image = input.image;
        let (width, height) = image.dimensions();

        let clusters = cluster_colors(image, tuning, input.seed);
        let background: Vec<[f32; 3]> =
            background_clusters(&clusters, tuning.background_cluster_ratio)
                .iter()
                .map(|c| c.color)
                .collect();
        let max_distance = tuning.color_base_distance + 50.0 * (1.0 - input.sensitivity);
        log::debug!(
            "Color clustering: {} clusters, {} background, distance {:.1}",
            clusters.len(),
            background.len(),
            max_distance
        );

        let mut data = vec![Mask::FOREGROUND; width as usize * height as usize];
        if width > 0 && !background.is_empty() {
            data.par_chunks_mut(width as usize)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, value) in row.iter_mut().enumerate() {
                        let color = rgb_f32(image.get_pixel(x as u32, y as u32));
                        let nearest = background
                            .iter()
                            .map(|c| rgb_distance(color, *c))
                            .fold(f32::INFINITY, f32::min);
                        if nearest < max_distance {
                            *value = Mask::BACKGROUND;
                        }
                    }
                });
        }

        Ok(Mask::from_raw(width, height, data)?.into())
    }
}
