//! Region detector cascade
//!
//! Skin clusters become faces; each face seeds body, hair and clothing
//! estimates; generic detectors add product, animal and plant objects. The
//! union of region bounds is stamped into the subject mask.

pub mod flood;
pub mod objects;
pub mod person;
pub mod skin;

use crate::{
    config::{DetectionThresholds, PrimaryAlgorithm, ProcessingOptions},
    error::Result,
    services::CancellationToken,
    types::{DetectionResult, Mask, Region, RegionKind},
    utils::LumaPlane,
};
use image::RgbaImage;
use rayon::prelude::*;
use tracing::{debug as trace_debug, instrument};

use objects::ObjectContext;
use person::PersonContext;

/// Stateless detector configured from the job options
#[derive(Debug, Clone)]
pub struct RegionDetector {
    thresholds: DetectionThresholds,
    algorithm: PrimaryAlgorithm,
}

impl RegionDetector {
    #[must_use]
    pub fn new(options: &ProcessingOptions) -> Self {
        Self {
            thresholds: options.thresholds,
            algorithm: options.primary_algorithm,
        }
    }

    fn stride(&self) -> u32 {
        if self.algorithm == PrimaryAlgorithm::Precise {
            1
        } else {
            self.thresholds.skin_stride.max(1)
        }
    }

    /// Run the cascade over the working buffer
    ///
    /// # Errors
    /// `Cancelled` when the token is set between the people and object passes.
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), algorithm = %self.algorithm))]
    pub fn detect(&self, image: &RgbaImage, cancel: &CancellationToken) -> Result<DetectionResult> {
        let (width, height) = image.dimensions();
        let stride = self.stride();
        let plane = LumaPlane::from_rgba(image);
        let variance = plane.local_variance(2);

        let mut regions: Vec<Region> = Vec::new();

        if self.algorithm.runs_people_cascade() {
            let faces = skin::detect_faces(image, &self.thresholds, stride);
            let ctx = PersonContext {
                image,
                variance: &variance,
                thresholds: &self.thresholds,
                stride,
            };
            let per_face: Vec<Vec<Region>> =
                faces.par_iter().map(|face| ctx.regions_for_face(face)).collect();

            regions.extend(faces);
            regions.extend(per_face.into_iter().flatten());
        }

        cancel.check("region_detection")?;

        if self.algorithm.runs_object_detectors() {
            let edges = plane.sobel_magnitudes();
            let ctx = ObjectContext {
                image,
                edges: &edges,
                variance: &variance,
                thresholds: &self.thresholds,
                stride,
            };
            regions.extend(ctx.detect());
        }

        let mut subject_mask = Mask::filled(width, height, Mask::BACKGROUND);
        for region in &mut regions {
            region.bounds = region.bounds.clamp_to(width, height);
            subject_mask.fill_rect(region.bounds, Mask::FOREGROUND);
        }
        regions.retain(|r| !r.bounds.is_empty());

        let background_regions = flood::border_background_regions(&subject_mask);

        trace_debug!(
            faces = regions.iter().filter(|r| r.kind == RegionKind::Face).count(),
            regions = regions.len(),
            background_regions = background_regions.len(),
            subject_share = subject_mask.foreground_share(),
            "region detection finished"
        );

        Ok(DetectionResult {
            subject_mask,
            regions,
            background_regions,
        })
    }
}
