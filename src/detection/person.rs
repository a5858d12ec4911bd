//! Face-relative estimation of body, hair and clothing regions

use super::skin::{extend_by_stride, skin_score};
use crate::{
    config::DetectionThresholds,
    types::{Rect, Region, RegionKind},
    utils::{brightness, luminance, rgb_distance, rgb_f32, saturation},
};
use image::RgbaImage;

/// Shared per-image inputs for the face-dependent stages
pub struct PersonContext<'a> {
    pub image: &'a RgbaImage,
    /// 5x5 luminance variance, row-major
    pub variance: &'a [f32],
    pub thresholds: &'a DetectionThresholds,
    pub stride: u32,
}

impl PersonContext<'_> {
    fn samples(&self, rect: Rect) -> impl Iterator<Item = (u32, u32)> + '_ {
        let step = self.stride.max(1) as usize;
        (rect.y..rect.bottom())
            .step_by(step)
            .flat_map(move |y| (rect.x..rect.right()).step_by(step).map(move |x| (x, y)))
    }

    fn variance_at(&self, x: u32, y: u32) -> f32 {
        self.variance[y as usize * self.image.width() as usize + x as usize]
    }

    /// Run body, hair and clothing estimation for one face
    #[must_use]
    pub fn regions_for_face(&self, face: &Region) -> Vec<Region> {
        let mut regions = Vec::with_capacity(3);
        if let Some(hair) = self.estimate_hair(face) {
            regions.push(hair);
        }
        if let Some(body) = self.estimate_body(face) {
            if let Some(clothing) = self.estimate_clothing(face, &body) {
                regions.push(clothing);
            }
            regions.push(body);
        }
        regions
    }

    /// Project a body box below and around the face and validate it
    #[must_use]
    pub fn estimate_body(&self, face: &Region) -> Option<Region> {
        let t = self.thresholds;
        let (width, height) = self.image.dimensions();
        let f = face.bounds;

        let body_width = (f.width as f32 * t.body_width_factor).round() as i64;
        let body_height = (f.height as f32 * t.body_height_factor).round() as i64;
        let center_x = i64::from(f.x) + i64::from(f.width) / 2;
        let left = (center_x - body_width / 2).max(0);
        let right = (center_x - body_width / 2 + body_width).min(i64::from(width));
        let bottom = (i64::from(f.y) + body_height).min(i64::from(height));
        if right <= left || bottom <= i64::from(f.y) {
            return None;
        }
        let bounds = Rect::new(
            left as u32,
            f.y,
            (right - left) as u32,
            (bottom - i64::from(f.y)) as u32,
        );

        let (sat_lo, sat_hi) = t.body_saturation_range;
        let (bri_lo, bri_hi) = t.body_brightness_range;
        let (mut total, mut valid) = (0usize, 0usize);
        for (x, y) in self.samples(bounds) {
            if f.contains(x, y) {
                continue;
            }
            total += 1;
            let pixel = self.image.get_pixel(x, y);
            let s = saturation(pixel);
            let v = brightness(pixel);
            if (sat_lo..=sat_hi).contains(&s) && (bri_lo..=bri_hi).contains(&v) {
                valid += 1;
            }
        }
        if total == 0 {
            return None;
        }

        let confidence = valid as f32 / total as f32;
        if confidence < t.min_body_confidence {
            log::debug!("Body box {:?} rejected (confidence {:.2})", bounds, confidence);
            return None;
        }
        Some(Region::new(RegionKind::Body, confidence, bounds))
    }

    /// Look for dark, desaturated, textured pixels above and beside the face
    #[must_use]
    pub fn estimate_hair(&self, face: &Region) -> Option<Region> {
        let t = self.thresholds;
        let (width, height) = self.image.dimensions();
        let f = face.bounds;

        let half_w = f.width / 2;
        let x0 = f.x.saturating_sub(half_w);
        let y0 = f.y.saturating_sub((f.height as f32 * 0.6).round() as u32);
        let x1 = (f.right() + half_w).min(width);
        let y1 = (f.y + f.height / 2).min(height);
        let band = Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0));

        let (mut total, mut hits) = (0usize, 0usize);
        let mut corners: Option<(u32, u32, u32, u32)> = None;
        for (x, y) in self.samples(band) {
            if f.contains(x, y) {
                continue;
            }
            total += 1;
            let pixel = self.image.get_pixel(x, y);
            if luminance(pixel) <= t.hair_max_brightness
                && saturation(pixel) <= t.hair_max_saturation
                && self.variance_at(x, y) >= t.hair_min_variance
            {
                hits += 1;
                corners = Some(match corners {
                    None => (x, y, x, y),
                    Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x), d.max(y)),
                });
            }
        }

        let (min_x, min_y, max_x, max_y) = corners?;
        if hits < t.min_hair_pixels || total == 0 {
            return None;
        }
        let bounds = extend_by_stride(
            Rect::from_corners(min_x, min_y, max_x, max_y),
            self.stride,
            width,
            height,
        );
        Some(Region::new(RegionKind::Hair, hits as f32 / total as f32, bounds))
    }

    /// Flag saturated, locally uniform pixels in the torso part of the body
    #[must_use]
    pub fn estimate_clothing(&self, face: &Region, body: &Region) -> Option<Region> {
        let t = self.thresholds;
        let (width, height) = self.image.dimensions();
        let b = body.bounds;

        let top = face.bounds.bottom().min(b.bottom());
        let margin = b.width / 6;
        let torso = Rect::new(
            b.x + margin,
            top,
            b.width.saturating_sub(2 * margin),
            b.bottom() - top,
        );

        let (mut total, mut hits) = (0usize, 0usize);
        let mut corners: Option<(u32, u32, u32, u32)> = None;
        for (x, y) in self.samples(torso) {
            total += 1;
            let pixel = self.image.get_pixel(x, y);
            if saturation(pixel) < t.clothing_min_saturation || skin_score(pixel) > 0.0 {
                continue;
            }
            if self.uniformity(x, y) < t.clothing_min_uniformity {
                continue;
            }
            hits += 1;
            corners = Some(match corners {
                None => (x, y, x, y),
                Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x), d.max(y)),
            });
        }

        let (min_x, min_y, max_x, max_y) = corners?;
        if hits < t.min_clothing_pixels || total == 0 {
            return None;
        }
        let bounds = extend_by_stride(
            Rect::from_corners(min_x, min_y, max_x, max_y),
            self.stride,
            width,
            height,
        );
        Some(Region::new(
            RegionKind::Clothing,
            hits as f32 / total as f32,
            bounds,
        ))
    }

    /// Share of the 8 neighbors within the clothing color distance
    fn uniformity(&self, x: u32, y: u32) -> f32 {
        let (width, height) = self.image.dimensions();
        let center = rgb_f32(self.image.get_pixel(x, y));
        let mut total = 0u32;
        let mut close = 0u32;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                    continue;
                }
                total += 1;
                let neighbor = rgb_f32(self.image.get_pixel(nx as u32, ny as u32));
                if rgb_distance(center, neighbor) <= self.thresholds.clothing_color_distance {
                    close += 1;
                }
            }
        }
        if total == 0 {
            0.0
        } else {
            close as f32 / total as f32
        }
    }
}
