//! Luminance plane and neighborhood statistics

use super::color::luminance;
use image::RgbaImage;
use rayon::prelude::*;

/// Row-major `f32` luminance plane with clamped-edge sampling
#[derive(Debug, Clone)]
pub struct LumaPlane {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl LumaPlane {
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let data = image.pixels().map(luminance).collect();
        Self {
            width,
            height,
            data,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Sample with coordinates clamped to the plane
    #[inline]
    #[must_use]
    pub fn get_clamped(&self, x: i64, y: i64) -> f32 {
        let cx = x.clamp(0, i64::from(self.width) - 1) as u32;
        let cy = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.get(cx, cy)
    }

    /// Sobel gradient `(gx, gy)` with taps `offset` pixels apart
    #[inline]
    #[must_use]
    pub fn sobel(&self, x: u32, y: u32, offset: i64) -> (f32, f32) {
        let (x, y) = (i64::from(x), i64::from(y));
        let p = |dx: i64, dy: i64| self.get_clamped(x + dx * offset, y + dy * offset);

        let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
        let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
        (gx, gy)
    }

    /// Per-pixel Sobel magnitude at unit offset, normalized to `[0, ~255]`
    #[must_use]
    pub fn sobel_magnitudes(&self) -> Vec<f32> {
        let width = self.width as usize;
        let mut out = vec![0.0f32; self.data.len()];
        if width == 0 {
            return out;
        }
        out.par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    let (gx, gy) = self.sobel(x as u32, y as u32, 1);
                    *value = (gx * gx + gy * gy).sqrt() / 4.0;
                }
            });
        out
    }

    /// Local luminance variance over a `(2r+1)^2` window
    #[must_use]
    pub fn local_variance(&self, radius: u32) -> Vec<f32> {
        let integral = IntegralImage::new(&self.data, self.width, self.height);
        let width = self.width as usize;
        let mut out = vec![0.0f32; self.data.len()];
        if width == 0 {
            return out;
        }
        out.par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    *value = integral.variance(x as u32, y as u32, radius);
                }
            });
        out
    }
}

/// Summed-area tables of values and squared values
struct IntegralImage {
    width: u32,
    height: u32,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImage {
    fn new(data: &[f32], width: u32, height: u32) -> Self {
        let stride = width as usize + 1;
        let mut sum = vec![0.0f64; stride * (height as usize + 1)];
        let mut sum_sq = vec![0.0f64; sum.len()];

        for y in 0..height as usize {
            let mut row_sum = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..width as usize {
                let v = f64::from(data[y * width as usize + x]);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }

        Self {
            width,
            height,
            sum,
            sum_sq,
        }
    }

    fn variance(&self, x: u32, y: u32, radius: u32) -> f32 {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(self.width) as usize;
        let y1 = (y + radius + 1).min(self.height) as usize;
        let stride = self.width as usize + 1;
        let n = ((x1 - x0) * (y1 - y0)) as f64;

        let area = |table: &[f64]| {
            table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
                + table[y0 * stride + x0]
        };
        let mean = area(&self.sum) / n;
        let variance = area(&self.sum_sq) / n - mean * mean;
        variance.max(0.0) as f32
    }
}
