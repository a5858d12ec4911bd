//! Per-pixel color helpers

use image::Rgba;

/// Rec. 601 luma in `[0, 255]`
#[inline]
#[must_use]
pub fn luminance(pixel: &Rgba<u8>) -> f32 {
    let [r, g, b, _] = pixel.0;
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

/// HSV saturation in `[0, 1]`
#[inline]
#[must_use]
pub fn saturation(pixel: &Rgba<u8>) -> f32 {
    let [r, g, b, _] = pixel.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        0.0
    } else {
        f32::from(max - min) / f32::from(max)
    }
}

/// HSV value (brightness) in `[0, 255]`
#[inline]
#[must_use]
pub fn brightness(pixel: &Rgba<u8>) -> f32 {
    let [r, g, b, _] = pixel.0;
    f32::from(r.max(g).max(b))
}

/// Euclidean distance between two RGB triples
#[inline]
#[must_use]
pub fn rgb_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

#[inline]
#[must_use]
pub fn rgb_f32(pixel: &Rgba<u8>) -> [f32; 3] {
    [
        f32::from(pixel.0[0]),
        f32::from(pixel.0[1]),
        f32::from(pixel.0[2]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_extremes() {
        assert!(luminance(&Rgba([0, 0, 0, 255])).abs() < 1e-3);
        assert!((luminance(&Rgba([255, 255, 255, 255])) - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_saturation() {
        assert_eq!(saturation(&Rgba([0, 0, 0, 255])), 0.0);
        assert_eq!(saturation(&Rgba([120, 120, 120, 255])), 0.0);
        assert!((saturation(&Rgba([255, 0, 0, 255])) - 1.0).abs() < 1e-6);
        assert!((brightness(&Rgba([10, 200, 30, 255])) - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_rgb_distance() {
        assert!((rgb_distance([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]) - 5.0).abs() < 1e-6);
    }
}
