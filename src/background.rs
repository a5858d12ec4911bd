//! Background compositor
//!
//! Draws a transparent subject over a new background (flat color, linear
//! gradient, blurred photo or external image), optionally with a soft drop
//! shadow beneath it.

use crate::{
    config::{BackgroundConfig, BackgroundKind, CompositingOptions, ResourceLimits},
    error::{BgRemovalError, Result},
    services::{ImageIOService, OutputFormatHandler},
};
use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::instrument;

const DEFAULT_BLUR_SIGMA: f32 = 10.0;
const DEFAULT_GRADIENT_ANGLE: f32 = 180.0;

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (the `#` is optional)
///
/// # Errors
/// `InvalidConfig` for any other shape or non-hex digits.
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let invalid = || {
        BgRemovalError::invalid_config(format!(
            "Invalid color '{value}' (expected #rgb, #rrggbb or #rrggbbaa)"
        ))
    };
    if !hex.is_ascii() {
        return Err(invalid());
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());

    match hex.len() {
        3 => {
            let mut channels = [255u8; 4];
            for (slot, digit) in channels.iter_mut().zip(hex.chars()) {
                let nibble = digit.to_digit(16).ok_or_else(invalid)? as u8;
                *slot = nibble * 17;
            }
            Ok(Rgba(channels))
        },
        6 | 8 => {
            let mut channels = [255u8; 4];
            for (i, slot) in channels.iter_mut().take(hex.len() / 2).enumerate() {
                *slot = byte(&hex[i * 2..i * 2 + 2])?;
            }
            Ok(Rgba(channels))
        },
        _ => Err(invalid()),
    }
}

/// Gradient stops plus angle in degrees
#[derive(Debug, Clone, PartialEq)]
pub struct GradientSpec {
    pub stops: Vec<Rgba<u8>>,
    pub angle: f32,
}

/// Parse `"#c1,#c2[,...][;angle]"`
///
/// # Errors
/// `InvalidConfig` for fewer than two stops, a bad color or a bad angle.
pub fn parse_gradient(value: &str) -> Result<GradientSpec> {
    let (stops_part, angle_part) = match value.split_once(';') {
        Some((stops, angle)) => (stops, Some(angle.trim())),
        None => (value, None),
    };
    let stops = stops_part
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_hex_color)
        .collect::<Result<Vec<_>>>()?;
    if stops.len() < 2 {
        return Err(BgRemovalError::invalid_config(format!(
            "Gradient '{value}' needs at least two color stops"
        )));
    }
    let angle = match angle_part {
        Some(text) => text
            .trim_end_matches("deg")
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|a| a.is_finite())
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!("Invalid gradient angle '{text}'"))
            })?,
        None => DEFAULT_GRADIENT_ANGLE,
    };
    Ok(GradientSpec { stops, angle })
}

fn lerp_color(a: Rgba<u8>, b: Rgba<u8>, t: f32) -> Rgba<u8> {
    let mut out = [0u8; 4];
    for (c, slot) in out.iter_mut().enumerate() {
        let v = f32::from(a.0[c]) + (f32::from(b.0[c]) - f32::from(a.0[c])) * t;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Render a linear gradient; 180 degrees runs top to bottom, 90 left to right
#[must_use]
pub fn render_gradient(spec: &GradientSpec, width: u32, height: u32) -> RgbaImage {
    let radians = spec.angle.to_radians();
    let (dx, dy) = (radians.sin(), -radians.cos());
    let (w, h) = (width as f32, height as f32);
    let half_length = ((w * dx.abs() + h * dy.abs()) / 2.0).max(f32::EPSILON);
    let segments = (spec.stops.len() - 1) as f32;

    let mut image = RgbaImage::new(width, height);
    let row_len = width as usize * 4;
    if row_len == 0 {
        return image;
    }
    image.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let py = y as f32 + 0.5 - h / 2.0;
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let px = x as f32 + 0.5 - w / 2.0;
            let t = ((px * dx + py * dy) / half_length / 2.0 + 0.5).clamp(0.0, 1.0);
            let scaled = t * segments;
            let index = (scaled.floor() as usize).min(spec.stops.len() - 2);
            let color = lerp_color(spec.stops[index], spec.stops[index + 1], scaled - index as f32);
            pixel.copy_from_slice(&color.0);
        }
    });
    image
}

/// Scale `source` to cover `width x height` and center-crop it
#[must_use]
pub fn cover(source: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (sw, sh) = source.dimensions();
    if sw == 0 || sh == 0 {
        return RgbaImage::new(width, height);
    }
    let scale = (width as f32 / sw as f32).max(height as f32 / sh as f32);
    let scaled_w = ((sw as f32 * scale).ceil() as u32).max(width);
    let scaled_h = ((sh as f32 * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(source, scaled_w, scaled_h, FilterType::Triangle);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

/// Draw `top` over `bottom` with straight-alpha source-over
pub fn draw_over(bottom: &mut RgbaImage, top: &RgbaImage) {
    let row_len = bottom.width() as usize * 4;
    if row_len == 0 || bottom.dimensions() != top.dimensions() {
        return;
    }
    bottom
        .par_chunks_mut(row_len)
        .zip(top.par_chunks(row_len))
        .for_each(|(dst_row, src_row)| {
            for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let sa = f32::from(src[3]) / 255.0;
                let da = f32::from(dst[3]) / 255.0;
                let out_a = sa + da * (1.0 - sa);
                if out_a <= 0.0 {
                    dst.copy_from_slice(&[0, 0, 0, 0]);
                    continue;
                }
                for c in 0..3 {
                    let v = (f32::from(src[c]) * sa + f32::from(dst[c]) * da * (1.0 - sa)) / out_a;
                    dst[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        });
}

/// Black shadow layer: subject alpha shifted by `offset`, scaled and blurred
#[must_use]
pub fn shadow_layer(subject: &RgbaImage, offset: (i32, i32), intensity: f32, softness: f32) -> RgbaImage {
    let (w, h) = subject.dimensions();
    let intensity = intensity.clamp(0.0, 1.0);
    let layer = RgbaImage::from_fn(w, h, |x, y| {
        let sx = i64::from(x) - i64::from(offset.0);
        let sy = i64::from(y) - i64::from(offset.1);
        if sx < 0 || sy < 0 || sx >= i64::from(w) || sy >= i64::from(h) {
            return Rgba([0, 0, 0, 0]);
        }
        let alpha = f32::from(subject.get_pixel(sx as u32, sy as u32).0[3]) * intensity;
        Rgba([0, 0, 0, alpha.round() as u8])
    });
    if softness > 0.5 {
        imageops::blur(&layer, softness)
    } else {
        layer
    }
}

fn decode_rgba(bytes: &[u8], what: &str, limits: &ResourceLimits) -> Result<RgbaImage> {
    let decoded = ImageIOService::decode_guarded(bytes, limits)?;
    log::debug!(
        "Decoded {} ({:?}, {}x{})",
        what,
        decoded.format,
        decoded.image.width(),
        decoded.image.height()
    );
    Ok(decoded.image.to_rgba8())
}

fn blur_source(
    subject: &RgbaImage,
    config: &BackgroundConfig,
    limits: &ResourceLimits,
) -> Result<RgbaImage> {
    let (w, h) = subject.dimensions();
    let source = match &config.image_data {
        Some(bytes) => {
            let original = decode_rgba(bytes, "original image", limits)?;
            if original.dimensions() == (w, h) {
                original
            } else {
                imageops::resize(&original, w, h, FilterType::Triangle)
            }
        },
        None => subject.clone(),
    };
    let sigma = config.blur_amount.unwrap_or(DEFAULT_BLUR_SIGMA);
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(BgRemovalError::config_value_error(
            "blur amount",
            sigma,
            ">= 0",
            Some(DEFAULT_BLUR_SIGMA),
        ));
    }
    let mut blurred = if sigma > 0.0 {
        imageops::blur(&source, sigma)
    } else {
        source
    };
    // The canvas is opaque even where the blur mixed in transparent subject edges
    for pixel in blurred.pixels_mut() {
        pixel.0[3] = 255;
    }
    Ok(blurred)
}

/// Build the background canvas for `config` at the subject's size
///
/// Returns `None` for `Transparent`. Background image bytes are decoded
/// under `limits`.
///
/// # Errors
/// `InvalidConfig` for unparsable values or a missing `Image` payload;
/// decode errors for bad or oversized background bytes.
pub fn render_background(
    subject: &RgbaImage,
    config: &BackgroundConfig,
    limits: &ResourceLimits,
) -> Result<Option<RgbaImage>> {
    let (w, h) = subject.dimensions();
    let canvas = match config.kind {
        BackgroundKind::Transparent => return Ok(None),
        BackgroundKind::Color => RgbaImage::from_pixel(w, h, parse_hex_color(&config.value)?),
        BackgroundKind::Gradient => render_gradient(&parse_gradient(&config.value)?, w, h),
        BackgroundKind::Blur => blur_source(subject, config, limits)?,
        BackgroundKind::Image => {
            let bytes = config.image_data.as_deref().ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Image background '{}' has no image data",
                    config.value
                ))
            })?;
            cover(&decode_rgba(bytes, "background image", limits)?, w, h)
        },
    };
    Ok(Some(canvas))
}

/// Composite an already-decoded subject; returns pixels, not encoded bytes
///
/// # Errors
/// See [`render_background`] and [`CompositingOptions::validate`].
pub fn compose_image(
    subject: &RgbaImage,
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<RgbaImage> {
    options.validate()?;
    let Some(mut canvas) = render_background(subject, config, &options.limits)? else {
        return Ok(subject.clone());
    };

    if options.shadow_intensity > 0.0 {
        let shadow = shadow_layer(
            subject,
            options.shadow_offset,
            options.shadow_intensity,
            options.shadow_softness,
        );
        draw_over(&mut canvas, &shadow);
    }
    draw_over(&mut canvas, subject);
    Ok(canvas)
}

/// Decode `subject_bytes`, composite onto the configured background and encode
///
/// The subject must be an image container (PNG or WebP). Raw RGBA8 output
/// carries no dimensions; use [`compose_background_raw`] for it.
///
/// # Errors
/// Decode, configuration and encode failures. `InputTooLarge` when the
/// subject exceeds `options.limits`.
#[instrument(skip(subject_bytes, config, options), fields(bytes = subject_bytes.len(), kind = ?config.kind))]
pub fn compose_background(
    subject_bytes: &[u8],
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<Vec<u8>> {
    let subject =
        decode_rgba(subject_bytes, "subject", &options.limits).map_err(|err| match err {
            BgRemovalError::UnsupportedFormat(reason) => BgRemovalError::unsupported_format(
                format!("{reason}; raw RGBA8 subjects need compose_background_raw"),
            ),
            other => other,
        })?;
    encode_composed(&subject, config, options)
}

/// Composite a raw RGBA8 subject of `width x height` and encode the result
///
/// # Errors
/// `InvalidConfig` when the buffer length is not `width * height * 4`,
/// `InputTooLarge` past the pixel cap, then as [`compose_background`].
#[instrument(skip(subject_rgba, config, options), fields(kind = ?config.kind))]
pub fn compose_background_raw(
    subject_rgba: &[u8],
    width: u32,
    height: u32,
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<Vec<u8>> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > options.limits.max_input_pixels {
        return Err(BgRemovalError::input_too_large(
            "input pixels",
            pixels,
            options.limits.max_input_pixels,
        ));
    }
    let expected = pixels * 4;
    if subject_rgba.len() as u64 != expected {
        return Err(BgRemovalError::invalid_config(format!(
            "Raw subject is {} bytes, expected {expected} for {width}x{height} RGBA8",
            subject_rgba.len()
        )));
    }
    let subject = RgbaImage::from_raw(width, height, subject_rgba.to_vec()).ok_or_else(|| {
        BgRemovalError::invalid_config(format!("Raw subject does not fit {width}x{height}"))
    })?;
    encode_composed(&subject, config, options)
}

fn encode_composed(
    subject: &RgbaImage,
    config: &BackgroundConfig,
    options: &CompositingOptions,
) -> Result<Vec<u8>> {
    let composed = compose_image(subject, config, options)?;
    log::info!(
        "Composed {:?} background at {}x{}",
        config.kind,
        composed.width(),
        composed.height()
    );
    OutputFormatHandler::encode(&composed, options.output_format, options.quality)
}
