//! Background replacement on already-cut subjects


use fixtures::png;
use heuristic_bgremove::{
    compose_background, compose_background_raw, compose_image, remove_background,
    BackgroundConfig, BgRemovalError, CompositingOptions, OutputFormat, ProcessingOptions,
    ProcessingResult, ResourceLimits, Result,
};
use image::{Rgba, RgbaImage};

fn decode(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

/// 10x10 transparent canvas with an opaque blue 4x4 subject in the middle
fn cut_subject() -> RgbaImage {
    RgbaImage::from_fn(10, 10, |x, y| {
        if (3..7).contains(&x) && (3..7).contains(&y) {
            Rgba([0, 0, 255, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

#[test]
fn test_solid_color_fills_a_transparent_image() -> Result<()> {
    let subject = png(&RgbaImage::new(10, 10));
    let out = compose_background(
        &subject,
        &BackgroundConfig::color("#ff0000"),
        &CompositingOptions::default(),
    )?;

    let composed = decode(&out);
    assert_eq!(composed.dimensions(), (10, 10));
    assert!(composed.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    Ok(())
}

#[test]
fn test_subject_stays_on_top_of_the_color() -> Result<()> {
    let composed = compose_image(
        &cut_subject(),
        &BackgroundConfig::color("#00ff00"),
        &CompositingOptions::default(),
    )?;
    assert_eq!(composed.get_pixel(5, 5).0, [0, 0, 255, 255]);
    assert_eq!(composed.get_pixel(0, 0).0, [0, 255, 0, 255]);
    Ok(())
}

#[test]
fn test_transparent_background_is_unchanged() -> Result<()> {
    let subject = cut_subject();
    let composed = compose_image(
        &subject,
        &BackgroundConfig::transparent(),
        &CompositingOptions::default(),
    )?;
    assert_eq!(composed, subject);
    Ok(())
}

#[test]
fn test_vertical_gradient_runs_top_to_bottom() -> Result<()> {
    let composed = compose_image(
        &RgbaImage::new(10, 20),
        &BackgroundConfig::gradient("#000000,#ffffff"),
        &CompositingOptions::default(),
    )?;

    let top = composed.get_pixel(5, 0).0[0];
    let bottom = composed.get_pixel(5, 19).0[0];
    assert!(top < 20, "top {top}");
    assert!(bottom > 235, "bottom {bottom}");
    assert!(composed.pixels().all(|p| p.0[3] == 255));
    Ok(())
}

#[test]
fn test_blurred_original_replaces_the_background() -> Result<()> {
    let original = RgbaImage::from_fn(10, 10, |x, _| {
        if x < 5 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let config = BackgroundConfig::blur(2.0).with_image_data(png(&original));
    let composed = compose_image(&RgbaImage::new(10, 10), &config, &CompositingOptions::default())?;

    // The hard black/white edge is softened
    let near_edge = composed.get_pixel(4, 5).0[0];
    assert!(near_edge > 0 && near_edge < 255);
    assert!(composed.pixels().all(|p| p.0[3] == 255));
    Ok(())
}

#[test]
fn test_image_background_covers_the_canvas() -> Result<()> {
    let backdrop = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
    let config = BackgroundConfig::image("backdrop.png", png(&backdrop));
    let composed = compose_image(&cut_subject(), &config, &CompositingOptions::default())?;

    assert_eq!(composed.dimensions(), (10, 10));
    assert_eq!(composed.get_pixel(0, 9).0, [10, 20, 30, 255]);
    assert_eq!(composed.get_pixel(4, 4).0, [0, 0, 255, 255]);
    Ok(())
}

#[test]
fn test_drop_shadow_darkens_the_offset_area() -> Result<()> {
    let options = CompositingOptions {
        shadow_intensity: 0.8,
        shadow_offset: (2, 2),
        shadow_softness: 0.0,
        ..CompositingOptions::default()
    };
    let composed = compose_image(&cut_subject(), &BackgroundConfig::color("#ffffff"), &options)?;

    // (8, 8) is under the shifted shadow only; (1, 1) is plain background
    assert!(composed.get_pixel(8, 8).0[0] < 100);
    assert_eq!(composed.get_pixel(1, 1).0, [255, 255, 255, 255]);
    Ok(())
}

#[test]
fn test_invalid_background_values() {
    let subject = png(&cut_subject());
    let options = CompositingOptions::default();

    let err = compose_background(&subject, &BackgroundConfig::color("#zzzzzz"), &options)
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidConfig(_)));

    let err = compose_background(&subject, &BackgroundConfig::gradient("#ffffff"), &options)
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidConfig(_)));

    let bad_shadow = CompositingOptions {
        shadow_intensity: 2.0,
        ..CompositingOptions::default()
    };
    assert!(compose_background(&subject, &BackgroundConfig::color("#fff"), &bad_shadow).is_err());
}

#[test]
fn test_removal_then_compose_is_fully_opaque() -> Result<()> {
    let result = remove_background(
        &png(&fixtures::red_square_on_green()),
        &ProcessingOptions::default(),
    )?;
    let out = compose_background(
        &result.encoded,
        &BackgroundConfig::color("#0000ff"),
        &CompositingOptions::default(),
    )?;
    let composed = decode(&out);
    assert_eq!(composed.dimensions(), (100, 100));
    assert!(composed.pixels().all(|p| p.0[3] == 255));
    Ok(())
}

fn removal_output(format: OutputFormat) -> Result<ProcessingResult> {
    let options = ProcessingOptions::builder().output_format(format).build()?;
    remove_background(&png(&fixtures::red_square_on_green()), &options)
}

#[test]
fn test_transparent_compose_of_removal_output_is_a_no_op() -> Result<()> {
    let result = removal_output(OutputFormat::Png)?;
    let out = compose_background(
        &result.encoded,
        &BackgroundConfig::transparent(),
        &CompositingOptions::default(),
    )?;
    assert_eq!(decode(&out), result.image);
    Ok(())
}

#[cfg(feature = "webp-support")]
#[test]
fn test_transparent_compose_of_webp_output_is_a_no_op() -> Result<()> {
    let result = removal_output(OutputFormat::WebP)?;
    let options = CompositingOptions {
        output_format: OutputFormat::WebP,
        ..CompositingOptions::default()
    };
    let out = compose_background(&result.encoded, &BackgroundConfig::transparent(), &options)?;

    let composed = decode(&out);
    assert_eq!(composed, decode(&result.encoded));
    assert!(composed
        .pixels()
        .zip(result.image.pixels())
        .all(|(a, b)| a.0[3] == b.0[3]));
    Ok(())
}

#[test]
fn test_raw_removal_output_composes_with_dimensions() -> Result<()> {
    let result = removal_output(OutputFormat::Rgba8)?;
    let (width, height) = result.dimensions();

    // Raw bytes have no header to read the size from
    let err = compose_background(
        &result.encoded,
        &BackgroundConfig::transparent(),
        &CompositingOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
    assert!(err.to_string().contains("compose_background_raw"));

    let out = compose_background_raw(
        &result.encoded,
        width,
        height,
        &BackgroundConfig::transparent(),
        &CompositingOptions::default(),
    )?;
    assert_eq!(decode(&out), result.image);

    let err = compose_background_raw(
        &result.encoded,
        width + 1,
        height,
        &BackgroundConfig::transparent(),
        &CompositingOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    Ok(())
}

#[test]
fn test_subject_decode_follows_compositing_limits() -> Result<()> {
    let result = removal_output(OutputFormat::Png)?;
    let size = result.encoded.len() as u64;

    let tight = CompositingOptions {
        limits: ResourceLimits {
            max_input_bytes: size - 1,
            ..ResourceLimits::default()
        },
        ..CompositingOptions::default()
    };
    let err = compose_background(&result.encoded, &BackgroundConfig::color("#fff"), &tight)
        .unwrap_err();
    assert!(matches!(
        err,
        BgRemovalError::InputTooLarge { actual, limit, .. } if actual == size && limit == size - 1
    ));

    let exact = CompositingOptions {
        limits: ResourceLimits {
            max_input_bytes: size,
            ..ResourceLimits::default()
        },
        ..CompositingOptions::default()
    };
    compose_background(&result.encoded, &BackgroundConfig::color("#fff"), &exact)?;
    Ok(())
}

#[test]
fn test_blur_original_follows_compositing_limits() {
    let original = png(&fixtures::red_square_on_green());
    let config = BackgroundConfig::blur(2.0).with_image_data(original);
    let options = CompositingOptions {
        limits: ResourceLimits {
            max_input_pixels: 100 * 100 - 1,
            ..ResourceLimits::default()
        },
        ..CompositingOptions::default()
    };
    let err = compose_image(&RgbaImage::new(10, 10), &config, &options).unwrap_err();
    assert!(matches!(
        err,
        BgRemovalError::InputTooLarge {
            what: "input pixels",
            ..
        }
    ));
}
