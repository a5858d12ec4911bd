//! End-to-end segmentation scenarios on synthetic images


use fixtures::{in_square, init_logging, png, red_square_on_green, uniform};
use heuristic_bgremove::{
    remove_background, BackgroundRemovalProcessor, Mask, PrimaryAlgorithm, ProcessingOptions,
    Result,
};
use image::{DynamicImage, Rgba};

#[test]
fn test_red_square_on_green_is_segmented() -> Result<()> {
    init_logging();
    let options = ProcessingOptions::builder()
        .primary_algorithm(PrimaryAlgorithm::Auto)
        .sensitivity(25)
        .build()?;
    let result = remove_background(&png(&red_square_on_green()), &options)?;

    let (mut bg_total, mut bg_hits, mut fg_total, mut fg_hits) = (0u32, 0u32, 0u32, 0u32);
    for y in 0..100 {
        for x in 0..100 {
            let value = result.mask.get(x, y);
            if in_square(x, y) {
                fg_total += 1;
                fg_hits += u32::from(value < Mask::MIDPOINT);
            } else {
                bg_total += 1;
                bg_hits += u32::from(value > Mask::MIDPOINT);
            }
        }
    }

    let bg_share = bg_hits as f32 / bg_total as f32;
    let fg_share = fg_hits as f32 / fg_total as f32;
    assert!(bg_share >= 0.95, "background share {bg_share}");
    assert!(fg_share >= 0.90, "square share {fg_share}");

    // Alpha is the inverse of the mask
    let alpha = result.image.get_pixel(50, 50).0[3];
    assert_eq!(alpha, 255 - result.mask.get(50, 50));
    Ok(())
}

#[test]
fn test_uniform_image_degrades_to_background() -> Result<()> {
    init_logging();
    let result = remove_background(
        &png(&uniform(50, 50, Rgba([90, 140, 200, 255]))),
        &ProcessingOptions::default(),
    )?;

    let background = result
        .mask
        .as_slice()
        .iter()
        .filter(|&&v| v >= Mask::MIDPOINT)
        .count();
    assert!(background as f32 / 2500.0 > 0.9);
    assert!(result.objects_detected.is_empty());
    Ok(())
}

#[test]
fn test_regions_stay_inside_the_image() -> Result<()> {
    let processor = BackgroundRemovalProcessor::new(ProcessingOptions::default())?;
    let result = processor.process_image(&DynamicImage::ImageRgba8(red_square_on_green()))?;

    assert!(!result.regions.is_empty());
    for region in &result.regions {
        assert!(region.bounds.fits_within(100, 100));
        assert!((0.0..=1.0).contains(&region.confidence));
    }
    assert!((0.0..=1.0).contains(&result.confidence));
    Ok(())
}

#[test]
fn test_result_reports_every_generator() -> Result<()> {
    let result = remove_background(&png(&red_square_on_green()), &ProcessingOptions::default())?;

    assert_eq!(result.generator_reports.len(), 5);
    assert_eq!(result.models_used.len(), 5);
    let weight_sum: f32 = result.generator_reports.iter().map(|r| r.weight).sum();
    assert!((weight_sum - 1.0).abs() < 1e-4);
    for report in &result.generator_reports {
        assert!((0.0..=1.0).contains(&report.confidence));
    }

    let metrics = &result.quality_metrics;
    for value in [
        metrics.edge_accuracy,
        metrics.detail_preservation,
        metrics.background_cleanness,
    ] {
        assert!((0.0..=1.0).contains(&value));
    }
    Ok(())
}

#[test]
fn test_output_keeps_original_resolution_when_downscaled() -> Result<()> {
    let options = ProcessingOptions::builder().max_dimensions(50, 50).build()?;
    let result = remove_background(&png(&red_square_on_green()), &options)?;

    assert_eq!(result.dimensions(), (100, 100));
    assert_eq!(result.mask.dimensions(), (100, 100));
    assert_eq!(result.metadata.working_dimensions, (50, 50));
    Ok(())
}
