//! Reproducibility and resource-governor behavior


use fixtures::{png, red_square_on_green};
use heuristic_bgremove::{
    governor::{compute_working_resolution, pixel_ceiling},
    remove_background, remove_background_from_bytes, PrimaryAlgorithm, ProcessingOptions,
    ResourceLimits, Result,
};
use image::{Rgba, RgbaImage};

/// Noisy scene so that k-means initialization matters
fn speckled() -> RgbaImage {
    RgbaImage::from_fn(64, 48, |x, y| {
        let v = ((x * 37 + y * 91) % 256) as u8;
        if (20..44).contains(&x) && (12..36).contains(&y) {
            Rgba([200, v / 4, 40, 255])
        } else {
            Rgba([v / 3, 120, v, 255])
        }
    })
}

#[test]
fn test_same_seed_gives_identical_results() -> Result<()> {
    let bytes = png(&speckled());
    let options = ProcessingOptions::builder().seed(1234).build()?;

    let first = remove_background(&bytes, &options)?;
    let second = remove_background(&bytes, &options)?;

    assert_eq!(first.mask, second.mask);
    assert_eq!(first.encoded, second.encoded);
    assert_eq!(first.regions, second.regions);
    assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
    Ok(())
}

#[test]
fn test_default_seed_is_fixed() -> Result<()> {
    let bytes = png(&speckled());
    let a = remove_background(&bytes, &ProcessingOptions::default())?;
    let b = remove_background(&bytes, &ProcessingOptions::default())?;
    assert_eq!(a.mask, b.mask);
    assert_eq!(a.metadata.seed, ProcessingOptions::default().seed);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_jobs_match_sequential_runs() -> Result<()> {
    let bytes = png(&red_square_on_green());
    let options = ProcessingOptions::builder()
        .primary_algorithm(PrimaryAlgorithm::Precise)
        .build()?;
    let expected = remove_background(&bytes, &options)?;

    let jobs: Vec<_> = (0..4)
        .map(|_| {
            let bytes = bytes.clone();
            let options = options.clone();
            tokio::spawn(async move { remove_background_from_bytes(bytes, &options).await })
        })
        .collect();

    for job in jobs {
        let result = job.await.unwrap()?;
        assert_eq!(result.mask, expected.mask);
    }
    Ok(())
}

#[test]
fn test_governor_respects_the_memory_ceiling() -> Result<()> {
    let limits = ResourceLimits {
        memory_ceiling_bytes: 4 * 8 * 10_000,
        ..ResourceLimits::default()
    };
    assert_eq!(pixel_ceiling(&limits, false), 10_000);
    assert_eq!(pixel_ceiling(&limits, true), 5_000);

    let options = ProcessingOptions::builder().limits(limits).build()?;
    let resolution = compute_working_resolution(400, 300, &options)?;
    let (w, h) = resolution.working;
    assert!(u64::from(w) * u64::from(h) <= 10_000);
    // Aspect ratio survives the downscale
    assert!((w as f32 / h as f32 - 4.0 / 3.0).abs() < 0.05);
    assert!(resolution.is_downscaled());
    Ok(())
}

#[test]
fn test_small_inputs_are_not_resized() -> Result<()> {
    let resolution = compute_working_resolution(120, 80, &ProcessingOptions::default())?;
    assert_eq!(resolution.working, (120, 80));
    assert!((resolution.scale - 1.0).abs() < f32::EPSILON);
    Ok(())
}
