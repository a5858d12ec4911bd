//! Error conditions and boundary cases of the public API


use fixtures::{png, red_square_on_green, uniform};
use heuristic_bgremove::{
    remove_background, remove_background_from_reader, BackgroundRemovalProcessor, BgRemovalError,
    CancellationToken, ProcessingOptions, ResourceLimits,
};
use image::Rgba;
use std::sync::{Arc, Mutex};

#[test]
fn test_oversized_input_is_rejected_before_decoding() {
    // 21 MB of zeros is not an image; a decode attempt would fail differently
    let bytes = vec![0u8; 21 * 1024 * 1024];
    let err = remove_background(&bytes, &ProcessingOptions::default()).unwrap_err();
    match err {
        BgRemovalError::InputTooLarge { actual, limit, .. } => {
            assert_eq!(actual, 21 * 1024 * 1024);
            assert_eq!(limit, 20 * 1024 * 1024);
        },
        other => panic!("expected InputTooLarge, got {other:?}"),
    }
}

#[test]
fn test_pixel_cap_uses_header_dimensions() {
    let options = ProcessingOptions::builder()
        .limits(ResourceLimits {
            max_input_pixels: 99 * 99,
            ..ResourceLimits::default()
        })
        .build()
        .unwrap();
    let err = remove_background(&png(&red_square_on_green()), &options).unwrap_err();
    assert!(matches!(
        err,
        BgRemovalError::InputTooLarge {
            what: "input pixels",
            ..
        }
    ));
}

#[test]
fn test_garbage_bytes_are_unsupported() {
    let err = remove_background(b"definitely not an image", &ProcessingOptions::default())
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
}

#[test]
fn test_truncated_png_is_a_decode_failure() {
    let mut bytes = png(&uniform(32, 32, Rgba([10, 200, 30, 255])));
    bytes.truncate(bytes.len() / 2);
    let err = remove_background(&bytes, &ProcessingOptions::default()).unwrap_err();
    assert!(matches!(err, BgRemovalError::DecodeFailure(_)));
}

#[test]
fn test_invalid_options_are_rejected() {
    let options = ProcessingOptions {
        smoothing_level: 11,
        ..ProcessingOptions::default()
    };
    let err = BackgroundRemovalProcessor::new(options).unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    assert!(err.to_string().contains("smoothing"));

    let options = ProcessingOptions {
        edge_feathering: Some(0.5),
        ..ProcessingOptions::default()
    };
    assert!(BackgroundRemovalProcessor::new(options).is_err());
}

#[test]
fn test_builder_clamps_out_of_range_values() {
    let options = ProcessingOptions::builder()
        .sensitivity(0)
        .smoothing_level(200)
        .quality(255)
        .build()
        .unwrap();
    assert_eq!(options.sensitivity, 10);
    assert_eq!(options.smoothing_level, 10);
    assert_eq!(options.quality, 100);
}

#[test]
fn test_cancellation_mid_job_stops_at_a_stage_boundary() {
    let token = CancellationToken::new();
    let stages = Arc::new(Mutex::new(Vec::new()));

    let cancel_on = token.clone();
    let seen = Arc::clone(&stages);
    let options = ProcessingOptions::builder()
        .cancellation(token)
        .progress_callback(move |percent, _| {
            seen.lock().unwrap().push(percent);
            // Cancel as soon as resizing is announced
            if percent == 25 {
                cancel_on.cancel();
            }
        })
        .build()
        .unwrap();

    let err = remove_background(&png(&red_square_on_green()), &options).unwrap_err();
    assert!(matches!(err, BgRemovalError::Cancelled { .. }));

    let stages = stages.lock().unwrap();
    assert!(!stages.contains(&100));
}

#[tokio::test]
async fn test_reader_stops_at_the_byte_cap() {
    let options = ProcessingOptions::builder()
        .max_input_bytes(1024)
        .build()
        .unwrap();
    let reader = std::io::Cursor::new(vec![7u8; 64 * 1024]);
    let err = remove_background_from_reader(reader, &options).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::InputTooLarge { actual: 1025, .. }));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let processor = BackgroundRemovalProcessor::new(ProcessingOptions::default()).unwrap();
    let err = processor
        .process_file("/definitely/not/a/real/input.png")
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::Io(_)));
}
