//! Integration tests for per-star extraction on synthetic frame sequences.

mod synthetic_data;

use diffphot::{
    ApertureGeometry, ApertureMethod, ExtractorConfig, FrameRejection, InMemoryFrames,
    TelescopeKeywords, TimeSeriesExtractor,
};
use synthetic_data::{build_frame, seeded_rng, star_at, FrameSpec, Source};

fn extractor(r: f64, box_w: usize) -> TimeSeriesExtractor {
    let keywords = TelescopeKeywords::builtin().unwrap();
    let config = ExtractorConfig {
        geometry: ApertureGeometry::new(r, box_w),
        ..Default::default()
    };
    TimeSeriesExtractor::new(config, keywords.keywords_for("TESS").unwrap().clone())
}

/// Ten noise-free frames of a 10000-count star on a sky of 50 counts per pixel.
#[test]
fn test_ten_frame_stack_recovers_flux() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let star = star_at("target", 50.3, 49.6);
    let frames: InMemoryFrames = (0..10)
        .map(|i| {
            let mut spec = FrameSpec::new(i, vec![Source::new(&star, 10_000.0)]);
            // small pointing jitter
            spec.shift = (0.1 * i as f64, -0.07 * i as f64);
            build_frame(&spec, (100, 100), 50.0, 1.5, None)
        })
        .collect();

    let series = extractor(5.0, 20).extract(&star, &frames).unwrap();
    assert_eq!(series.len(), 10);
    for (i, &counts) in series.counts().iter().enumerate() {
        assert!(
            (counts - 10_000.0).abs() / 10_000.0 < 0.01,
            "frame {i}: net counts {counts}"
        );
    }
    // background under the aperture is the per-pixel sky times π r²
    let area = std::f64::consts::PI * 25.0;
    for &b in series.background_in_target() {
        assert!((b - 50.0 * area).abs() < 1e-3 * area, "{b}");
    }
    // the refined centroid follows the jitter
    for i in 0..10 {
        let expected_x = 50.3 + 0.1 * i as f64;
        assert!((series.centroid_x()[i] - expected_x).abs() < 1e-2);
    }
}

#[test]
fn test_lock_step_and_rejections() {
    let star = star_at("target", 40.0, 40.0);
    let frames: InMemoryFrames = (0..6)
        .map(|i| {
            let mut spec = FrameSpec::new(i, vec![Source::new(&star, 20_000.0)]);
            spec.with_wcs = i != 2;
            if i == 4 {
                // pushes the window off the frame
                spec.shift = (35.0, 0.0);
            }
            build_frame(&spec, (80, 80), 100.0, 1.3, None)
        })
        .collect();

    let series = extractor(3.0, 10).extract(&star, &frames).unwrap();
    let n = series.good_frames().len();
    assert_eq!(n, 4);
    assert_eq!(series.counts().len(), n);
    assert_eq!(series.background_in_target().len(), n);
    assert_eq!(series.exposure_s().len(), n);
    assert_eq!(series.x().len(), n);
    assert_eq!(series.y().len(), n);
    assert_eq!(series.times().len(), n);

    let reasons: Vec<(usize, &FrameRejection)> = series
        .rejections()
        .iter()
        .map(|r| (r.index, &r.reason))
        .collect();
    assert_eq!(reasons.len(), 2);
    assert_eq!(reasons[0], (2, &FrameRejection::NoCelestialWcs));
    assert!(matches!(reasons[1], (4, FrameRejection::OutOfBounds { .. })));

    // exposure in seconds, times from TSTART
    assert!((series.exposure_s()[0] - 0.02 * 86_400.0).abs() < 1e-9);
    assert_eq!(series.times()[0], 1400.0);
}

#[test]
fn test_annulus_outside_box_processes_nothing() {
    let star = star_at("target", 40.0, 40.0);
    let frames: InMemoryFrames = (0..3)
        .map(|i| {
            let spec = FrameSpec::new(i, vec![Source::new(&star, 10_000.0)]);
            build_frame(&spec, (80, 80), 50.0, 1.5, None)
        })
        .collect();

    // r_out = 22 > box_w = 20
    let series = extractor(10.0, 20).extract(&star, &frames).unwrap();
    assert!(series.is_empty());
    assert!(series.counts().is_empty());
    assert!(series.times().is_empty());
}

#[test]
fn test_aperture_methods_agree_with_noise() {
    let star = star_at("target", 40.4, 39.8);
    let mut rng = seeded_rng(7);
    let frames: InMemoryFrames = (0..5)
        .map(|i| {
            let spec = FrameSpec::new(i, vec![Source::new(&star, 50_000.0)]);
            build_frame(&spec, (80, 80), 200.0, 1.2, Some((3.0, &mut rng)))
        })
        .collect();

    let keywords = TelescopeKeywords::builtin().unwrap();
    let tess = keywords.keywords_for("TESS").unwrap().clone();
    let run = |method: ApertureMethod| {
        let config = ExtractorConfig {
            geometry: ApertureGeometry::new(4.0, 12),
            method,
            ..Default::default()
        };
        TimeSeriesExtractor::new(config, tess.clone())
            .extract(&star, &frames)
            .unwrap()
    };
    let exact = run(ApertureMethod::Exact);
    let subpixel = run(ApertureMethod::subpixel());
    for (e, s) in exact.counts().iter().zip(subpixel.counts()) {
        assert!((e - s).abs() / e < 0.005, "exact {e} vs subpixel {s}");
        assert!((e - 50_000.0).abs() / 50_000.0 < 0.02, "{e}");
    }
}
