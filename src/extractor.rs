//! Per-star time series extraction over a sequence of frames.
//!
//! For every frame, in source order: locate the star through the frame's
//! WCS, resolve the telescope header fields, cut the centroid window, refine
//! the centroid, and measure the aperture. Frames that cannot be measured are
//! recorded as [`RejectedFrame`]s and skipped; only configuration errors,
//! unreadable frames, and (under [`BackgroundPolicy::Abort`])
//! background-dominated measurements end the extraction early.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::aperture::ApertureMethod;
use crate::centroid::{Centroid, CentroidRefiner, Cutout};
use crate::error::{PhotometryError, Result};
use crate::frame::{Frame, FrameSource};
use crate::header::HeaderFields;
use crate::locator::{ApertureGeometry, FrameLocator, PixelPosition};
use crate::photometer::{ApertureMeasurement, AperturePhotometer};
use crate::target::StarTarget;
use crate::telescope::KeywordMap;

/// Default limit on the number of frames processed per star.
pub const DEFAULT_MAX_FILES: usize = 600;

/// What to do when the sky in the aperture outweighs the star.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundPolicy {
    /// Stop the extraction with [`PhotometryError::BackgroundDominated`].
    #[default]
    Abort,
    /// Record the frame as rejected and continue.
    SkipFrame,
}

/// Configuration for [`TimeSeriesExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Aperture radius and centroid window.
    pub geometry: ApertureGeometry,
    /// Pixel overlap method for the aperture sum.
    pub method: ApertureMethod,
    /// Background masking and Gaussian fit settings.
    pub centroid: CentroidRefiner,
    /// Clip threshold for the background annulus.
    pub annulus_sigma: f64,
    /// Maximum clipping iterations for the background annulus.
    pub annulus_max_iters: usize,
    /// Process at most this many frames per star.
    pub max_files: usize,
    pub background_policy: BackgroundPolicy,
    /// Header fields substituted when a frame lacks the telescope's keywords.
    /// Frames with missing keywords are rejected when this is `None`.
    pub default_fields: Option<HeaderFields>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            geometry: ApertureGeometry::default(),
            method: ApertureMethod::default(),
            centroid: CentroidRefiner::default(),
            annulus_sigma: 3.0,
            annulus_max_iters: 10,
            max_files: DEFAULT_MAX_FILES,
            background_policy: BackgroundPolicy::default(),
            default_fields: None,
        }
    }
}

/// Why a frame contributed nothing to a star's time series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameRejection {
    #[error("frame has no celestial WCS")]
    NoCelestialWcs,
    #[error("star is behind the tangent plane")]
    BehindTangentPlane,
    #[error("predicted position is not finite")]
    NonFinitePosition,
    #[error("centroid window of half-width {box_w} around ({x:.2}, {y:.2}) leaves the frame")]
    OutOfBounds { x: f64, y: f64, box_w: usize },
    #[error("header is missing telescope keywords")]
    MissingHeaderFields,
    #[error("aperture sum {aperture_sum:.3} does not exceed background {background_in_target:.3}")]
    BackgroundDominated {
        aperture_sum: f64,
        background_in_target: f64,
    },
}

/// A frame excluded from a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedFrame {
    pub index: usize,
    pub frame_id: String,
    pub reason: FrameRejection,
}

/// Everything measured for one star on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeasurement {
    pub frame_id: String,
    /// Position predicted by the WCS.
    pub predicted: PixelPosition,
    pub centroid: Centroid,
    pub measurement: ApertureMeasurement,
    pub fields: HeaderFields,
}

/// Lock-step per-frame series for one star.
///
/// Every vector has one entry per good frame; [`push`](Self::push) is the
/// only way to add entries, so the indices always line up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarTimeSeries {
    star: String,
    counts: Vec<f64>,
    background_in_target: Vec<f64>,
    exposure_s: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    centroid_x: Vec<f64>,
    centroid_y: Vec<f64>,
    times: Vec<f64>,
    good_frames: Vec<String>,
    frame_indices: Vec<usize>,
    fields: Vec<HeaderFields>,
    rejections: Vec<RejectedFrame>,
}

impl StarTimeSeries {
    pub fn new(star: impl Into<String>) -> Self {
        Self {
            star: star.into(),
            ..Default::default()
        }
    }

    /// Append the measurement of source frame `index`.
    pub fn push(&mut self, index: usize, m: FrameMeasurement) {
        self.counts.push(m.measurement.net_counts);
        self.background_in_target
            .push(m.measurement.background_in_target);
        self.exposure_s.push(m.fields.exposure_seconds());
        self.x.push(m.predicted.x);
        self.y.push(m.predicted.y);
        self.centroid_x.push(m.centroid.frame_x);
        self.centroid_y.push(m.centroid.frame_y);
        self.times.push(m.fields.observation_time);
        self.good_frames.push(m.frame_id);
        self.frame_indices.push(index);
        self.fields.push(m.fields);
    }

    pub fn reject(&mut self, index: usize, frame_id: String, reason: FrameRejection) {
        self.rejections.push(RejectedFrame {
            index,
            frame_id,
            reason,
        });
    }

    /// Keep only the frames whose source index is in `keep`, preserving order.
    pub fn retain_frames(&self, keep: &HashSet<usize>) -> Self {
        let mut out = Self::new(self.star.clone());
        out.rejections = self.rejections.clone();
        for i in 0..self.len() {
            if !keep.contains(&self.frame_indices[i]) {
                continue;
            }
            out.counts.push(self.counts[i]);
            out.background_in_target.push(self.background_in_target[i]);
            out.exposure_s.push(self.exposure_s[i]);
            out.x.push(self.x[i]);
            out.y.push(self.y[i]);
            out.centroid_x.push(self.centroid_x[i]);
            out.centroid_y.push(self.centroid_y[i]);
            out.times.push(self.times[i]);
            out.good_frames.push(self.good_frames[i].clone());
            out.frame_indices.push(self.frame_indices[i]);
            out.fields.push(self.fields[i].clone());
        }
        out
    }

    pub fn star(&self) -> &str {
        &self.star
    }

    /// Number of good frames.
    pub fn len(&self) -> usize {
        self.good_frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.good_frames.is_empty()
    }

    /// Sky-subtracted aperture counts.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Sky counts under the aperture.
    pub fn background_in_target(&self) -> &[f64] {
        &self.background_in_target
    }

    /// Exposure times in seconds.
    pub fn exposure_s(&self) -> &[f64] {
        &self.exposure_s
    }

    /// Predicted column.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Predicted row.
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Refined centroid column in frame coordinates.
    pub fn centroid_x(&self) -> &[f64] {
        &self.centroid_x
    }

    /// Refined centroid row in frame coordinates.
    pub fn centroid_y(&self) -> &[f64] {
        &self.centroid_y
    }

    /// Observation times in days.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn good_frames(&self) -> &[String] {
        &self.good_frames
    }

    /// Position of each good frame in the frame source.
    pub fn frame_indices(&self) -> &[usize] {
        &self.frame_indices
    }

    pub fn fields(&self) -> &[HeaderFields] {
        &self.fields
    }

    pub fn rejections(&self) -> &[RejectedFrame] {
        &self.rejections
    }
}

/// Measures one star across a [`FrameSource`].
#[derive(Debug, Clone)]
pub struct TimeSeriesExtractor {
    config: ExtractorConfig,
    keywords: KeywordMap,
    locator: FrameLocator,
    photometer: AperturePhotometer,
}

impl TimeSeriesExtractor {
    pub fn new(config: ExtractorConfig, keywords: KeywordMap) -> Self {
        let mut photometer = AperturePhotometer::new(config.geometry, config.method);
        photometer.annulus_sigma = config.annulus_sigma;
        photometer.annulus_max_iters = config.annulus_max_iters;
        Self {
            config,
            keywords,
            locator: FrameLocator::new(),
            photometer,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the time series of `target` from the first `max_files` frames.
    ///
    /// An aperture geometry that does not fit the centroid window stops the
    /// extraction before any frame is read and yields an empty series.
    pub fn extract<S>(&self, target: &StarTarget, source: &S) -> Result<StarTimeSeries>
    where
        S: FrameSource + ?Sized,
    {
        let span = info_span!("star", id = %target.id);
        let _enter = span.enter();

        let mut series = StarTimeSeries::new(target.id.clone());

        if let Err(e) = self.config.geometry.validate() {
            error!(error = %e, "Out of box; choose a smaller outer radius");
            return Ok(series);
        }

        let n = source.len().min(self.config.max_files);
        if source.len() > n {
            info!(
                available = source.len(),
                limit = n,
                "Frame limit reached; later frames are ignored"
            );
        }

        for index in 0..n {
            let frame = source
                .load(index)
                .map_err(|source_err| PhotometryError::FrameRead {
                    frame: source.frame_id(index),
                    source: source_err,
                })?;

            match self.measure_frame(target, &frame)? {
                Ok(m) => series.push(index, m),
                Err(reason) => {
                    debug!(frame = %frame.id, %reason, "Frame rejected");
                    series.reject(index, frame.id, reason);
                }
            }
        }

        if series.is_empty() {
            warn!(examined = n, "No usable frames");
        }
        info!(
            good = series.len(),
            rejected = series.rejections().len(),
            "Finished aperture photometry"
        );
        Ok(series)
    }

    /// Measure `target` on one frame. The outer error ends the extraction;
    /// the inner one only rejects the frame.
    pub fn measure_frame(
        &self,
        target: &StarTarget,
        frame: &Frame,
    ) -> Result<std::result::Result<FrameMeasurement, FrameRejection>> {
        let predicted = match self.locator.locate(&frame.header, &target.coord) {
            Ok(p) => p,
            Err(reason) => return Ok(Err(reason)),
        };

        let fields = match self.keywords.resolve(&frame.header) {
            Some(f) => f,
            None => match &self.config.default_fields {
                Some(default) => default.clone(),
                None => return Ok(Err(FrameRejection::MissingHeaderFields)),
            },
        };

        let box_w = self.config.geometry.box_w;
        let cutout = match Cutout::extract(&frame.data.view(), predicted, box_w) {
            Ok(c) => c,
            Err(reason) => return Ok(Err(reason)),
        };
        let centroid = self.config.centroid.refine(&cutout);

        let result = self
            .photometer
            .measure(&cutout.data.view(), centroid.x, centroid.y, &frame.id);
        let measurement = match result {
            Ok(m) => m,
            Err(PhotometryError::BackgroundDominated {
                aperture_sum,
                background_in_target,
                ..
            }) if self.config.background_policy == BackgroundPolicy::SkipFrame => {
                return Ok(Err(FrameRejection::BackgroundDominated {
                    aperture_sum,
                    background_in_target,
                }));
            }
            Err(e) => return Err(e),
        };

        Ok(Ok(FrameMeasurement {
            frame_id: frame.id.clone(),
            predicted,
            centroid,
            measurement,
            fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::telescope::TelescopeKeywords;
    use ndarray::Array2;

    fn tess_keywords() -> KeywordMap {
        TelescopeKeywords::builtin()
            .unwrap()
            .keywords_for("TESS")
            .unwrap()
            .clone()
    }

    fn frame(id: &str, flux: f64, with_wcs: bool) -> Frame {
        let data = Array2::from_shape_fn((64, 64), |(row, col)| {
            let dx = col as f64 - 32.3;
            let dy = row as f64 - 31.6;
            50.0 + flux / (2.0 * std::f64::consts::PI * 2.25)
                * (-(dx * dx + dy * dy) / (2.0 * 2.25)).exp()
        });
        let mut header = Header::new()
            .with("EXPOSURE", 0.02)
            .with("TSTART", 1400.0)
            .with("CAMERA", 1_i64)
            .with("READNOIA", 10.0)
            .with("GAINA", 5.0);
        if with_wcs {
            header = header
                .with("CTYPE1", "RA---TAN")
                .with("CTYPE2", "DEC--TAN")
                .with("CRPIX1", 33.0)
                .with("CRPIX2", 33.0)
                .with("CRVAL1", 120.0)
                .with("CRVAL2", 10.0)
                .with("CDELT1", -1.0e-3)
                .with("CDELT2", 1.0e-3);
        }
        Frame::new(id, data, header)
    }

    fn config(r: f64, box_w: usize) -> ExtractorConfig {
        ExtractorConfig {
            geometry: ApertureGeometry::new(r, box_w),
            ..Default::default()
        }
    }

    #[test]
    fn test_series_lock_step() {
        let source: crate::frame::InMemoryFrames = vec![
            frame("a", 10_000.0, true),
            frame("b", 10_000.0, false),
            frame("c", 10_000.0, true),
        ]
        .into_iter()
        .collect();
        let extractor = TimeSeriesExtractor::new(config(3.0, 10), tess_keywords());
        let series = extractor
            .extract(&StarTarget::new("star", 120.0, 10.0), &source)
            .unwrap();

        assert_eq!(series.good_frames(), &["a".to_string(), "c".to_string()]);
        assert_eq!(series.frame_indices(), &[0, 2]);
        for len in [
            series.counts().len(),
            series.background_in_target().len(),
            series.exposure_s().len(),
            series.x().len(),
            series.y().len(),
            series.times().len(),
        ] {
            assert_eq!(len, 2);
        }
        assert_eq!(series.rejections().len(), 1);
        assert_eq!(series.rejections()[0].reason, FrameRejection::NoCelestialWcs);
        assert!((series.exposure_s()[0] - 1728.0).abs() < 1e-9);
        assert!((series.centroid_x()[0] - 32.3).abs() < 1e-3);
        assert!((series.centroid_y()[0] - 31.6).abs() < 1e-3);
    }

    #[test]
    fn test_retain_frames_by_source_index() {
        let source: crate::frame::InMemoryFrames =
            (0..3).map(|_| frame("dup", 10_000.0, true)).collect();
        let extractor = TimeSeriesExtractor::new(config(3.0, 10), tess_keywords());
        let series = extractor
            .extract(&StarTarget::new("star", 120.0, 10.0), &source)
            .unwrap();
        assert_eq!(series.len(), 3);

        let kept = series.retain_frames(&HashSet::from([0, 2]));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.frame_indices(), &[0, 2]);
        assert_eq!(kept.counts(), &[series.counts()[0], series.counts()[2]]);
        assert_eq!(kept.times().len(), 2);
    }

    #[test]
    fn test_geometry_outside_box_processes_nothing() {
        let source: crate::frame::InMemoryFrames =
            (0..3).map(|i| frame(&format!("f{i}"), 10_000.0, true)).collect();
        let extractor = TimeSeriesExtractor::new(config(10.0, 20), tess_keywords());
        let series = extractor
            .extract(&StarTarget::new("star", 120.0, 10.0), &source)
            .unwrap();
        assert!(series.is_empty());
        assert!(series.rejections().is_empty());
    }

    #[test]
    fn test_missing_header_fields() {
        let mut f = frame("a", 10_000.0, true);
        f.header = Header::new()
            .with("CTYPE1", "RA---TAN")
            .with("CTYPE2", "DEC--TAN")
            .with("CRPIX1", 33.0)
            .with("CRPIX2", 33.0)
            .with("CRVAL1", 120.0)
            .with("CRVAL2", 10.0)
            .with("CDELT1", -1.0e-3)
            .with("CDELT2", 1.0e-3);
        let target = StarTarget::new("star", 120.0, 10.0);

        let extractor = TimeSeriesExtractor::new(config(3.0, 10), tess_keywords());
        assert_eq!(
            extractor.measure_frame(&target, &f).unwrap(),
            Err(FrameRejection::MissingHeaderFields)
        );

        let mut cfg = config(3.0, 10);
        cfg.default_fields = Some(HeaderFields {
            exposure_days: 1.0 / 86_400.0,
            observation_time: 0.0,
            instrument: "unknown".into(),
            readout_noise: 0.0,
            gain: 1.0,
        });
        let extractor = TimeSeriesExtractor::new(cfg, tess_keywords());
        let m = extractor.measure_frame(&target, &f).unwrap().unwrap();
        assert!((m.fields.exposure_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_background_policy() {
        let source: crate::frame::InMemoryFrames =
            vec![frame("faint", -500.0, true), frame("ok", 10_000.0, true)]
                .into_iter()
                .collect();
        let target = StarTarget::new("star", 120.0, 10.0);

        let abort = TimeSeriesExtractor::new(config(3.0, 10), tess_keywords());
        let err = abort.extract(&target, &source).unwrap_err();
        assert!(matches!(err, PhotometryError::BackgroundDominated { .. }));

        let mut cfg = config(3.0, 10);
        cfg.background_policy = BackgroundPolicy::SkipFrame;
        let skip = TimeSeriesExtractor::new(cfg, tess_keywords());
        let series = skip.extract(&target, &source).unwrap();
        assert_eq!(series.good_frames(), &["ok".to_string()]);
        assert!(matches!(
            series.rejections()[0].reason,
            FrameRejection::BackgroundDominated { .. }
        ));
    }

    #[test]
    fn test_max_files_limit() {
        let source: crate::frame::InMemoryFrames =
            (0..5).map(|i| frame(&format!("f{i}"), 10_000.0, true)).collect();
        let mut cfg = config(3.0, 10);
        cfg.max_files = 3;
        let extractor = TimeSeriesExtractor::new(cfg, tess_keywords());
        let series = extractor
            .extract(&StarTarget::new("star", 120.0, 10.0), &source)
            .unwrap();
        assert_eq!(series.len(), 3);
    }
}
