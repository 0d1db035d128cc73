//! Error types for the photometry pipeline.

use thiserror::Error;

/// Failures that terminate a photometry call.
///
/// Per-frame problems that only exclude a frame are reported as
/// [`FrameRejection`](crate::extractor::FrameRejection) instead.
#[derive(Debug, Error)]
pub enum PhotometryError {
    /// Sky background in the aperture is at least as large as the aperture sum.
    #[error(
        "frame {frame}: aperture sum {aperture_sum:.6} does not exceed background in aperture {background_in_target:.6}"
    )]
    BackgroundDominated {
        frame: String,
        aperture_sum: f64,
        background_in_target: f64,
    },

    /// Outer annulus radius does not fit in the centroid window.
    #[error("outer background radius {r_out:.3} px exceeds centroid box half-width {box_w} px")]
    ApertureOutOfBox { r_out: f64, box_w: usize },

    #[error("unknown telescope '{name}' (known: {known})")]
    UnknownTelescope { name: String, known: String },

    #[error("invalid telescope keyword table: {0}")]
    KeywordTable(String),

    #[error("failed to read frame {frame}")]
    FrameRead {
        frame: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no usable frames for star {star}")]
    NoGoodFrames { star: String },

    /// Series that should share one frame index have different lengths.
    #[error("series for star {star} has {len} frames after alignment, expected {expected}")]
    MisalignedSeries {
        star: String,
        len: usize,
        expected: usize,
    },

    #[error("star {star} not found in target catalog")]
    UnknownStar { star: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write photometric summary to {path}")]
    Summary {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PhotometryError>;
