//! # diffphot
//!
//! **Differential aperture photometry** for sequences of plate-solved
//! astronomical frames, written in Rust.
//!
//! Given a target star, a handful of comparison (reference) stars, and an
//! ordered set of calibrated frames with celestial WCS headers, `diffphot`
//! measures every star on every frame and returns a normalized, outlier-clipped
//! light curve of the target together with its photometric error budget.
//!
//! ## Features
//!
//! - **WCS positioning**: TAN and TAN-SIP solutions, either axis order
//! - **Gaussian centroids**: Levenberg–Marquardt 2-D Gaussian fit on a background-masked window
//! - **Exact apertures**: geometric circle/pixel overlap, with subpixel and centre methods too
//! - **Robust sky**: sigma-clipped median in a `[1.6 r, 2.2 r]` annulus
//! - **Error budget**: readout, photon and sky noise in magnitudes, plus SNR per frame
//! - **Ensemble weighting**: inverse-variance weighted reference flux
//! - **Detrending**: optional sliding biweight filter sized from the transit duration
//! - **Telescope agnostic**: header keywords mapped per telescope from a small table
//!
//! ## Example
//!
//! ```
//! use diffphot::{
//!     ApertureGeometry, DifferentialConfig, DifferentialPhotometry, ExtractorConfig,
//!     FrameSource, LightCurve, StarTarget, TelescopeKeywords,
//! };
//!
//! fn wasp100_light_curve(frames: &impl FrameSource) -> diffphot::Result<LightCurve> {
//!     let keywords = TelescopeKeywords::builtin()?;
//!     let tess = keywords.keywords_for("TESS")?.clone();
//!
//!     let config = DifferentialConfig {
//!         extractor: ExtractorConfig {
//!             geometry: ApertureGeometry::new(3.0, 10),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!     let engine = DifferentialPhotometry::new(config, tess);
//!
//!     let target = StarTarget::new("WASP-100", 68.9597, -64.0271);
//!     let references = [
//!         StarTarget::new("ref-1", 68.9032, -64.0011),
//!         StarTarget::new("ref-2", 69.0514, -64.0598),
//!     ];
//!     let curve = engine.run(&target, &references, frames)?;
//!     println!("std = {:.5}, binned std = {:.5}", curve.std, curve.std_binned);
//!     Ok(curve)
//! }
//! ```
//!
//! With the `fits` feature, `FitsFrameSource` reads frames found by
//! [`search_files`]; any other type implementing [`FrameSource`] works too.
//!
//! ## Pipeline
//!
//! 1. **Locate**: project the star's RA/Dec through the frame WCS
//! 2. **Refine**: fit a 2-D Gaussian inside a `2·box_w` square window
//! 3. **Measure**: aperture sum minus clipped-median sky times `π r²`
//! 4. **Combine**: target counts over weighted reference counts, normalized by the median
//! 5. **Clean**: 10σ clip, optional biweight detrend, scatter at native and binned cadence

pub mod aperture;
pub mod centroid;
pub mod detrend;
pub mod differential;
pub mod error;
pub mod extractor;
pub mod fits;
pub mod frame;
pub mod gaussian_fit;
pub mod header;
pub mod locator;
pub mod logging;
pub mod photometer;
pub mod stats;
pub mod summary;
pub mod target;
pub mod telescope;
pub mod wcs;

pub use aperture::{ApertureMethod, CircularAnnulus, CircularAperture};
pub use centroid::{Centroid, CentroidMethod, CentroidRefiner, Cutout};
pub use detrend::{transit_duration, DetrendConfig, TrendRemoval};
pub use differential::{
    DifferentialConfig, DifferentialPhotometry, LightCurve, Outputs, BIN_SIZE,
};
pub use error::{PhotometryError, Result};
pub use extractor::{
    BackgroundPolicy, ExtractorConfig, FrameMeasurement, FrameRejection, RejectedFrame,
    StarTimeSeries, TimeSeriesExtractor, DEFAULT_MAX_FILES,
};
#[cfg(feature = "fits")]
pub use fits::FitsFrameSource;
pub use fits::search_files;
pub use frame::{Frame, FrameSource, InMemoryFrames};
pub use gaussian_fit::GaussianFitConfig;
pub use header::{Header, HeaderFields, HeaderValue};
pub use locator::{ApertureGeometry, FrameLocator, PixelPosition};
pub use photometer::{ApertureMeasurement, AperturePhotometer};
pub use summary::PrecisionSummary;
pub use target::{SkyCoord, StarTarget, TargetCatalog, TargetResolver};
pub use telescope::{KeywordMap, TelescopeKeywords, DEFAULT_TELESCOPE};
pub use wcs::Wcs;
