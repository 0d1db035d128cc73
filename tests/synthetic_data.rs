//! Synthetic frames for integration tests.
//!
//! Frames carry a TAN WCS centred on a fixed sky position plus TESS-style
//! detector keywords. Stars are rendered as circular Gaussians on a flat sky,
//! with optional Gaussian read noise from a seeded RNG.

#![allow(dead_code)]

use diffphot::{Frame, Header, SkyCoord, StarTarget, Wcs};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Sky position of the WCS reference pixel.
pub const CRVAL: (f64, f64) = (150.0, 20.0);
/// Degrees per pixel.
pub const PIXEL_SCALE_DEG: f64 = 1.0e-3;
/// 1-indexed reference pixel of an unshifted frame.
pub const CRPIX: (f64, f64) = (40.5, 40.5);

pub const EXPOSURE_DAYS: f64 = 0.02;
pub const READ_NOISE: f64 = 10.0;
pub const GAIN: f64 = 5.0;

/// TAN WCS whose pointing is offset by `(dx, dy)` pixels.
pub fn wcs_header(dx: f64, dy: f64) -> Header {
    Header::new()
        .with("CTYPE1", "RA---TAN")
        .with("CTYPE2", "DEC--TAN")
        .with("CRPIX1", CRPIX.0 + dx)
        .with("CRPIX2", CRPIX.1 + dy)
        .with("CRVAL1", CRVAL.0)
        .with("CRVAL2", CRVAL.1)
        .with("CDELT1", -PIXEL_SCALE_DEG)
        .with("CDELT2", PIXEL_SCALE_DEG)
}

/// Add TESS keywords for an exposure starting at `time` (days).
pub fn with_tess_keywords(header: Header, time: f64) -> Header {
    header
        .with("EXPOSURE", EXPOSURE_DAYS)
        .with("TSTART", time)
        .with("CAMERA", 1_i64)
        .with("READNOIA", READ_NOISE)
        .with("GAINA", GAIN)
}

/// Star whose position on an unshifted frame is `(x, y)`.
pub fn star_at(id: &str, x: f64, y: f64) -> StarTarget {
    let wcs = Wcs::from_header(&wcs_header(0.0, 0.0)).unwrap();
    let (ra, dec) = wcs.pixel_to_world(x, y);
    StarTarget::new(id, ra, dec)
}

/// A star to render: sky position and total flux.
#[derive(Debug, Clone)]
pub struct Source {
    pub coord: SkyCoord,
    pub flux: f64,
}

impl Source {
    pub fn new(star: &StarTarget, flux: f64) -> Self {
        Self {
            coord: star.coord,
            flux,
        }
    }
}

/// Render `sources` through the WCS in `header` onto a flat sky.
pub fn render(
    shape: (usize, usize),
    header: &Header,
    sources: &[Source],
    sky: f64,
    psf_sigma: f64,
) -> Array2<f64> {
    let wcs = Wcs::from_header(header).unwrap();
    let mut data = Array2::from_elem(shape, sky);
    let two_s2 = 2.0 * psf_sigma * psf_sigma;
    for src in sources {
        let (x0, y0) = wcs
            .world_to_pixel(src.coord.ra_deg, src.coord.dec_deg)
            .unwrap();
        let norm = src.flux / (std::f64::consts::PI * two_s2);
        for ((row, col), v) in data.indexed_iter_mut() {
            let dx = col as f64 - x0;
            let dy = row as f64 - y0;
            *v += norm * (-(dx * dx + dy * dy) / two_s2).exp();
        }
    }
    data
}

/// Add zero-mean Gaussian noise.
pub fn add_noise(data: &mut Array2<f64>, sigma: f64, rng: &mut StdRng) {
    let normal = Normal::new(0.0, sigma).unwrap();
    for v in data.iter_mut() {
        *v += normal.sample(rng);
    }
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// One frame of a synthetic sequence.
pub struct FrameSpec {
    pub id: String,
    pub time: f64,
    pub shift: (f64, f64),
    pub sources: Vec<Source>,
    pub with_wcs: bool,
}

impl FrameSpec {
    pub fn new(index: usize, sources: Vec<Source>) -> Self {
        Self {
            id: format!("frame_{index:04}.fits"),
            time: 1400.0 + index as f64 * EXPOSURE_DAYS,
            shift: (0.0, 0.0),
            sources,
            with_wcs: true,
        }
    }
}

/// Build a frame, optionally with noise.
pub fn build_frame(
    spec: &FrameSpec,
    shape: (usize, usize),
    sky: f64,
    psf_sigma: f64,
    noise: Option<(f64, &mut StdRng)>,
) -> Frame {
    let wcs = wcs_header(spec.shift.0, spec.shift.1);
    let mut data = render(shape, &wcs, &spec.sources, sky, psf_sigma);
    if let Some((sigma, rng)) = noise {
        add_noise(&mut data, sigma, rng);
    }
    let header = if spec.with_wcs {
        with_tess_keywords(wcs, spec.time)
    } else {
        with_tess_keywords(Header::new(), spec.time)
    };
    Frame::new(spec.id.clone(), data, header)
}
