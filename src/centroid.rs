//! Centroid refinement inside a square window around a predicted position.
//!
//! The window is cut from the frame, pixels at or below
//! `median − mask_sigma · std` are masked as background, and a 2-D Gaussian
//! is fitted to the remaining pixels of the minimum-subtracted window. When
//! the fit fails the intensity-weighted moment centroid is used instead.

use ndarray::{s, Array2, ArrayView2};
use tracing::trace;

use crate::extractor::FrameRejection;
use crate::gaussian_fit::{fit_gaussian_2d, Gaussian2D, GaussianFitConfig};
use crate::locator::PixelPosition;
use crate::stats;

/// Square window cut from a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    pub data: Array2<f64>,
    /// Frame row of the window's first row.
    pub row0: usize,
    /// Frame column of the window's first column.
    pub col0: usize,
}

impl Cutout {
    /// Rows `[trunc(y) − box_w, trunc(y) + box_w)` and columns
    /// `[trunc(x) − box_w, trunc(x) + box_w)` of `data`.
    ///
    /// Windows that do not lie entirely on the frame are rejected.
    pub fn extract(
        data: &ArrayView2<f64>,
        approx: PixelPosition,
        box_w: usize,
    ) -> Result<Self, FrameRejection> {
        let out_of_bounds = FrameRejection::OutOfBounds {
            x: approx.x,
            y: approx.y,
            box_w,
        };
        let (rows, cols) = data.dim();
        let half = box_w as i64;
        let row0 = approx.y.trunc() as i64 - half;
        let col0 = approx.x.trunc() as i64 - half;
        if row0 < 0 || col0 < 0 || row0 + 2 * half > rows as i64 || col0 + 2 * half > cols as i64 {
            return Err(out_of_bounds);
        }
        let (row0, col0) = (row0 as usize, col0 as usize);
        let window = data.slice(s![row0..row0 + 2 * box_w, col0..col0 + 2 * box_w]);
        Ok(Self {
            data: window.to_owned(),
            row0,
            col0,
        })
    }

    /// Window coordinates → frame coordinates.
    pub fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (x + self.col0 as f64, y + self.row0 as f64)
    }

    /// `true` for pixels at or below `median − sigma · std` of the window.
    pub fn background_mask(&self, sigma: f64) -> Array2<bool> {
        let values: Vec<f64> = self.data.iter().copied().collect();
        let threshold = stats::median(&values) - sigma * stats::std(&values);
        self.data.mapv(|v| !(v > threshold))
    }
}

/// How the centroid was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentroidMethod {
    GaussianFit,
    Moments,
    WindowCentre,
}

/// Refined sub-pixel position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// Column within the cutout.
    pub x: f64,
    /// Row within the cutout.
    pub y: f64,
    /// Column within the frame.
    pub frame_x: f64,
    /// Row within the frame.
    pub frame_y: f64,
    pub method: CentroidMethod,
}

/// Gaussian-fit centroid refiner.
#[derive(Debug, Clone, Copy)]
pub struct CentroidRefiner {
    /// Background mask threshold in standard deviations below the median.
    pub mask_sigma: f64,
    pub fit: GaussianFitConfig,
}

impl Default for CentroidRefiner {
    fn default() -> Self {
        Self {
            mask_sigma: 1.0,
            fit: GaussianFitConfig::default(),
        }
    }
}

struct Moments {
    x: f64,
    y: f64,
    sigma_x: f64,
    sigma_y: f64,
}

fn moments(samples: &[(f64, f64, f64)]) -> Option<Moments> {
    let total: f64 = samples.iter().map(|s| s.2).sum();
    if !(total > 0.0) {
        return None;
    }
    let x = samples.iter().map(|s| s.0 * s.2).sum::<f64>() / total;
    let y = samples.iter().map(|s| s.1 * s.2).sum::<f64>() / total;
    let vx = samples.iter().map(|s| (s.0 - x).powi(2) * s.2).sum::<f64>() / total;
    let vy = samples.iter().map(|s| (s.1 - y).powi(2) * s.2).sum::<f64>() / total;
    Some(Moments {
        x,
        y,
        sigma_x: vx.sqrt().max(0.5),
        sigma_y: vy.sqrt().max(0.5),
    })
}

impl CentroidRefiner {
    pub fn refine(&self, cutout: &Cutout) -> Centroid {
        let (rows, cols) = cutout.data.dim();
        let mask = cutout.background_mask(self.mask_sigma);

        let collect = |use_mask: bool| -> Vec<(f64, f64, f64)> {
            cutout
                .data
                .indexed_iter()
                .filter(|&(idx, v)| v.is_finite() && !(use_mask && mask[idx]))
                .map(|((row, col), &v)| (col as f64, row as f64, v))
                .collect()
        };
        let mut samples = collect(true);
        if samples.len() < 7 {
            samples = collect(false);
        }
        let min = samples.iter().map(|s| s.2).fold(f64::INFINITY, f64::min);
        for s in &mut samples {
            s.2 -= min;
        }

        let finish = |x: f64, y: f64, method: CentroidMethod| {
            let (frame_x, frame_y) = cutout.to_frame(x, y);
            Centroid {
                x,
                y,
                frame_x,
                frame_y,
                method,
            }
        };

        let Some(m) = moments(&samples) else {
            trace!("Flat window; using window centre");
            return finish(cols as f64 / 2.0, rows as f64 / 2.0, CentroidMethod::WindowCentre);
        };

        let peak = samples.iter().map(|s| s.2).fold(0.0, f64::max);
        let initial = Gaussian2D {
            amplitude: peak,
            x0: m.x,
            y0: m.y,
            sigma_x: m.sigma_x,
            sigma_y: m.sigma_y,
            offset: 0.0,
        };

        let inside = |x: f64, y: f64| {
            x.is_finite()
                && y.is_finite()
                && (0.0..=cols as f64 - 1.0).contains(&x)
                && (0.0..=rows as f64 - 1.0).contains(&y)
        };
        match fit_gaussian_2d(&samples, initial, &self.fit) {
            Some(fit) if inside(fit.model.x0, fit.model.y0) => {
                finish(fit.model.x0, fit.model.y0, CentroidMethod::GaussianFit)
            }
            _ => {
                trace!(x = m.x, y = m.y, "Gaussian fit failed; using moment centroid");
                finish(m.x, m.y, CentroidMethod::Moments)
            }
        }
    }
}
