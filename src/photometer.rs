//! Sky-subtracted aperture photometry at a refined centroid.

use ndarray::ArrayView2;
use tracing::trace;

use crate::aperture::{ApertureMethod, CircularAnnulus, CircularAperture};
use crate::error::{PhotometryError, Result};
use crate::locator::ApertureGeometry;
use crate::stats::sigma_clipped_stats;

/// Result of measuring one star on one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureMeasurement {
    /// Weighted pixel sum inside the aperture.
    pub aperture_sum: f64,
    /// `π r²`.
    pub aperture_area: f64,
    /// Sigma-clipped annulus statistics, per pixel.
    pub background_median: f64,
    pub background_mean: f64,
    pub background_std: f64,
    /// `background_median × aperture_area`.
    pub background_in_target: f64,
    /// `aperture_sum − background_in_target`.
    pub net_counts: f64,
}

/// Aperture photometer configured with a geometry and overlap method.
#[derive(Debug, Clone, Copy)]
pub struct AperturePhotometer {
    pub geometry: ApertureGeometry,
    pub method: ApertureMethod,
    /// Clip threshold for the annulus statistics.
    pub annulus_sigma: f64,
    /// Maximum clipping iterations for the annulus statistics.
    pub annulus_max_iters: usize,
}

impl AperturePhotometer {
    pub fn new(geometry: ApertureGeometry, method: ApertureMethod) -> Self {
        Self {
            geometry,
            method,
            annulus_sigma: 3.0,
            annulus_max_iters: 10,
        }
    }

    /// Measure the star centred at `(x, y)` (x = column, y = row) in `data`.
    ///
    /// Fails with [`PhotometryError::BackgroundDominated`] when the sky
    /// estimate in the aperture is not below the aperture sum.
    pub fn measure(
        &self,
        data: &ArrayView2<f64>,
        x: f64,
        y: f64,
        frame: &str,
    ) -> Result<ApertureMeasurement> {
        let g = &self.geometry;
        let annulus = CircularAnnulus::new(x, y, g.r_in(), g.r_out());
        let sky = sigma_clipped_stats(
            &annulus.values(data),
            self.annulus_sigma,
            self.annulus_max_iters,
        );

        let aperture = CircularAperture::new(x, y, g.r);
        let aperture_sum = aperture.sum(data, self.method);
        let aperture_area = aperture.area();
        let background_in_target = sky.median * aperture_area;
        let net_counts = aperture_sum - background_in_target;

        trace!(
            frame,
            aperture_sum,
            sky_median = sky.median,
            sky_pixels = sky.n_kept,
            net_counts,
            "Aperture measured"
        );

        // NaN sky (empty annulus) fails here too
        if !(net_counts > 0.0) {
            return Err(PhotometryError::BackgroundDominated {
                frame: frame.to_string(),
                aperture_sum,
                background_in_target,
            });
        }

        Ok(ApertureMeasurement {
            aperture_sum,
            aperture_area,
            background_median: sky.median,
            background_mean: sky.mean,
            background_std: sky.std,
            background_in_target,
            net_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn star_on_sky(size: usize, x0: f64, y0: f64, flux: f64, sigma: f64, sky: f64) -> Array2<f64> {
        let norm = flux / (2.0 * std::f64::consts::PI * sigma * sigma);
        Array2::from_shape_fn((size, size), |(row, col)| {
            let dx = col as f64 - x0;
            let dy = row as f64 - y0;
            sky + norm * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
        })
    }

    #[test]
    fn test_flat_sky_background() {
        let data = star_on_sky(40, 20.0, 20.0, 10_000.0, 1.2, 50.0);
        let phot = AperturePhotometer::new(ApertureGeometry::new(5.0, 20), ApertureMethod::Exact);
        let m = phot.measure(&data.view(), 20.0, 20.0, "f0").unwrap();

        assert!((m.background_median - 50.0).abs() < 1e-6);
        assert!((m.background_in_target - m.background_median * m.aperture_area).abs() < 1e-8);
        assert!((m.net_counts - m.aperture_sum + m.background_in_target).abs() < 1e-9);
        assert!((m.net_counts - 10_000.0).abs() / 10_000.0 < 0.01, "{}", m.net_counts);
    }

    #[test]
    fn test_annulus_rejects_contaminating_star() {
        let mut data = star_on_sky(40, 20.0, 20.0, 10_000.0, 1.2, 50.0);
        // bright hot pixel inside the annulus
        data[[20, 29]] = 1.0e6;
        let phot = AperturePhotometer::new(ApertureGeometry::new(5.0, 20), ApertureMethod::Exact);
        let m = phot.measure(&data.view(), 20.0, 20.0, "f0").unwrap();
        assert!((m.background_median - 50.0).abs() < 1e-6);
        assert!(m.background_std < 1e-3);
    }

    #[test]
    fn test_background_dominated() {
        // sky with a dark hole where the star should be
        let data = Array2::from_shape_fn((40, 40), |(row, col)| {
            let d = ((row as f64 - 20.0).powi(2) + (col as f64 - 20.0).powi(2)).sqrt();
            if d < 6.0 {
                40.0
            } else {
                50.0
            }
        });
        let phot = AperturePhotometer::new(ApertureGeometry::new(5.0, 20), ApertureMethod::Exact);
        let err = phot.measure(&data.view(), 20.0, 20.0, "empty").unwrap_err();
        assert!(matches!(err, PhotometryError::BackgroundDominated { .. }));
        assert!(err.to_string().contains("empty"));
    }
}
