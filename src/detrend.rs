//! Removal of slow trends from a light curve.
//!
//! The trend is a sliding robust location (Tukey biweight, `c = 5`) over a
//! time window sized from the expected transit duration, so that a transit
//! is not absorbed into the trend.

use tracing::{debug, warn};

use crate::error::{PhotometryError, Result};
use crate::stats;

const GRAVITATIONAL_CONSTANT: f64 = 6.673e-11;
const SOLAR_RADIUS_M: f64 = 695_508_000.0;
const SOLAR_MASS_KG: f64 = 1.989e30;
const JUPITER_RADIUS_M: f64 = 69_911_000.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Biweight tuning constant.
pub const BIWEIGHT_C: f64 = 5.0;
const BIWEIGHT_TOLERANCE: f64 = 1e-6;
const BIWEIGHT_MAX_ITERS: usize = 50;

/// How the fitted trend is taken out of the flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendRemoval {
    /// `flux / trend`
    #[default]
    Divide,
    /// `flux − trend`
    Subtract,
}

/// Detrending parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetrendConfig {
    /// Stellar radius in solar radii.
    pub stellar_radius: f64,
    /// Stellar mass in solar masses.
    pub stellar_mass: f64,
    /// Orbital period in days.
    pub period_days: f64,
    /// Window length as a multiple of the transit duration.
    pub window_multiplier: f64,
    pub removal: TrendRemoval,
    /// Gaps longer than this fraction of the window split the series into
    /// independently detrended segments.
    pub break_tolerance: f64,
}

impl Default for DetrendConfig {
    fn default() -> Self {
        Self {
            stellar_radius: 1.0,
            stellar_mass: 1.0,
            period_days: 1.0,
            window_multiplier: 3.0,
            removal: TrendRemoval::default(),
            break_tolerance: 0.5,
        }
    }
}

impl DetrendConfig {
    pub fn new(stellar_radius: f64, stellar_mass: f64, period_days: f64) -> Self {
        Self {
            stellar_radius,
            stellar_mass,
            period_days,
            ..Default::default()
        }
    }

    /// Check that every physical parameter is positive and finite.
    pub fn validate(&self) -> Result<()> {
        let params = [
            ("stellar radius", self.stellar_radius),
            ("stellar mass", self.stellar_mass),
            ("orbital period", self.period_days),
            ("window multiplier", self.window_multiplier),
            ("break tolerance", self.break_tolerance),
        ];
        for (name, value) in params {
            if !(value.is_finite() && value > 0.0) {
                return Err(PhotometryError::InvalidConfig(format!(
                    "detrend {name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Sliding window length in days.
    pub fn window_length(&self) -> f64 {
        self.window_multiplier
            * transit_duration(self.stellar_radius, self.stellar_mass, self.period_days)
    }
}

/// Maximum transit duration (days) of a Jupiter-sized planet on a circular
/// orbit of period `period_days` around a star of the given radius and mass
/// (solar units).
pub fn transit_duration(stellar_radius: f64, stellar_mass: f64, period_days: f64) -> f64 {
    let planet_diameter = 2.0 * JUPITER_RADIUS_M;
    let crossing = stellar_radius * SOLAR_RADIUS_M + planet_diameter;
    let t = crossing
        * ((4.0 * period_days * SECONDS_PER_DAY)
            / (std::f64::consts::PI * GRAVITATIONAL_CONSTANT * stellar_mass * SOLAR_MASS_KG))
            .cbrt();
    t / SECONDS_PER_DAY
}

/// Tukey biweight location of `values` (NaN entries must already be removed).
pub fn biweight_location(values: &[f64], c: f64) -> f64 {
    let mut center = stats::median(values);
    let mad = stats::median(&values.iter().map(|v| (v - center).abs()).collect::<Vec<_>>());
    if !(mad > 0.0) {
        return center;
    }

    for _ in 0..BIWEIGHT_MAX_ITERS {
        let (mut num, mut den) = (0.0, 0.0);
        for &v in values {
            let u = (v - center) / (c * mad);
            if u.abs() < 1.0 {
                let w = (1.0 - u * u) * (1.0 - u * u);
                num += w * (v - center);
                den += w;
            }
        }
        if den == 0.0 {
            break;
        }
        let step = num / den;
        center += step;
        if step.abs() < BIWEIGHT_TOLERANCE {
            break;
        }
    }
    center
}

/// Sliding biweight trend over a time window of `window_length` days
/// centred on every point. `times` must be sorted.
pub fn biweight_trend(
    times: &[f64],
    flux: &[f64],
    window_length: f64,
    break_tolerance: f64,
) -> Vec<f64> {
    debug_assert_eq!(times.len(), flux.len());
    let n = times.len().min(flux.len());
    let mut trend = vec![f64::NAN; flux.len()];
    let half = 0.5 * window_length;
    let max_gap = break_tolerance * window_length;

    let mut start = 0;
    while start < n {
        // segment ends at the first gap longer than max_gap
        let mut end = start + 1;
        while end < n && times[end] - times[end - 1] <= max_gap {
            end += 1;
        }

        let (mut lo, mut hi) = (start, start);
        for i in start..end {
            if flux[i].is_nan() {
                continue;
            }
            while lo < i && times[lo] < times[i] - half {
                lo += 1;
            }
            while hi < end && times[hi] <= times[i] + half {
                hi += 1;
            }
            // the window always holds point i
            hi = hi.max(i + 1);
            let window: Vec<f64> = flux[lo..hi].iter().copied().filter(|v| !v.is_nan()).collect();
            trend[i] = biweight_location(&window, BIWEIGHT_C);
        }
        start = end;
    }
    trend
}

/// A detrended light curve and the trend that was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Detrended {
    pub flux: Vec<f64>,
    pub trend: Vec<f64>,
    pub window_length: f64,
}

/// Fit and remove the trend from `flux`.
///
/// Points may come in any order; the trend is fitted in time order and
/// returned in the input order.
pub fn detrend(times: &[f64], flux: &[f64], config: &DetrendConfig) -> Result<Detrended> {
    config.validate()?;
    if times.len() != flux.len() {
        return Err(PhotometryError::InvalidConfig(format!(
            "{} times for {} flux values",
            times.len(),
            flux.len()
        )));
    }
    let window_length = config.window_length();
    debug!(window_length, "Detrending with biweight filter");

    let trend = if times.windows(2).all(|w| w[0] <= w[1]) {
        biweight_trend(times, flux, window_length, config.break_tolerance)
    } else {
        warn!("Observation times are not in order; sorting before detrending");
        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));
        let sorted_times: Vec<f64> = order.iter().map(|&i| times[i]).collect();
        let sorted_flux: Vec<f64> = order.iter().map(|&i| flux[i]).collect();
        let sorted_trend =
            biweight_trend(&sorted_times, &sorted_flux, window_length, config.break_tolerance);
        let mut trend = vec![f64::NAN; times.len()];
        for (&i, t) in order.iter().zip(sorted_trend) {
            trend[i] = t;
        }
        trend
    };
    let flux = flux
        .iter()
        .zip(&trend)
        .map(|(f, t)| match config.removal {
            TrendRemoval::Divide => f / t,
            TrendRemoval::Subtract => f - t,
        })
        .collect();
    Ok(Detrended {
        flux,
        trend,
        window_length,
    })
}
