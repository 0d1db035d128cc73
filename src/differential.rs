//! Differential photometry of a target star against an ensemble of
//! reference stars.
//!
//! The engine extracts every star, aligns the series on frame identity,
//! propagates readout, photon and sky noise into magnitude errors, divides
//! the target by the inverse-variance weighted reference flux, normalizes,
//! clips outliers, optionally detrends, and reports the scatter of the
//! result at native and binned cadence.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, info_span, warn};

use crate::detrend::{detrend, DetrendConfig};
use crate::error::{PhotometryError, Result};
use crate::extractor::{ExtractorConfig, StarTimeSeries, TimeSeriesExtractor};
use crate::frame::FrameSource;
use crate::stats;
use crate::summary::PrecisionSummary;
use crate::target::StarTarget;
use crate::telescope::KeywordMap;

/// Number of consecutive points averaged into one binned point.
pub const BIN_SIZE: usize = 4;

/// Configuration for [`DifferentialPhotometry`].
#[derive(Debug, Clone)]
pub struct DifferentialConfig {
    pub extractor: ExtractorConfig,
    /// Outlier clip threshold for the normalized flux.
    pub clip_sigma: f64,
    /// Maximum clipping iterations for the normalized flux.
    pub clip_max_iters: usize,
    /// Detrend the clipped light curve when set.
    pub detrend: Option<DetrendConfig>,
    /// Append the precision summary to `rms_{instrument}.txt` in this directory.
    pub summary_dir: Option<PathBuf>,
}

impl Default for DifferentialConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            clip_sigma: 10.0,
            clip_max_iters: 10,
            detrend: None,
            summary_dir: None,
        }
    }
}

/// Result of one differential photometry run. All per-frame vectors share
/// the index of [`frames`](Self::frames) unless documented otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurve {
    pub target: String,
    pub references: Vec<String>,
    pub instrument: String,
    pub aperture_radius: f64,
    pub frames: Vec<String>,
    /// Observation times in days.
    pub times: Vec<f64>,
    pub exposure_s: Vec<f64>,
    pub target_flux_per_sec: Vec<f64>,
    pub background_per_sec: Vec<f64>,
    /// Flux per second of each reference star, in `references` order.
    pub reference_flux_per_sec: Vec<Vec<f64>>,
    /// Sky under the aperture of each reference star, per second.
    pub reference_background_per_sec: Vec<Vec<f64>>,
    pub total_reference_flux_per_sec: Vec<f64>,
    /// Inverse-variance weighted mean of the reference counts.
    pub weighted_reference_counts: Vec<f64>,
    /// `(readout × r)² π`, the same for every frame.
    pub readout_variance: f64,
    pub sigma_ron: Vec<f64>,
    pub sigma_phot: Vec<f64>,
    pub sigma_sky: Vec<f64>,
    pub sigma_total: Vec<f64>,
    pub snr_target: Vec<f64>,
    pub snr_reference: Vec<f64>,
    pub snr_differential: Vec<f64>,
    /// Predicted target position relative to its mean.
    pub x_offset: Vec<f64>,
    pub y_offset: Vec<f64>,
    pub differential_flux: Vec<f64>,
    /// `true` for points that survived the outlier clip.
    pub clip_mask: Vec<bool>,
    /// Clipped (and detrended, if configured) normalized flux.
    pub normalized_flux: Vec<f64>,
    /// Times of the clipped points.
    pub times_clipped: Vec<f64>,
    /// Trend removed from the clipped flux, when detrending ran.
    pub trend: Option<Vec<f64>>,
    pub binned_flux: Vec<f64>,
    pub binned_times: Vec<f64>,
    pub std: f64,
    pub std_binned: f64,
    pub summary: PrecisionSummary,
}

/// The four series handed to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outputs<'a> {
    pub target_flux_per_sec: &'a [f64],
    pub total_reference_flux_per_sec: &'a [f64],
    pub sigma_total: &'a [f64],
    pub times: &'a [f64],
}

impl LightCurve {
    pub fn outputs(&self) -> Outputs<'_> {
        Outputs {
            target_flux_per_sec: &self.target_flux_per_sec,
            total_reference_flux_per_sec: &self.total_reference_flux_per_sec,
            sigma_total: &self.sigma_total,
            times: &self.times,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Magnitude error contributed by noise `n` on signal `s`.
#[inline]
fn magnitude_error(s: f64, n: f64) -> f64 {
    -2.5 * ((s - n) / s).log10()
}

/// Signal-to-noise ratio of a flux per second, scaled to the full exposure.
#[inline]
fn snr(
    flux_per_sec: f64,
    background_per_sec: f64,
    readout_variance: f64,
    gain: f64,
    exp_s: f64,
) -> f64 {
    let noise = flux_per_sec + background_per_sec + readout_variance / (gain * exp_s);
    flux_per_sec / noise.sqrt() * (gain * exp_s).sqrt()
}

/// Differential photometry engine.
#[derive(Debug, Clone)]
pub struct DifferentialPhotometry {
    config: DifferentialConfig,
    extractor: TimeSeriesExtractor,
}

impl DifferentialPhotometry {
    pub fn new(config: DifferentialConfig, keywords: KeywordMap) -> Self {
        let extractor = TimeSeriesExtractor::new(config.extractor.clone(), keywords);
        Self { config, extractor }
    }

    pub fn config(&self) -> &DifferentialConfig {
        &self.config
    }

    /// Run differential photometry of `target` against `references` over
    /// every frame of `source`.
    pub fn run<S>(
        &self,
        target: &StarTarget,
        references: &[StarTarget],
        source: &S,
    ) -> Result<LightCurve>
    where
        S: FrameSource + ?Sized,
    {
        let span = info_span!("differential", target = %target.id);
        let _enter = span.enter();

        if references.is_empty() {
            return Err(PhotometryError::InvalidConfig(
                "at least one reference star is required".into(),
            ));
        }
        if let Some(detrend) = &self.config.detrend {
            detrend.validate()?;
        }

        info!("Starting aperture photometry");
        let target_series = self.extractor.extract(target, source)?;
        if target_series.is_empty() {
            return Err(PhotometryError::NoGoodFrames {
                star: target.id.clone(),
            });
        }

        let mut reference_series = Vec::with_capacity(references.len());
        for reference in references {
            let series = self.extractor.extract(reference, source)?;
            if series.is_empty() {
                return Err(PhotometryError::NoGoodFrames {
                    star: reference.id.clone(),
                });
            }
            reference_series.push(series);
        }

        let (target_series, reference_series) = align(target_series, reference_series)?;
        if target_series.is_empty() {
            return Err(PhotometryError::NoGoodFrames {
                star: target.id.clone(),
            });
        }

        let curve = self.combine(&target_series, &reference_series)?;
        info!(
            frames = curve.len(),
            kept = curve.normalized_flux.len(),
            instrument = %curve.instrument,
            std = curve.std,
            std_binned = curve.std_binned,
            "Differential photometry finished"
        );
        Ok(curve)
    }

    fn combine(
        &self,
        target: &StarTimeSeries,
        references: &[StarTimeSeries],
    ) -> Result<LightCurve> {
        let n = target.len();
        let r = self.config.extractor.geometry.r;
        let exp_s = target.exposure_s();

        // detector properties from the first good frame
        let first = &target.fields()[0];
        let (readout, gain) = (first.readout_noise, first.gain);
        let instrument = first.instrument.clone();

        let target_flux_per_sec: Vec<f64> = target
            .counts()
            .iter()
            .zip(exp_s)
            .map(|(c, t)| c / t)
            .collect();
        let background_per_sec: Vec<f64> = target
            .background_in_target()
            .iter()
            .zip(exp_s)
            .map(|(b, t)| b / t)
            .collect();

        let readout_variance = (readout * r).powi(2) * std::f64::consts::PI;
        let ron = readout_variance.sqrt();

        let mut sigma_ron = Vec::with_capacity(n);
        let mut sigma_phot = Vec::with_capacity(n);
        let mut sigma_sky = Vec::with_capacity(n);
        let mut sigma_total = Vec::with_capacity(n);
        let mut snr_target = Vec::with_capacity(n);
        for i in 0..n {
            let signal = target_flux_per_sec[i] * gain * exp_s[i];
            let s_ron = magnitude_error(signal, ron);
            let s_phot = magnitude_error(signal, signal.sqrt());
            let s_sky = magnitude_error(signal, (background_per_sec[i] * gain * exp_s[i]).sqrt());
            sigma_ron.push(s_ron);
            sigma_phot.push(s_phot);
            sigma_sky.push(s_sky);
            sigma_total.push((s_phot * s_phot + s_ron * s_ron + s_sky * s_sky).sqrt());
            snr_target.push(snr(
                target_flux_per_sec[i],
                background_per_sec[i],
                readout_variance,
                gain,
                exp_s[i],
            ));
        }

        // reference fluxes use the target's exposure times
        let reference_flux_per_sec: Vec<Vec<f64>> = references
            .iter()
            .map(|s| s.counts().iter().zip(exp_s).map(|(c, t)| c / t).collect())
            .collect();
        let reference_background_per_sec: Vec<Vec<f64>> = references
            .iter()
            .map(|s| s.background_in_target().iter().zip(exp_s).map(|(b, t)| b / t).collect())
            .collect();

        let mut weighted_reference_counts = Vec::with_capacity(n);
        let mut total_reference_flux_per_sec = Vec::with_capacity(n);
        let mut snr_reference = Vec::with_capacity(n);
        for i in 0..n {
            let counts: Vec<f64> = reference_flux_per_sec
                .iter()
                .map(|f| f[i] * exp_s[i])
                .collect();
            let weights: Vec<f64> = reference_flux_per_sec
                .iter()
                .zip(&reference_background_per_sec)
                .map(|(f, b)| 1.0 / (f[i] * exp_s[i] + b[i] * exp_s[i] + readout_variance))
                .collect();
            weighted_reference_counts.push(stats::weighted_average(&counts, &weights));

            let total_flux: f64 = reference_flux_per_sec.iter().map(|f| f[i]).sum();
            let total_bkg: f64 = reference_background_per_sec.iter().map(|b| b[i]).sum();
            total_reference_flux_per_sec.push(total_flux);
            snr_reference.push(snr(total_flux, total_bkg, readout_variance, gain, exp_s[i]));
        }

        let differential_flux: Vec<f64> = target
            .counts()
            .iter()
            .zip(&weighted_reference_counts)
            .map(|(c, w)| c / w)
            .collect();
        let norm = stats::nanmedian(&differential_flux);
        let normalized: Vec<f64> = differential_flux.iter().map(|d| d / norm).collect();

        let snr_differential: Vec<f64> = snr_target
            .iter()
            .zip(&snr_reference)
            .map(|(t, r)| 1.0 / (t.powi(-2) + r.powi(-2)).sqrt())
            .collect();

        let clip_mask = stats::sigma_clip_mask(
            &normalized,
            self.config.clip_sigma,
            self.config.clip_max_iters,
        );
        let kept = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&clip_mask)
                .filter(|(_, &k)| k)
                .map(|(&v, _)| v)
                .collect()
        };
        let mut normalized_flux = kept(&normalized);
        let times_clipped = kept(target.times());
        let clipped = n - normalized_flux.len();
        if clipped > 0 {
            info!(clipped, "Outliers removed from normalized flux");
        }

        let trend = match &self.config.detrend {
            Some(cfg) => {
                info!("Removing trends from time series data");
                let d = detrend(&times_clipped, &normalized_flux, cfg)?;
                normalized_flux = d.flux;
                Some(d.trend)
            }
            None => None,
        };

        let std = stats::nanstd(&normalized_flux);
        let binned_flux = stats::bin_means(&normalized_flux, BIN_SIZE);
        let std_binned = stats::nanstd(&binned_flux);
        let binned_times = stats::bin_means(&times_clipped, BIN_SIZE);

        let summary = PrecisionSummary {
            aperture_radius: r,
            std,
            std_binned,
            median_snr_target: stats::nanmedian(&snr_target),
            median_snr_reference: stats::nanmedian(&snr_reference),
            median_snr_differential: stats::nanmedian(&snr_differential),
        };
        if let Some(dir) = &self.config.summary_dir {
            summary.append_to(dir, &instrument)?;
        }

        let x_mean = stats::nanmean(target.x());
        let y_mean = stats::nanmean(target.y());

        Ok(LightCurve {
            target: target.star().to_string(),
            references: references.iter().map(|s| s.star().to_string()).collect(),
            instrument,
            aperture_radius: r,
            frames: target.good_frames().to_vec(),
            times: target.times().to_vec(),
            exposure_s: exp_s.to_vec(),
            target_flux_per_sec,
            background_per_sec,
            reference_flux_per_sec,
            reference_background_per_sec,
            total_reference_flux_per_sec,
            weighted_reference_counts,
            readout_variance,
            sigma_ron,
            sigma_phot,
            sigma_sky,
            sigma_total,
            snr_target,
            snr_reference,
            snr_differential,
            x_offset: target.x().iter().map(|x| x - x_mean).collect(),
            y_offset: target.y().iter().map(|y| y - y_mean).collect(),
            differential_flux,
            clip_mask,
            normalized_flux,
            times_clipped,
            trend,
            binned_flux,
            binned_times,
            std,
            std_binned,
            summary,
        })
    }
}

/// Restrict every series to the source frames measured for all stars.
fn align(
    target: StarTimeSeries,
    references: Vec<StarTimeSeries>,
) -> Result<(StarTimeSeries, Vec<StarTimeSeries>)> {
    let mut common: HashSet<usize> = target.frame_indices().iter().copied().collect();
    for r in &references {
        let indices: HashSet<usize> = r.frame_indices().iter().copied().collect();
        common.retain(|i| indices.contains(i));
    }

    let all_aligned = std::iter::once(&target)
        .chain(&references)
        .all(|s| s.len() == common.len());
    let (target, references) = if all_aligned {
        (target, references)
    } else {
        for s in std::iter::once(&target).chain(&references) {
            let dropped = s.len().saturating_sub(common.len());
            if dropped > 0 {
                warn!(star = s.star(), dropped, "Frames not measured for every star are dropped");
            }
        }
        let target = target.retain_frames(&common);
        let references = references
            .iter()
            .map(|r| r.retain_frames(&common))
            .collect();
        (target, references)
    };

    for s in &references {
        if s.frame_indices() != target.frame_indices() {
            return Err(PhotometryError::MisalignedSeries {
                star: s.star().to_string(),
                len: s.len(),
                expected: target.len(),
            });
        }
    }
    Ok((target, references))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_error() {
        // 1% noise is about 0.0109 mag
        let e = magnitude_error(10_000.0, 100.0);
        assert!((e - 0.010_912).abs() < 1e-5, "{e}");
        assert_eq!(magnitude_error(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_snr_photon_limited() {
        // no sky, no readout: SNR = sqrt(F·g·t)
        let s = snr(100.0, 0.0, 0.0, 2.0, 50.0);
        assert!((s - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_outputs_view() {
        let curve = LightCurve {
            target: "t".into(),
            references: vec!["r".into()],
            instrument: "1".into(),
            aperture_radius: 3.0,
            frames: vec!["a".into()],
            times: vec![1.0],
            exposure_s: vec![10.0],
            target_flux_per_sec: vec![2.0],
            background_per_sec: vec![0.1],
            reference_flux_per_sec: vec![vec![3.0]],
            reference_background_per_sec: vec![vec![0.1]],
            total_reference_flux_per_sec: vec![3.0],
            weighted_reference_counts: vec![30.0],
            readout_variance: 0.0,
            sigma_ron: vec![0.0],
            sigma_phot: vec![0.0],
            sigma_sky: vec![0.0],
            sigma_total: vec![0.5],
            snr_target: vec![1.0],
            snr_reference: vec![1.0],
            snr_differential: vec![1.0],
            x_offset: vec![0.0],
            y_offset: vec![0.0],
            differential_flux: vec![1.0],
            clip_mask: vec![true],
            normalized_flux: vec![1.0],
            times_clipped: vec![1.0],
            trend: None,
            binned_flux: vec![1.0],
            binned_times: vec![1.0],
            std: 0.0,
            std_binned: 0.0,
            summary: PrecisionSummary {
                aperture_radius: 3.0,
                std: 0.0,
                std_binned: 0.0,
                median_snr_target: 1.0,
                median_snr_reference: 1.0,
                median_snr_differential: 1.0,
            },
        };
        let out = curve.outputs();
        assert_eq!(out.target_flux_per_sec, &[2.0]);
        assert_eq!(out.total_reference_flux_per_sec, &[3.0]);
        assert_eq!(out.sigma_total, &[0.5]);
        assert_eq!(out.times, &[1.0]);
    }
}
