//! Robust statistics over `f64` slices.
//!
//! NaN-aware variants ignore NaN entries; the sigma-clipping routines also
//! treat ±∞ as outliers. All standard deviations are population (ddof = 0).

/// Median of `values`; NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 0 {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    } else {
        sorted[n / 2]
    }
}

/// Median ignoring NaN entries.
pub fn nanmedian(values: &[f64]) -> f64 {
    let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    median(&kept)
}

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean ignoring NaN entries.
pub fn nanmean(values: &[f64]) -> f64 {
    let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    mean(&kept)
}

/// Population standard deviation; NaN for an empty slice.
pub fn std(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.is_nan() {
        return f64::NAN;
    }
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Population standard deviation ignoring NaN entries.
pub fn nanstd(values: &[f64]) -> f64 {
    let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    std(&kept)
}

/// `Σ wᵢ·vᵢ / Σ wᵢ`.
pub fn weighted_average(values: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let (num, den) = values
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(n, d), (v, w)| (n + v * w, d + w));
    num / den
}

/// Mean of consecutive groups of `size` values, NaN entries ignored.
///
/// The final partial group is kept, so the result has `ceil(n / size)` entries.
pub fn bin_means(values: &[f64], size: usize) -> Vec<f64> {
    if size == 0 {
        return Vec::new();
    }
    values.chunks(size).map(nanmean).collect()
}

/// Summary of a sigma-clipped sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    /// Number of values surviving the clip.
    pub n_kept: usize,
}

/// Iterative sigma clipping about the median.
///
/// Returns a keep-mask parallel to `values`. Non-finite values are never kept.
/// Each iteration keeps values within `sigma × std` of the median of the
/// currently kept values; iteration stops when nothing changes or after
/// `max_iters` rounds.
pub fn sigma_clip_mask(values: &[f64], sigma: f64, max_iters: usize) -> Vec<bool> {
    let mut keep: Vec<bool> = values.iter().map(|v| v.is_finite()).collect();

    for _ in 0..max_iters {
        let kept: Vec<f64> = values
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(&v, _)| v)
            .collect();
        if kept.is_empty() {
            break;
        }
        let centre = median(&kept);
        let spread = std(&kept);
        let lo = centre - sigma * spread;
        let hi = centre + sigma * spread;

        let mut changed = false;
        for (k, &v) in keep.iter_mut().zip(values) {
            let inside = v.is_finite() && v >= lo && v <= hi;
            if *k != inside {
                changed = true;
                *k = inside;
            }
        }
        if !changed {
            break;
        }
    }
    keep
}

/// Mean, median and std of the values surviving [`sigma_clip_mask`].
pub fn sigma_clipped_stats(values: &[f64], sigma: f64, max_iters: usize) -> ClippedStats {
    let keep = sigma_clip_mask(values, sigma, max_iters);
    let kept: Vec<f64> = values
        .iter()
        .zip(&keep)
        .filter(|(_, &k)| k)
        .map(|(&v, _)| v)
        .collect();
    ClippedStats {
        mean: mean(&kept),
        median: median(&kept),
        std: std(&kept),
        n_kept: kept.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
        assert_eq!(nanmedian(&[f64::NAN, 5.0, 1.0, f64::NAN, 3.0]), 3.0);
    }

    #[test]
    fn test_std_population() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std(&v) - 2.0).abs() < 1e-12);
        let with_nan = [2.0, f64::NAN, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((nanstd(&with_nan) - 2.0).abs() < 1e-12);
        assert!(std(&with_nan).is_nan());
    }

    #[test]
    fn test_weighted_average_equal_weights() {
        let v = [1.0, 2.0, 6.0];
        assert!((weighted_average(&v, &[0.5, 0.5, 0.5]) - 3.0).abs() < 1e-12);
        assert!((weighted_average(&v, &[1.0, 0.0, 1.0]) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_bin_means_keeps_partial_bin() {
        let v: Vec<f64> = (1..=10).map(f64::from).collect();
        let b = bin_means(&v, 4);
        assert_eq!(b, vec![2.5, 6.5, 9.5]);
        assert_eq!(bin_means(&v[..8], 4).len(), 2);
        assert!(bin_means(&[], 4).is_empty());
    }

    #[test]
    fn test_sigma_clip_rejects_outlier() {
        let mut v = vec![10.0; 50];
        for (i, x) in v.iter_mut().enumerate() {
            *x += if i % 2 == 0 { 0.1 } else { -0.1 };
        }
        v.push(1000.0);
        v.push(f64::NAN);
        let keep = sigma_clip_mask(&v, 3.0, 10);
        assert!(!keep[50]);
        assert!(!keep[51]);
        assert_eq!(keep.iter().filter(|&&k| k).count(), 50);

        let s = sigma_clipped_stats(&v, 3.0, 10);
        assert!((s.median - 10.0).abs() < 1e-12);
        assert!((s.mean - 10.0).abs() < 1e-12);
        assert!((s.std - 0.1).abs() < 1e-12);
        assert_eq!(s.n_kept, 50);
    }

    #[test]
    fn test_sigma_clip_constant_keeps_all() {
        let v = vec![7.0; 20];
        let keep = sigma_clip_mask(&v, 3.0, 10);
        assert!(keep.iter().all(|&k| k));
    }
}
