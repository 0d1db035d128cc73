//! 2-D Gaussian fitting for sub-pixel centroids.
//!
//! Levenberg–Marquardt least squares for an axis-aligned Gaussian on a
//! constant offset:
//!
//! ```text
//! f(x, y) = A · exp(−(x − x₀)²/2σx² − (y − y₀)²/2σy²) + B
//! ```

use nalgebra::{Matrix6, Vector6};

/// Levenberg–Marquardt settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFitConfig {
    /// Maximum number of accepted or rejected steps.
    pub max_iterations: usize,
    /// Stop once the relative decrease of χ² falls below this.
    pub convergence_threshold: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Damping multiplier after a rejected step.
    pub lambda_up: f64,
    /// Damping multiplier after an accepted step.
    pub lambda_down: f64,
}

impl Default for GaussianFitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            convergence_threshold: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// Axis-aligned 2-D Gaussian with a constant offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian2D {
    pub amplitude: f64,
    pub x0: f64,
    pub y0: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub offset: f64,
}

impl Gaussian2D {
    #[inline]
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.amplitude * self.profile(x, y) + self.offset
    }

    #[inline]
    fn profile(&self, x: f64, y: f64) -> f64 {
        let dx = (x - self.x0) / self.sigma_x;
        let dy = (y - self.y0) / self.sigma_y;
        (-0.5 * (dx * dx + dy * dy)).exp()
    }

    fn to_params(self) -> Vector6<f64> {
        Vector6::new(
            self.amplitude,
            self.x0,
            self.y0,
            self.sigma_x,
            self.sigma_y,
            self.offset,
        )
    }

    fn from_params(p: &Vector6<f64>) -> Self {
        Self {
            amplitude: p[0],
            x0: p[1],
            y0: p[2],
            sigma_x: p[3],
            sigma_y: p[4],
            offset: p[5],
        }
    }

    /// Partial derivatives with respect to `[A, x₀, y₀, σx, σy, B]`.
    fn gradient(&self, x: f64, y: f64) -> Vector6<f64> {
        let e = self.profile(x, y);
        let dx = x - self.x0;
        let dy = y - self.y0;
        let sx2 = self.sigma_x * self.sigma_x;
        let sy2 = self.sigma_y * self.sigma_y;
        let ae = self.amplitude * e;
        Vector6::new(
            e,
            ae * dx / sx2,
            ae * dy / sy2,
            ae * dx * dx / (sx2 * self.sigma_x),
            ae * dy * dy / (sy2 * self.sigma_y),
            1.0,
        )
    }
}

/// Outcome of [`fit_gaussian_2d`].
#[derive(Debug, Clone, Copy)]
pub struct GaussianFit {
    pub model: Gaussian2D,
    pub converged: bool,
    pub iterations: usize,
    pub rms_residual: f64,
}

fn chi2(samples: &[(f64, f64, f64)], model: &Gaussian2D) -> f64 {
    samples
        .iter()
        .map(|&(x, y, z)| {
            let r = z - model.eval(x, y);
            r * r
        })
        .sum()
}

/// Fit a Gaussian to `(x, y, value)` samples starting from `initial`.
///
/// Returns `None` when there are too few samples, the normal equations are
/// singular at the start, or the result is not finite.
pub fn fit_gaussian_2d(
    samples: &[(f64, f64, f64)],
    initial: Gaussian2D,
    config: &GaussianFitConfig,
) -> Option<GaussianFit> {
    if samples.len() < 7 {
        return None;
    }

    let mut model = initial;
    let mut lambda = config.initial_lambda;
    let mut current = chi2(samples, &model);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        for &(x, y, z) in samples {
            let g = model.gradient(x, y);
            let r = z - model.eval(x, y);
            jtj += g * g.transpose();
            jtr += g * r;
        }

        let mut damped = jtj;
        for i in 0..6 {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
        }
        let Some(chol) = damped.cholesky() else {
            lambda *= config.lambda_up;
            if lambda > 1e12 {
                break;
            }
            continue;
        };
        let delta = chol.solve(&jtr);

        let candidate = Gaussian2D::from_params(&(model.to_params() + delta));
        let valid = candidate.sigma_x > 1e-3
            && candidate.sigma_y > 1e-3
            && candidate.to_params().iter().all(|p| p.is_finite());
        let candidate_chi2 = if valid {
            chi2(samples, &candidate)
        } else {
            f64::INFINITY
        };

        if candidate_chi2 <= current {
            let improvement = current - candidate_chi2;
            model = candidate;
            lambda *= config.lambda_down;
            let done = improvement <= config.convergence_threshold * current.max(f64::MIN_POSITIVE);
            current = candidate_chi2;
            if done {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > 1e12 {
                break;
            }
        }
    }

    if !model.to_params().iter().all(|p| p.is_finite()) {
        return None;
    }

    Some(GaussianFit {
        model,
        converged,
        iterations,
        rms_residual: (current / samples.len() as f64).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(model: &Gaussian2D, size: usize) -> Vec<(f64, f64, f64)> {
        let mut samples = Vec::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                let (x, y) = (col as f64, row as f64);
                samples.push((x, y, model.eval(x, y)));
            }
        }
        samples
    }

    #[test]
    fn test_fit_recovers_noise_free_star() {
        let truth = Gaussian2D {
            amplitude: 800.0,
            x0: 10.3,
            y0: 9.7,
            sigma_x: 1.5,
            sigma_y: 1.9,
            offset: 5.0,
        };
        let samples = render(&truth, 21);
        let initial = Gaussian2D {
            amplitude: 700.0,
            x0: 10.0,
            y0: 10.0,
            sigma_x: 2.0,
            sigma_y: 2.0,
            offset: 0.0,
        };
        let fit = fit_gaussian_2d(&samples, initial, &GaussianFitConfig::default()).unwrap();
        assert!((fit.model.x0 - truth.x0).abs() < 1e-4, "x0 = {}", fit.model.x0);
        assert!((fit.model.y0 - truth.y0).abs() < 1e-4, "y0 = {}", fit.model.y0);
        assert!((fit.model.sigma_y - truth.sigma_y).abs() < 1e-3);
        assert!(fit.rms_residual < 1e-3);
    }

    #[test]
    fn test_too_few_samples() {
        let model = Gaussian2D {
            amplitude: 1.0,
            x0: 0.0,
            y0: 0.0,
            sigma_x: 1.0,
            sigma_y: 1.0,
            offset: 0.0,
        };
        let samples = render(&model, 2);
        assert!(fit_gaussian_2d(&samples, model, &GaussianFitConfig::default()).is_none());
    }
}
