//! Acquisition criteria
//!
//! Expected improvement in its minimization form, plus the augmented
//! variant of Huang et al. (2006) that discounts candidates whose predicted
//! improvement drowns in measurement noise. Posterior-best helpers live
//! here too since the incumbent definition is tied to the criterion in use.

use libm::erfc;
use ndarray::{Array1, ArrayView2};
use nsbo_surrogate::SurrogateModel;

use crate::errors::Result;

const SQRT_2PI: f64 = 2.506_628_274_631_000_7;

/// Standard normal cumulative distribution function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal probability density function.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// Acquisition criterion parameterized by the current incumbent value.
#[derive(Debug, Clone, Copy)]
pub enum Acquisition {
    ExpectedImprovement { best_f: f64 },
    /// `noise_scale` is the noise std τ the augmented criterion discounts by.
    AugmentedExpectedImprovement { best_f: f64, noise_scale: f64 },
}

impl Acquisition {
    /// Scores one posterior prediction; larger is better.
    pub fn score(&self, mean: f64, std: f64) -> f64 {
        match *self {
            Acquisition::ExpectedImprovement { best_f } => {
                expected_improvement(best_f, mean, std)
            }
            Acquisition::AugmentedExpectedImprovement { best_f, noise_scale } => {
                let ei = expected_improvement(best_f, mean, std);
                ei * (1.0 - noise_scale / (std * std + noise_scale * noise_scale).sqrt())
            }
        }
    }

    /// Scores a batch of predictions.
    pub fn score_batch(&self, means: &Array1<f64>, stds: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            means
                .iter()
                .zip(stds.iter())
                .map(|(&m, &s)| self.score(m, s)),
        )
    }
}

fn expected_improvement(best_f: f64, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return (best_f - mean).max(0.0);
    }
    let improvement = best_f - mean;
    let z = improvement / std;
    improvement * norm_cdf(z) + std * norm_pdf(z)
}

/// Index and value of the posterior-best observed point.
///
/// With `mean_only` the incumbent is the smallest posterior mean; otherwise
/// a std margin is folded in, matching the risk-adjusted incumbent the
/// augmented criterion pairs with.
pub fn best_posterior_index(
    model: &dyn SurrogateModel,
    xs: &ArrayView2<f64>,
    mean_only: bool,
) -> Result<(usize, f64)> {
    let scores = if mean_only {
        model.posterior_mean(xs)?
    } else {
        let (mean, std) = model.posterior_mean_and_std(xs)?;
        &mean - &std
    };
    let mut best = 0;
    for (i, v) in scores.iter().enumerate() {
        if *v < scores[best] {
            best = i;
        }
    }
    Ok((best, scores[best]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_norm_cdf_reference_values() {
        assert_abs_diff_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.975, epsilon = 1e-3);
        assert_abs_diff_eq!(norm_cdf(-1.96), 0.025, epsilon = 1e-3);
    }

    #[test]
    fn test_ei_prefers_lower_mean() {
        let acq = Acquisition::ExpectedImprovement { best_f: 1.0 };
        assert!(acq.score(0.5, 0.1) > acq.score(0.9, 0.1));
    }

    #[test]
    fn test_ei_zero_std_is_plain_improvement() {
        let acq = Acquisition::ExpectedImprovement { best_f: 1.0 };
        assert_abs_diff_eq!(acq.score(0.25, 0.0), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(acq.score(2.0, 0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_score_batch_matches_pointwise_scores() {
        let acq = Acquisition::AugmentedExpectedImprovement {
            best_f: 1.0,
            noise_scale: 0.3,
        };
        let means = array![0.2, 0.8, 1.5];
        let stds = array![0.1, 0.0, 0.4];
        let batch = acq.score_batch(&means, &stds);
        for ((m, s), b) in means.iter().zip(stds.iter()).zip(batch.iter()) {
            assert_abs_diff_eq!(acq.score(*m, *s), *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_augmented_discounts_noise() {
        let ei = Acquisition::ExpectedImprovement { best_f: 1.0 };
        let aei = Acquisition::AugmentedExpectedImprovement {
            best_f: 1.0,
            noise_scale: 0.5,
        };
        let plain = ei.score(0.5, 0.2);
        let discounted = aei.score(0.5, 0.2);
        assert!(discounted < plain);
        assert!(discounted >= 0.0);
        // with negligible noise the criteria agree
        let aei0 = Acquisition::AugmentedExpectedImprovement {
            best_f: 1.0,
            noise_scale: 1e-12,
        };
        assert_abs_diff_eq!(aei0.score(0.5, 0.2), plain, epsilon = 1e-9);
    }
}
