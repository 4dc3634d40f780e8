//! Default Gaussian process surrogate
//!
//! A Matérn 5/2 GP fit by Cholesky factorization of the jittered kernel
//! matrix. Hyperparameters are set by closed-form heuristics (median
//! pairwise distance for the lengthscale, sample variance of the targets for
//! the signal variance) instead of marginal-likelihood optimization, which
//! keeps training deterministic and cheap for the small trust-region
//! datasets the solver produces.

use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::errors::{Result, SurrogateError};
use crate::model::{SurrogateBuilder, SurrogateModel};

/// Matérn 5/2 covariance between two points with an isotropic lengthscale.
fn matern52(x1: ArrayView1<f64>, x2: ArrayView1<f64>, lengthscale: f64, signal_var: f64) -> f64 {
    let d2: f64 = x1
        .iter()
        .zip(x2.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    let r = d2.sqrt() / lengthscale;
    let s5r = 5f64.sqrt() * r;
    signal_var * (1.0 + s5r + 5.0 * r * r / 3.0) * (-s5r).exp()
}

/// Median pairwise distance over the training rows, used as the default
/// lengthscale. Falls back to 1.0 for degenerate data (fewer than two
/// distinct rows).
fn median_distance(x: &ArrayView2<f64>) -> f64 {
    let n = x.nrows();
    let mut dists = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let d2: f64 = x
                .row(i)
                .iter()
                .zip(x.row(j).iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            let d = d2.sqrt();
            if d > 0.0 {
                dists.push(d);
            }
        }
    }
    if dists.is_empty() {
        return 1.0;
    }
    dists.sort_by(|a, b| a.total_cmp(b));
    dists[dists.len() / 2]
}

/// Builder for the default Gaussian process surrogate.
#[derive(Debug, Clone)]
pub struct GpSurrogateBuilder {
    noise_variance: f64,
    lengthscale: Option<f64>,
}

impl Default for GpSurrogateBuilder {
    fn default() -> Self {
        GpSurrogateBuilder {
            noise_variance: 1e-6,
            lengthscale: None,
        }
    }
}

impl GpSurrogateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observation noise variance added to the kernel diagonal.
    pub fn noise_variance(mut self, v: f64) -> Self {
        self.noise_variance = v;
        self
    }

    /// Fixes the isotropic lengthscale instead of the median heuristic.
    pub fn lengthscale(mut self, l: f64) -> Self {
        self.lengthscale = Some(l);
        self
    }
}

impl SurrogateBuilder for GpSurrogateBuilder {
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Box<dyn SurrogateModel>> {
        if x.nrows() == 0 {
            return Err(SurrogateError::InvalidTrainingData(
                "empty training set".into(),
            ));
        }
        if x.nrows() != y.len() {
            return Err(SurrogateError::ShapeMismatch {
                rows: x.nrows(),
                targets: y.len(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(SurrogateError::InvalidTrainingData(
                "non-finite target value".into(),
            ));
        }

        let n = x.nrows();
        let lengthscale = self.lengthscale.unwrap_or_else(|| median_distance(&x));
        let y_mean = y.iter().sum::<f64>() / n as f64;
        let signal_var = if n > 1 {
            (y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum::<f64>() / (n - 1) as f64).max(1e-6)
        } else {
            1.0
        };

        let x_train = x.to_owned();
        let y_centered = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));

        // Retry with growing jitter if the kernel matrix is not positive
        // definite in floating point.
        let mut noise = self.noise_variance.max(1e-12);
        for _ in 0..4 {
            let k = DMatrix::from_fn(n, n, |i, j| {
                let v = matern52(x_train.row(i), x_train.row(j), lengthscale, signal_var);
                if i == j {
                    v + noise
                } else {
                    v
                }
            });
            if let Some(cholesky) = nalgebra::linalg::Cholesky::new(k) {
                let alpha = cholesky.solve(&y_centered);
                return Ok(Box::new(GpSurrogate {
                    x_train,
                    cholesky,
                    alpha,
                    y_mean,
                    lengthscale,
                    signal_var,
                }));
            }
            debug!("kernel matrix not positive definite with jitter {noise:.1e}, retrying");
            noise *= 100.0;
        }
        Err(SurrogateError::Fit(format!(
            "kernel matrix not positive definite for {n} points (lengthscale {lengthscale:.3e})"
        )))
    }
}

/// A fitted Matérn 5/2 Gaussian process.
#[derive(Debug)]
pub struct GpSurrogate {
    x_train: ndarray::Array2<f64>,
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// Solution of (K + σ²I) α = y - ȳ.
    alpha: DVector<f64>,
    y_mean: f64,
    lengthscale: f64,
    signal_var: f64,
}

impl GpSurrogate {
    fn kernel_vector(&self, x: ArrayView1<f64>) -> DVector<f64> {
        DVector::from_fn(self.x_train.nrows(), |i, _| {
            matern52(self.x_train.row(i), x, self.lengthscale, self.signal_var)
        })
    }

    fn check_width(&self, x: &ArrayView2<f64>) -> Result<()> {
        if x.ncols() != self.x_train.ncols() {
            return Err(SurrogateError::PredictDimensionMismatch {
                expected: self.x_train.ncols(),
                got: x.ncols(),
            });
        }
        Ok(())
    }
}

impl SurrogateModel for GpSurrogate {
    fn posterior_mean(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        self.check_width(x)?;
        let mut out = Array1::zeros(x.nrows());
        for (i, row) in x.rows().into_iter().enumerate() {
            let k_star = self.kernel_vector(row);
            out[i] = self.y_mean + k_star.dot(&self.alpha);
        }
        Ok(out)
    }

    fn posterior_mean_and_std(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        self.check_width(x)?;
        let mut mean = Array1::zeros(x.nrows());
        let mut std = Array1::zeros(x.nrows());
        for (i, row) in x.rows().into_iter().enumerate() {
            let k_star = self.kernel_vector(row);
            mean[i] = self.y_mean + k_star.dot(&self.alpha);
            let v = self.cholesky.solve(&k_star);
            let var = self.signal_var - k_star.dot(&v);
            std[i] = var.max(0.0).sqrt();
        }
        Ok((mean, std))
    }

    fn input_dim(&self) -> usize {
        self.x_train.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_interpolates_training_points() {
        let x = array![[0.0, 0.0], [0.5, 0.5], [1.0, 0.0], [0.2, 0.9]];
        let y = array![1.0, 2.0, 0.5, 3.0];
        let model = GpSurrogateBuilder::new().fit(x.view(), y.view()).unwrap();
        let mean = model.posterior_mean(&x.view()).unwrap();
        for (m, t) in mean.iter().zip(y.iter()) {
            assert_abs_diff_eq!(m, t, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_std_grows_away_from_data() {
        let x = array![[0.0], [0.2], [0.4]];
        let y = array![0.0, 1.0, 0.0];
        let model = GpSurrogateBuilder::new().fit(x.view(), y.view()).unwrap();
        let query = array![[0.2], [5.0]];
        let (_, std) = model.posterior_mean_and_std(&query.view()).unwrap();
        assert!(std[0] < std[1]);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0];
        let err = GpSurrogateBuilder::new().fit(x.view(), y.view()).unwrap_err();
        assert!(matches!(err, SurrogateError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_target_is_an_error() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, f64::NAN];
        assert!(GpSurrogateBuilder::new().fit(x.view(), y.view()).is_err());
    }

    #[test]
    fn test_prediction_width_checked() {
        let x = array![[0.0, 1.0], [1.0, 0.0]];
        let y = array![0.0, 1.0];
        let model = GpSurrogateBuilder::new().fit(x.view(), y.view()).unwrap();
        let bad = array![[0.0]];
        assert!(model.posterior_mean(&bad.view()).is_err());
    }
}
