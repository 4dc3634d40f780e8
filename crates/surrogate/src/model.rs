//! Surrogate model contracts
//!
//! This module defines the traits the solver uses to train and query
//! probabilistic regression models over observed (point, objective) data.

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::errors::Result;

/// A fitted probabilistic regression model over the embedded search space.
///
/// Inputs are row-wise point batches in the solver's normalized coordinates;
/// outputs are one value per row.
pub trait SurrogateModel: std::fmt::Debug {
    /// Posterior mean at each row of `x`.
    fn posterior_mean(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Posterior mean and standard deviation at each row of `x`.
    fn posterior_mean_and_std(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)>;

    /// Input width the model was trained on.
    fn input_dim(&self) -> usize;
}

/// A trait for surrogate model training (aka model configuration and fit).
///
/// Training may fail; the solver treats a failure as fatal to the current
/// iteration rather than falling back silently.
pub trait SurrogateBuilder {
    /// Train a surrogate on the dataset (`x`, `y`), one target per row of `x`.
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Box<dyn SurrogateModel>>;
}
