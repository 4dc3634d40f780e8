//! Evaluation oracle contract
//!
//! The oracle runs the expensive, possibly noisy benchmark for one
//! configuration in original units and returns its scalar cost. A failed
//! benchmark run is reported with [`FAILURE_SENTINEL`] rather than an error;
//! the observation store later imputes a penalized finite value before any
//! model fitting.

use ndarray::ArrayView1;

/// Objective value reserved for failed benchmark executions.
pub const FAILURE_SENTINEL: f64 = 10_000.0;

/// The external, expensive evaluation function being minimized.
pub trait Oracle {
    /// Evaluates one configuration in original units.
    ///
    /// `reset` signals that any stateful external process should be
    /// reinitialized before measuring; the solver sets it on the first of a
    /// run of repeated measurements of the same configuration.
    fn evaluate(&mut self, x_up: ArrayView1<f64>, reset: bool) -> f64;

    /// Identity of the workload being tuned, recorded once at startup.
    fn workload(&self) -> String {
        String::new()
    }
}
