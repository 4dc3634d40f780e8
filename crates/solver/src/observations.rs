//! Observation ledgers
//!
//! Three append-only stores at different granularities: the global history
//! (never pruned, survives splits and restarts), the trust-region-local
//! history (reset on restart, re-expressed on split), and the raw
//! repeated-measurement history kept by the repeat-aware noise policies.
//! Row alignment between the low-dim, high-dim and objective columns is
//! checked at the interface; the repeated ledgers are dropped entirely the
//! first time a batch omits them, matching the semantics the noise policies
//! rely on.

use ndarray::{Array1, Array2, Axis};

use crate::embedding::{remap, IndexMapping};
use crate::errors::{NsboError, Result};
use crate::oracle::FAILURE_SENTINEL;

#[derive(Debug, Clone)]
pub struct ObservationStore {
    /// Trust-region-local low-dimensional points.
    pub x_tr: Array2<f64>,
    /// Trust-region-local points in the original `[-1, 1]` space.
    pub x_up_tr: Array2<f64>,
    /// Trust-region-local objective values.
    pub fx_tr: Array1<f64>,
    /// Global low-dimensional points.
    pub x_global: Array2<f64>,
    /// Global points in the original `[-1, 1]` space.
    pub x_up_global: Array2<f64>,
    /// Global objective values.
    pub fx_global: Array1<f64>,
    /// Raw repeated measurements, one row of R repeats per configuration.
    pub fx_repeated: Option<Array2<f64>>,
    /// The configurations the repeated rows belong to (original space).
    pub x_repeated: Option<Array2<f64>>,
    repetitions: usize,
}

fn append2(dst: &mut Array2<f64>, src: &Array2<f64>, context: &'static str) -> Result<()> {
    dst.append(Axis(0), src.view())
        .map_err(|_| NsboError::StoreMisaligned {
            context,
            expected: dst.ncols(),
            got: src.ncols(),
        })
}

impl ObservationStore {
    pub fn new(target_dim: usize, input_dim: usize, repetitions: usize) -> Self {
        ObservationStore {
            x_tr: Array2::zeros((0, target_dim)),
            x_up_tr: Array2::zeros((0, input_dim)),
            fx_tr: Array1::zeros(0),
            x_global: Array2::zeros((0, target_dim)),
            x_up_global: Array2::zeros((0, input_dim)),
            fx_global: Array1::zeros(0),
            fx_repeated: Some(Array2::zeros((0, repetitions))),
            x_repeated: Some(Array2::zeros((0, input_dim))),
            repetitions,
        }
    }

    /// Rows in the trust-region-local store.
    pub fn len_local(&self) -> usize {
        self.fx_tr.len()
    }

    /// Rows in the global store.
    pub fn len_global(&self) -> usize {
        self.fx_global.len()
    }

    /// Appends a batch to the local store and, transitively, to the global
    /// store. Providing `repeated_fxs`/`repeated_xs` extends the
    /// repeated-measurement ledgers; omitting either drops that ledger for
    /// the rest of the run (its alignment can no longer be trusted).
    pub fn append_local(
        &mut self,
        xs_down: &Array2<f64>,
        xs_up: &Array2<f64>,
        fxs: &Array1<f64>,
        repeated_fxs: Option<&Array2<f64>>,
        repeated_xs: Option<&Array2<f64>>,
    ) -> Result<()> {
        if xs_down.nrows() != fxs.len() {
            return Err(NsboError::StoreMisaligned {
                context: "low-dim rows vs objective values",
                expected: fxs.len(),
                got: xs_down.nrows(),
            });
        }
        if xs_up.nrows() != fxs.len() {
            return Err(NsboError::StoreMisaligned {
                context: "high-dim rows vs objective values",
                expected: fxs.len(),
                got: xs_up.nrows(),
            });
        }

        match repeated_fxs {
            Some(rep) => {
                if rep.ncols() != self.repetitions {
                    return Err(NsboError::StoreMisaligned {
                        context: "repeated measurements per row",
                        expected: self.repetitions,
                        got: rep.ncols(),
                    });
                }
                if let Some(store) = self.fx_repeated.as_mut() {
                    append2(store, rep, "repeated objective ledger")?;
                }
            }
            None => self.fx_repeated = None,
        }
        match repeated_xs {
            Some(xs) => {
                if let Some(store) = self.x_repeated.as_mut() {
                    append2(store, xs, "repeated point ledger")?;
                }
            }
            None => self.x_repeated = None,
        }

        append2(&mut self.x_tr, xs_down, "local low-dim ledger")?;
        append2(&mut self.x_up_tr, xs_up, "local high-dim ledger")?;
        self.fx_tr
            .append(Axis(0), fxs.view())
            .map_err(|_| NsboError::StoreMisaligned {
                context: "local objective ledger",
                expected: self.fx_tr.len(),
                got: fxs.len(),
            })?;

        append2(&mut self.x_global, xs_down, "global low-dim ledger")?;
        append2(&mut self.x_up_global, xs_up, "global high-dim ledger")?;
        self.fx_global
            .append(Axis(0), fxs.view())
            .map_err(|_| NsboError::StoreMisaligned {
                context: "global objective ledger",
                expected: self.fx_global.len(),
                got: fxs.len(),
            })?;
        Ok(())
    }

    /// Empties the trust-region-local store only; the global and repeated
    /// stores are untouched. Used on full-dimensionality restart.
    pub fn reset_local(&mut self) {
        self.x_tr = Array2::zeros((0, self.x_tr.ncols()));
        self.x_up_tr = Array2::zeros((0, self.x_up_tr.ncols()));
        self.fx_tr = Array1::zeros(0);
    }

    /// Re-expresses the low-dimensional ledgers under a finer embedding.
    pub fn remap_low_dim(&mut self, mapping: &IndexMapping) {
        self.x_tr = remap(&self.x_tr.view(), mapping);
        self.x_global = remap(&self.x_global.view(), mapping);
    }

    /// Replaces failure-sentinel objective values in the local store by
    /// `max(valid) + std(valid)` so failed runs are penalized without
    /// destabilizing normalization.
    ///
    /// Fails when every local value is the sentinel: the imputation std is
    /// undefined and the run must surface that state immediately.
    pub fn impute_failures(&mut self) -> Result<()> {
        if self.fx_tr.is_empty() {
            return Err(NsboError::EmptyTrustRegion);
        }
        let valid: Vec<f64> = self
            .fx_tr
            .iter()
            .copied()
            .filter(|v| *v != FAILURE_SENTINEL)
            .collect();
        if valid.len() == self.fx_tr.len() {
            return Ok(());
        }
        if valid.is_empty() {
            return Err(NsboError::AllFailuresInTrustRegion);
        }
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std = sample_std(&valid);
        let imputed = max + std;
        let mut n_failed = 0;
        for v in self.fx_tr.iter_mut() {
            if *v == FAILURE_SENTINEL {
                *v = imputed;
                n_failed += 1;
            }
        }
        log::warn!("Imputed {n_failed} failed run(s) with value {imputed:.3}");
        Ok(())
    }
}

/// Standardization of objective values for model fitting.
///
/// The surrogate is fit on `(fx - mean) / std`; predictions are mapped back
/// with [`Normalization::restore`]. A degenerate std is clamped to one so a
/// flat initial design cannot produce NaNs.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub mean: f64,
    pub std: f64,
}

impl Normalization {
    pub fn fit(values: &Array1<f64>) -> Self {
        let vals: Vec<f64> = values.to_vec();
        let mean = if vals.is_empty() {
            0.0
        } else {
            vals.iter().sum::<f64>() / vals.len() as f64
        };
        let mut std = sample_std(&vals);
        if std <= 0.0 {
            std = 1.0;
        }
        Normalization { mean, std }
    }

    pub fn apply(&self, values: &Array1<f64>) -> Array1<f64> {
        values.mapv(|v| (v - self.mean) / self.std)
    }

    /// Maps a normalized prediction back to original objective units.
    pub fn restore(&self, value: f64) -> f64 {
        value * self.std + self.mean
    }
}

/// Unbiased sample standard deviation; zero for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
        / (values.len() - 1) as f64;
    var.sqrt()
}
