//! Noise-handling policies
//!
//! One policy is fixed per run and owns two decisions: how candidate
//! configurations are measured (how many repeats, and how the repeats turn
//! into observation rows) and how iteration progress is judged (which value
//! stands in for the new batch and for the incumbent). Measurement always
//! iterates point-major: all repeats of one configuration run back to back,
//! with the oracle reset before the first repeat only.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_rand::rand::Rng;
use nsbo_surrogate::SurrogateModel;
use serde::{Deserialize, Serialize};

use crate::acquisition::best_posterior_index;
use crate::errors::{NsboError, Result};
use crate::observations::{sample_std, Normalization, ObservationStore};
use crate::oracle::Oracle;

/// How repeated, noisy measurements enter the observation stores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NoisePolicy {
    /// Every configuration is measured R times and each repeat becomes its
    /// own observation row; the model sees the noise directly.
    Noisy,
    /// R repeats per configuration collapsed into a single mean row; the
    /// raw repeats are kept in the repeated ledger.
    RepeatedMean,
    /// One measurement per configuration, treated as noise free.
    RepeatedSingle,
    /// Per-configuration branching: noisy configurations (repeat std above
    /// the threshold) keep all R rows, quiet ones collapse to the mean.
    Adaptive { threshold: f64 },
}

/// A measured batch, shaped for [`ObservationStore::append_local`].
#[derive(Debug, Clone)]
pub struct EvaluatedBatch {
    pub xs_down: Array2<f64>,
    pub xs_up: Array2<f64>,
    pub fxs: Array1<f64>,
    pub repeated_fxs: Option<Array2<f64>>,
    pub repeated_xs: Option<Array2<f64>>,
}

/// Progress judgement for one iteration, in original objective units.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Value standing in for the new batch.
    pub fx_next: f64,
    /// Value standing in for the incumbent.
    pub fx_incumbent: f64,
    /// Raw repeated measurements of the incumbent, when on record.
    pub incumbent_repeats: Option<Array1<f64>>,
}

fn measure(oracle: &mut dyn Oracle, x_up: ArrayView1<f64>, repetitions: usize) -> Vec<f64> {
    (0..repetitions)
        .map(|r| oracle.evaluate(x_up, r == 0))
        .collect()
}

fn stack_rows(rows: &[ArrayView1<f64>], ncols: usize) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), ncols));
    for (mut dst, src) in out.outer_iter_mut().zip(rows) {
        dst.assign(src);
    }
    out
}

fn argmin(values: &Array1<f64>) -> Result<usize> {
    if values.is_empty() {
        return Err(NsboError::EmptyTrustRegion);
    }
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    Ok(best)
}

impl NoisePolicy {
    /// Measures a batch of configurations. `xs_down` and `xs_up` hold one
    /// row per configuration; the returned batch may hold more rows when
    /// repeats are kept as individual observations.
    pub fn evaluate(
        &self,
        xs_down: &ArrayView2<f64>,
        xs_up: &ArrayView2<f64>,
        oracle: &mut dyn Oracle,
        repetitions: usize,
    ) -> EvaluatedBatch {
        let target_dim = xs_down.ncols();
        let input_dim = xs_up.ncols();
        match *self {
            NoisePolicy::Noisy => {
                let mut down = Vec::new();
                let mut up = Vec::new();
                let mut fxs = Vec::new();
                for (x_down, x_up) in xs_down.outer_iter().zip(xs_up.outer_iter()) {
                    for fx in measure(oracle, x_up, repetitions) {
                        down.push(x_down);
                        up.push(x_up);
                        fxs.push(fx);
                    }
                }
                EvaluatedBatch {
                    xs_down: stack_rows(&down, target_dim),
                    xs_up: stack_rows(&up, input_dim),
                    fxs: Array1::from(fxs),
                    repeated_fxs: None,
                    repeated_xs: None,
                }
            }
            NoisePolicy::RepeatedMean => {
                let n = xs_up.nrows();
                let mut repeated = Array2::zeros((n, repetitions));
                let mut fxs = Array1::zeros(n);
                for (i, x_up) in xs_up.outer_iter().enumerate() {
                    let reps = measure(oracle, x_up, repetitions);
                    fxs[i] = reps.iter().sum::<f64>() / repetitions as f64;
                    for (j, fx) in reps.into_iter().enumerate() {
                        repeated[[i, j]] = fx;
                    }
                }
                EvaluatedBatch {
                    xs_down: xs_down.to_owned(),
                    xs_up: xs_up.to_owned(),
                    fxs,
                    repeated_fxs: Some(repeated),
                    repeated_xs: None,
                }
            }
            NoisePolicy::RepeatedSingle => {
                let fxs = Array1::from_iter(
                    xs_up.outer_iter().map(|x_up| oracle.evaluate(x_up, true)),
                );
                EvaluatedBatch {
                    xs_down: xs_down.to_owned(),
                    xs_up: xs_up.to_owned(),
                    fxs,
                    repeated_fxs: None,
                    repeated_xs: None,
                }
            }
            NoisePolicy::Adaptive { threshold } => {
                let n = xs_up.nrows();
                let mut repeated = Array2::zeros((n, repetitions));
                let mut down = Vec::new();
                let mut up = Vec::new();
                let mut fxs = Vec::new();
                for (i, (x_down, x_up)) in
                    xs_down.outer_iter().zip(xs_up.outer_iter()).enumerate()
                {
                    let reps = measure(oracle, x_up, repetitions);
                    for (j, fx) in reps.iter().enumerate() {
                        repeated[[i, j]] = *fx;
                    }
                    let std = sample_std(&reps);
                    if std > threshold {
                        log::info!("[{i}/{n}] repeat std {std:.4} > {threshold:.4}, keeping all repeats");
                        for fx in reps {
                            down.push(x_down);
                            up.push(x_up);
                            fxs.push(fx);
                        }
                    } else {
                        log::info!("[{i}/{n}] repeat std {std:.4} <= {threshold:.4}, collapsing to mean");
                        down.push(x_down);
                        up.push(x_up);
                        fxs.push(reps.iter().sum::<f64>() / repetitions as f64);
                    }
                }
                EvaluatedBatch {
                    xs_down: stack_rows(&down, target_dim),
                    xs_up: stack_rows(&up, input_dim),
                    fxs: Array1::from(fxs),
                    repeated_fxs: Some(repeated),
                    repeated_xs: Some(xs_up.to_owned()),
                }
            }
        }
    }

    /// Judges one iteration's progress before the new batch is stored.
    ///
    /// `cand_scaled` holds the candidate points and `x_scaled` the current
    /// training points, both in the scaled `[0, 1]` embedded space the model
    /// was fit in. The repeat-aware policies compare raw observed values;
    /// the noise-exposed policies compare denormalized posterior means so a
    /// lucky noisy measurement cannot masquerade as an incumbent.
    #[allow(clippy::too_many_arguments)]
    pub fn assess(
        &self,
        model: &dyn SurrogateModel,
        norm: &Normalization,
        cand_scaled: &ArrayView2<f64>,
        cand_fxs: &Array1<f64>,
        x_scaled: &ArrayView2<f64>,
        store: &ObservationStore,
        mean_only: bool,
        repetitions: usize,
        rng: &mut impl Rng,
    ) -> Result<Assessment> {
        match *self {
            NoisePolicy::Noisy => {
                let (_, next_val) = best_posterior_index(model, cand_scaled, mean_only)?;
                let (best_idx, best_val) = best_posterior_index(model, x_scaled, mean_only)?;
                let target = x_scaled.row(best_idx);
                let mut indices: Vec<usize> = x_scaled
                    .outer_iter()
                    .enumerate()
                    .filter(|(_, row)| *row == target)
                    .map(|(i, _)| i)
                    .collect();
                // several stored configurations can coincide; keep one
                // block of R repeats so the report stays per-configuration
                if indices.len() > repetitions {
                    let blocks = indices.len() / repetitions;
                    let b = rng.gen_range(0..blocks);
                    indices = indices[b * repetitions..(b + 1) * repetitions].to_vec();
                }
                let repeats =
                    Array1::from_iter(indices.iter().map(|&i| store.fx_tr[i]));
                Ok(Assessment {
                    fx_next: norm.restore(next_val),
                    fx_incumbent: norm.restore(best_val),
                    incumbent_repeats: Some(repeats),
                })
            }
            NoisePolicy::RepeatedMean => {
                let next_idx = argmin(cand_fxs)?;
                let best_idx = argmin(&store.fx_tr)?;
                let incumbent_repeats = store.fx_repeated.as_ref().and_then(|fr| {
                    if fr.nrows() == store.len_local() {
                        Some(fr.row(best_idx).to_owned())
                    } else {
                        log::debug!("repeated ledger out of step with local store, skipping incumbent repeats");
                        None
                    }
                });
                Ok(Assessment {
                    fx_next: cand_fxs[next_idx],
                    fx_incumbent: store.fx_tr[best_idx],
                    incumbent_repeats,
                })
            }
            NoisePolicy::RepeatedSingle => {
                let next_idx = argmin(cand_fxs)?;
                let best_idx = argmin(&store.fx_tr)?;
                Ok(Assessment {
                    fx_next: cand_fxs[next_idx],
                    fx_incumbent: store.fx_tr[best_idx],
                    incumbent_repeats: None,
                })
            }
            NoisePolicy::Adaptive { .. } => {
                let (_, next_val) = best_posterior_index(model, cand_scaled, mean_only)?;
                let means = model.posterior_mean(x_scaled)?;
                let best_idx = argmin(&means)?;
                let incumbent_repeats = match (&store.x_repeated, &store.fx_repeated) {
                    (Some(xr), Some(fr)) => {
                        let target = store.x_up_tr.row(best_idx);
                        let matches: Vec<usize> = xr
                            .outer_iter()
                            .enumerate()
                            .filter(|(_, row)| *row == target)
                            .map(|(i, _)| i)
                            .collect();
                        if matches.is_empty() {
                            log::debug!("incumbent has no repeated measurements on record");
                            None
                        } else {
                            let pick = if matches.len() > 1 {
                                matches[rng.gen_range(0..matches.len())]
                            } else {
                                matches[0]
                            };
                            Some(fr.row(pick).to_owned())
                        }
                    }
                    _ => None,
                };
                Ok(Assessment {
                    fx_next: norm.restore(next_val),
                    fx_incumbent: norm.restore(means[best_idx]),
                    incumbent_repeats,
                })
            }
        }
    }

    /// True when the policy keeps a raw repeated-measurement ledger.
    pub fn keeps_repeats(&self) -> bool {
        matches!(self, NoisePolicy::RepeatedMean | NoisePolicy::Adaptive { .. })
    }
}
