//! Candidate generation
//!
//! Proposes the next batch of embedded points by interleaving a greedy,
//! Hamming-constrained ascent over the discrete columns with a shrinking
//! local random search over the continuous columns, both restricted to the
//! current trust region and scored by the acquisition criterion. All search
//! happens in the scaled `[0, 1]` space the model was fit in; proposals are
//! mapped back to embedded `[-1, 1]` coordinates on the way out.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand::Rng;
use nsbo_surrogate::{ParameterType, SurrogateModel};

use crate::acquisition::Acquisition;
use crate::embedding::RandomEmbedding;
use crate::errors::{NsboError, Result};
use crate::trust_region::TrustRegion;

const LOCAL_SEARCH_SAMPLES: usize = 16;
const LOCAL_SEARCH_ROUNDS: usize = 4;

fn score_point(
    model: &dyn SurrogateModel,
    acquisition: &Acquisition,
    x: &Array1<f64>,
) -> Result<f64> {
    let row = x.view().insert_axis(Axis(0));
    let (mean, std) = model.posterior_mean_and_std(&row)?;
    Ok(acquisition.score(mean[0], std[0]))
}

/// Scaled `[0, 1]` values a discrete embedded column may take.
fn column_values(embedding: &RandomEmbedding, col: usize) -> Result<Vec<f64>> {
    let bin = &embedding.bins()[col];
    match bin.parameter_type {
        ParameterType::Binary => Ok(vec![0.0, 1.0]),
        ParameterType::Categorical | ParameterType::Ordinal => {
            let m = bin.cardinality.ok_or_else(|| {
                NsboError::InvalidSpace(format!(
                    "{:?} bin without grid cardinality",
                    bin.parameter_type
                ))
            })?;
            Ok((0..m).map(|i| i as f64 / (m - 1) as f64).collect())
        }
        _ => Err(NsboError::InvalidSpace(
            "continuous column in the discrete step".into(),
        )),
    }
}

/// Greedy single-column moves over the discrete columns, at most the trust
/// region's Hamming radius of them, each accepted only when it improves the
/// acquisition value.
fn discrete_step(
    model: &dyn SurrogateModel,
    acquisition: &Acquisition,
    embedding: &RandomEmbedding,
    trust_region: &TrustRegion,
    mut x: Array1<f64>,
) -> Result<(Array1<f64>, f64)> {
    let columns = embedding.discrete_columns();
    let mut score = score_point(model, acquisition, &x)?;
    if columns.is_empty() {
        return Ok((x, score));
    }
    let radius = trust_region.discrete_radius(columns.len());
    for _ in 0..radius {
        let mut best_move: Option<(usize, f64, f64)> = None;
        for &col in &columns {
            for value in column_values(embedding, col)? {
                if value == x[col] {
                    continue;
                }
                let mut neighbor = x.clone();
                neighbor[col] = value;
                let s = score_point(model, acquisition, &neighbor)?;
                if best_move.map_or(true, |(_, _, bs)| s > bs) {
                    best_move = Some((col, value, s));
                }
            }
        }
        match best_move {
            Some((col, value, s)) if s > score => {
                x[col] = value;
                score = s;
            }
            _ => break,
        }
    }
    Ok((x, score))
}

/// Shrinking local random search over the continuous columns inside the
/// trust-region box intersected with `[0, 1]`.
fn continuous_step(
    model: &dyn SurrogateModel,
    acquisition: &Acquisition,
    embedding: &RandomEmbedding,
    trust_region: &TrustRegion,
    x: Array1<f64>,
    rng: &mut impl Rng,
) -> Result<(Array1<f64>, f64)> {
    let columns = embedding.continuous_columns();
    let mut best_score = score_point(model, acquisition, &x)?;
    let mut best = x;
    if columns.is_empty() {
        return Ok((best, best_score));
    }
    let mut radius = trust_region.continuous_radius();
    for _ in 0..LOCAL_SEARCH_ROUNDS {
        let mut samples = Array2::zeros((LOCAL_SEARCH_SAMPLES, best.len()));
        for mut row in samples.outer_iter_mut() {
            row.assign(&best);
            for &col in &columns {
                let v = best[col] + rng.gen_range(-radius..=radius);
                row[col] = v.clamp(0.0, 1.0);
            }
        }
        let (means, stds) = model.posterior_mean_and_std(&samples.view())?;
        let scores = acquisition.score_batch(&means, &stds);
        for (i, s) in scores.iter().enumerate() {
            if *s > best_score {
                best = samples.row(i).to_owned();
                best_score = *s;
            }
        }
        radius *= 0.5;
    }
    Ok((best, best_score))
}

/// Random discrete neighbor used to decorrelate later batch items.
fn jitter_start(
    embedding: &RandomEmbedding,
    center: &Array1<f64>,
    rng: &mut impl Rng,
) -> Result<Array1<f64>> {
    let mut x = center.clone();
    let columns = embedding.discrete_columns();
    if let Some(&col) = columns.get(rng.gen_range(0..columns.len().max(1)))
    {
        let values = column_values(embedding, col)?;
        x[col] = values[rng.gen_range(0..values.len())];
    }
    Ok(x)
}

/// Proposes `batch_size` embedded candidates in `[-1, 1]` coordinates.
///
/// `center_scaled` is the incumbent in scaled `[0, 1]` space; its continuous
/// coordinates are re-imposed before each continuous step so the discrete
/// ascent cannot wander off the best known continuous settings.
#[allow(clippy::too_many_arguments)]
pub fn propose_batch(
    model: &dyn SurrogateModel,
    acquisition: &Acquisition,
    embedding: &RandomEmbedding,
    trust_region: &TrustRegion,
    center_scaled: &Array1<f64>,
    n_interleaved: usize,
    batch_size: usize,
    rng: &mut impl Rng,
) -> Result<Array2<f64>> {
    let continuous = embedding.continuous_columns();
    let mut pool: Vec<(Array1<f64>, f64)> = Vec::with_capacity(batch_size);

    for b in 0..batch_size {
        let mut x = if b == 0 || embedding.discrete_columns().is_empty() {
            center_scaled.clone()
        } else {
            jitter_start(embedding, center_scaled, rng)?
        };
        let mut score = score_point(model, acquisition, &x)?;
        for _ in 0..n_interleaved {
            let (moved, _) = discrete_step(model, acquisition, embedding, trust_region, x)?;
            x = moved;
            for &col in &continuous {
                x[col] = center_scaled[col];
            }
            let (moved, s) =
                continuous_step(model, acquisition, embedding, trust_region, x, rng)?;
            x = moved;
            score = s;
        }
        log::debug!("candidate {b}: acquisition value {score:.6}");
        pool.push((x, score));
    }

    // best-first batch order, mirroring the min-pick over per-item scores
    pool.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut out = Array2::zeros((batch_size, embedding.target_dim()));
    for (i, (x, _)) in pool.into_iter().enumerate() {
        for (col, v) in x.iter().enumerate() {
            out[[i, col]] = v * 2.0 - 1.0;
        }
    }
    Ok(out)
}
