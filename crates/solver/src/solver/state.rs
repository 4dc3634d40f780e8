//! Run state
//!
//! Everything the run loop mutates between iterations: the observation
//! stores, the embedding, the trust region, the per-dimensionality split
//! budgets and the run RNG. Split budgets divide the evaluation horizon
//! over the forecast dimensionality stages in proportion to each stage's
//! dimensionality, so later, higher-dimensional stages get more of the
//! budget.

use std::collections::HashMap;

use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::config::ValidNsboConfig;
use crate::embedding::RandomEmbedding;
use crate::errors::Result;
use crate::observations::ObservationStore;
use crate::space::SearchSpace;
use crate::trust_region::TrustRegion;

/// The dimensionality of every forecast stage: starting at the initial
/// target dimensionality, each split multiplies by `k + 1` until the input
/// dimensionality is reached.
fn forecast_dims(initial: usize, k: usize, input: usize) -> Vec<usize> {
    let mut d = initial.min(input);
    let mut dims = vec![d];
    while d < input {
        d = (d * (k + 1)).min(input);
        dims.push(d);
    }
    dims
}

#[derive(Debug)]
pub struct RunState {
    pub store: ObservationStore,
    pub embedding: RandomEmbedding,
    pub trust_region: TrustRegion,
    /// Remaining evaluation budget per forecast dimensionality.
    pub split_budgets: HashMap<usize, usize>,
    /// Number of embedding splits performed so far.
    pub tr_splits: usize,
    /// Evaluated configurations (repeats count once).
    pub n_evals: usize,
    pub rng: Xoshiro256Plus,
    initial_target_dim: usize,
    n_new_bins: usize,
    budget_pool: usize,
    stage_dims: Vec<usize>,
}

impl RunState {
    pub fn new(config: &ValidNsboConfig, space: &SearchSpace) -> Result<Self> {
        let cfg = config.get();
        let mut rng = Xoshiro256Plus::seed_from_u64(cfg.seed);
        let embedding = RandomEmbedding::new(space, cfg.initial_target_dim, &mut rng)?;
        let store = ObservationStore::new(
            embedding.target_dim(),
            embedding.input_dim(),
            cfg.benchmarking_repetitions,
        );
        let trust_region = TrustRegion::new(
            embedding.target_dim(),
            cfg.length_init_discrete,
            cfg.length_min_discrete,
            cfg.success_tolerance,
        );

        let stage_dims = forecast_dims(
            cfg.initial_target_dim,
            cfg.n_new_bins_on_split,
            embedding.input_dim(),
        );
        let budget_pool = cfg.max_evals_until_input_dim.saturating_sub(cfg.n_init);
        let mut state = RunState {
            store,
            embedding,
            trust_region,
            split_budgets: HashMap::new(),
            tr_splits: 0,
            n_evals: 0,
            rng,
            initial_target_dim: cfg.initial_target_dim,
            n_new_bins: cfg.n_new_bins_on_split,
            budget_pool,
            stage_dims,
        };
        for dim in state.stage_dims.clone() {
            state
                .split_budgets
                .insert(dim, state.stage_budget(dim));
        }
        log::debug!(
            "forecast stages {:?}, budgets {:?}",
            state.stage_dims,
            state.split_budgets
        );
        Ok(state)
    }

    /// Evaluation budget granted to a stage of the given dimensionality.
    pub fn stage_budget(&self, dimensionality: usize) -> usize {
        let total: usize = self.stage_dims.iter().sum();
        if total == 0 {
            return 1;
        }
        let share =
            (self.budget_pool as f64 * dimensionality as f64 / total as f64).round() as usize;
        share.max(1)
    }

    /// The dimensionality the current stage was planned for. The realized
    /// embedding dimensionality can differ slightly (splits are bounded by
    /// bin sizes); budgets are keyed by the forecast.
    pub fn forecasted_tr_dim(&self) -> usize {
        let mut dim = self.initial_target_dim;
        for _ in 0..self.tr_splits {
            dim = (dim * (self.n_new_bins + 1)).min(self.embedding.input_dim());
        }
        dim.min(self.embedding.input_dim())
    }

    /// Trust-region adjustment factor for one iteration: the factor that,
    /// applied once per remaining stage evaluation, would walk the length
    /// down to its minimum exactly at budget exhaustion.
    pub fn adjustment_factor(&self, max_evals: usize, batch_size: usize) -> f64 {
        let dim = self.forecasted_tr_dim();
        let remaining = self
            .split_budgets
            .get(&dim)
            .copied()
            .unwrap_or(1)
            .min(max_evals.saturating_sub(self.n_evals))
            .max(1);
        let tr = &self.trust_region;
        let factor = (tr.length_min_discrete / tr.length_discrete_continuous)
            .powf(1.0 / remaining as f64)
            .powi(batch_size as i32);
        log::info!(
            "Adjusting trust region by factor {factor:.3}; remaining stage budget {remaining}"
        );
        factor.max(1e-10)
    }

    /// Charges `batch_size` evaluations against the current stage budget.
    pub fn consume_budget(&mut self, batch_size: usize) {
        let dim = self.forecasted_tr_dim();
        let entry = self.split_budgets.entry(dim).or_insert(1);
        *entry = entry.saturating_sub(batch_size);
        self.n_evals += batch_size;
    }

    /// Notes a split and refreshes the next stage's budget.
    pub fn note_split(&mut self) {
        if self.tr_splits + 1 < self.stage_dims.len() {
            self.tr_splits += 1;
        }
        let dim = self.forecasted_tr_dim();
        let budget = self.stage_budget(dim);
        self.split_budgets.insert(dim, budget);
    }

    /// Refreshes the current stage's budget on a full-dimensionality
    /// restart, granting it the full-input-dimensionality share.
    pub fn reset_stage_budget(&mut self) {
        let budget = self.stage_budget(self.embedding.input_dim());
        self.split_budgets.insert(self.forecasted_tr_dim(), budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NsboConfig;
    use crate::space::ParamDef;

    fn binary_space(dim: usize) -> SearchSpace {
        SearchSpace::new(
            (0..dim)
                .map(|i| ParamDef::binary(&format!("b{i}")))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_forecast_dims_grow_to_input_dim() {
        assert_eq!(forecast_dims(5, 2, 40), vec![5, 15, 40]);
        assert_eq!(forecast_dims(5, 2, 5), vec![5]);
        assert_eq!(forecast_dims(8, 1, 10), vec![8, 10]);
    }

    #[test]
    fn test_budgets_favor_later_stages() {
        let cfg = NsboConfig::default()
            .initial_target_dim(2)
            .check()
            .unwrap();
        let state = RunState::new(&cfg, &binary_space(8)).unwrap();
        // stages 2, 6, 8
        let b2 = state.split_budgets[&2];
        let b8 = state.split_budgets[&8];
        assert!(b8 > b2);
        assert!(b2 >= 1);
    }

    #[test]
    fn test_forecast_dim_follows_splits() {
        let cfg = NsboConfig::default()
            .initial_target_dim(2)
            .check()
            .unwrap();
        let mut state = RunState::new(&cfg, &binary_space(8)).unwrap();
        assert_eq!(state.forecasted_tr_dim(), 2);
        state.note_split();
        assert_eq!(state.forecasted_tr_dim(), 6);
        state.note_split();
        assert_eq!(state.forecasted_tr_dim(), 8);
        // capped once the forecast reaches the input dimensionality
        state.note_split();
        assert_eq!(state.forecasted_tr_dim(), 8);
    }

    #[test]
    fn test_adjustment_factor_shrinks_and_is_clamped() {
        let cfg = NsboConfig::default().check().unwrap();
        let mut state = RunState::new(&cfg, &binary_space(12)).unwrap();
        let factor = state.adjustment_factor(50, 1);
        assert!(factor > 0.0 && factor < 1.0);

        // a huge length-to-minimum ratio cannot push the factor to zero
        state.trust_region.length_discrete_continuous = 1e200;
        state.split_budgets.clear();
        let clamped = state.adjustment_factor(50, 1000);
        assert!(clamped >= 1e-10);
    }
}
