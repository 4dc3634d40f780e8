//! The run loop
//!
//! Ties the pieces together: initial sampling, the fit/propose/measure
//! iteration, trust-region bookkeeping, splitting and restarting, artifact
//! recording and the terminal confirmatory evaluation of the best found
//! configuration.

use env_logger::{Builder, Env};
use log::{debug, info};
use ndarray::Array1;
use ndarray_stats::QuantileExt;
use nsbo_surrogate::SurrogateBuilder;

use crate::acquisition::{best_posterior_index, Acquisition};
use crate::config::{AcquisitionKind, NsboConfig, ValidNsboConfig};
use crate::errors::{NsboError, Result};
use crate::noise::{EvaluatedBatch, NoisePolicy};
use crate::observations::{sample_std, Normalization};
use crate::oracle::Oracle;
use crate::persistence::{RunRecorder, TrEvent};
use crate::solver::candidates::propose_batch;
use crate::solver::state::RunState;
use crate::space::SearchSpace;
use crate::trust_region::TrustRegion;

/// Environment variable controlling the log filter.
pub const NSBO_LOG: &str = "NSBO_LOG";

/// The best configuration found by a run, confirmed by repeated
/// measurement after the evaluation budget was exhausted.
#[derive(Debug, Clone)]
pub struct BestSolution {
    /// The configuration in original units.
    pub x_up: Array1<f64>,
    /// Confirmatory measurements.
    pub fxs: Array1<f64>,
    pub mean: f64,
    pub std: f64,
}

/// Sequential noise-aware optimizer over a mixed configuration space.
pub struct NsboSolver<SB: SurrogateBuilder> {
    config: ValidNsboConfig,
    space: SearchSpace,
    surrogate: SB,
    state: RunState,
    recorder: Option<RunRecorder>,
}

impl<SB: SurrogateBuilder> NsboSolver<SB> {
    pub fn new(config: NsboConfig, space: SearchSpace, surrogate: SB) -> Result<Self> {
        let env = Env::new().filter_or(NSBO_LOG, "info");
        let mut builder = Builder::from_env(env);
        let builder = builder.target(env_logger::Target::Stdout);
        builder.try_init().ok();

        let config = config.check()?;
        let state = RunState::new(&config, &space)?;
        Ok(NsboSolver {
            config,
            space,
            surrogate,
            state,
            recorder: None,
        })
    }

    pub fn config(&self) -> &ValidNsboConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Mutable access to the run state, for callers that steer the run
    /// (warm starts, forced restarts, external schedulers).
    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    /// Runs the full optimization and returns the confirmed best solution.
    pub fn run(&mut self, oracle: &mut dyn Oracle) -> Result<BestSolution> {
        if let Some(dir) = self.config.get().results_dir.clone() {
            self.recorder = Some(RunRecorder::create(dir, &oracle.workload())?);
        }
        self.sample_init(oracle)?;
        while self.state.n_evals <= self.config.get().max_evals {
            self.iterate(oracle)?;
        }
        self.best_solution(oracle)
    }

    /// Draws, measures and stores the initial design for the current
    /// embedding. Called at run start and after every restart.
    pub fn sample_init(&mut self, oracle: &mut dyn Oracle) -> Result<()> {
        let cfg = self.config.get().clone();
        let xs_down = self
            .state
            .embedding
            .sample_initial(cfg.n_init, &mut self.state.rng)?;
        let xs_up = self
            .space
            .from_unit_around_origin(&self.state.embedding.project_up(&xs_down.view()).view());
        let batch = cfg.noise.evaluate(
            &xs_down.view(),
            &xs_up.view(),
            oracle,
            cfg.benchmarking_repetitions,
        );
        self.store_batch(&batch)?;
        self.state.n_evals += cfg.n_init;
        info!(
            "Initial design stored: {} configurations, {} observation rows",
            cfg.n_init,
            self.state.store.len_local()
        );
        Ok(())
    }

    /// One fit/propose/measure/update iteration.
    pub fn iterate(&mut self, oracle: &mut dyn Oracle) -> Result<()> {
        let cfg = self.config.get().clone();
        self.state.store.impute_failures()?;

        let x_scaled = self.state.store.x_tr.mapv(|v| (v + 1.0) / 2.0);
        let norm = Normalization::fit(&self.state.store.fx_tr);
        let fx_scaled = norm.apply(&self.state.store.fx_tr);
        let model = self.surrogate.fit(x_scaled.view(), fx_scaled.view())?;

        let mean_only = self.config.effective();
        let raw_compare = matches!(
            cfg.noise,
            NoisePolicy::RepeatedMean | NoisePolicy::RepeatedSingle
        );
        let best_f = if raw_compare && cfg.acquisition == AcquisitionKind::ExpectedImprovement {
            *fx_scaled.min().map_err(|_| NsboError::EmptyTrustRegion)?
        } else {
            best_posterior_index(model.as_ref(), &x_scaled.view(), mean_only)?.1
        };
        let acquisition = match cfg.acquisition {
            AcquisitionKind::ExpectedImprovement => Acquisition::ExpectedImprovement { best_f },
            AcquisitionKind::AugmentedExpectedImprovement => {
                Acquisition::AugmentedExpectedImprovement {
                    best_f,
                    noise_scale: cfg.aei_noise_scale,
                }
            }
        };

        let center_idx = if raw_compare {
            fx_scaled.argmin().map_err(|_| NsboError::EmptyTrustRegion)?
        } else {
            best_posterior_index(model.as_ref(), &x_scaled.view(), mean_only)?.0
        };
        let center = x_scaled.row(center_idx).to_owned();

        let cand_low = propose_batch(
            model.as_ref(),
            &acquisition,
            &self.state.embedding,
            &self.state.trust_region,
            &center,
            cfg.n_interleaved,
            cfg.batch_size,
            &mut self.state.rng,
        )?;
        let cand_scaled = cand_low.mapv(|v| (v + 1.0) / 2.0);
        let cand_up = self
            .space
            .from_unit_around_origin(&self.state.embedding.project_up(&cand_low.view()).view());

        let batch = cfg.noise.evaluate(
            &cand_low.view(),
            &cand_up.view(),
            oracle,
            cfg.benchmarking_repetitions,
        );
        let assessment = cfg.noise.assess(
            model.as_ref(),
            &norm,
            &cand_scaled.view(),
            &batch.fxs,
            &x_scaled.view(),
            &self.state.store,
            mean_only,
            cfg.benchmarking_repetitions,
            &mut self.state.rng,
        )?;
        if assessment.fx_next < assessment.fx_incumbent {
            info!(
                "Iteration {}: new incumbent value {:.3}",
                self.state.n_evals, assessment.fx_next
            );
        } else {
            info!(
                "Iteration {}: no improvement, best value {:.3}",
                self.state.n_evals, assessment.fx_incumbent
            );
        }

        let factor = self.state.adjustment_factor(cfg.max_evals, cfg.batch_size);
        self.state
            .trust_region
            .update(assessment.fx_next, assessment.fx_incumbent, factor);
        debug!(
            "Trust region length {:.3}, minimum {:.3}",
            self.state.trust_region.length_discrete_continuous,
            self.state.trust_region.length_min_discrete
        );
        self.state.consume_budget(cfg.batch_size);

        self.store_batch(&batch)?;

        if let Some(recorder) = &self.recorder {
            let best_observed = *self
                .state
                .store
                .fx_tr
                .min()
                .map_err(|_| NsboError::EmptyTrustRegion)?;
            recorder.append_tr_event(&TrEvent {
                n_evals: self.state.n_evals,
                dimensionality: self.state.embedding.target_dim(),
                length: self.state.trust_region.length_discrete_continuous,
                fx_next: assessment.fx_next,
                fx_incumbent: assessment.fx_incumbent,
                best_observed,
                incumbent_repeats: assessment.incumbent_repeats.map(|r| r.to_vec()),
            })?;
        }

        if self.state.trust_region.terminated() {
            if self.state.embedding.target_dim() < self.state.embedding.input_dim() {
                self.split()?;
            } else {
                self.restart(oracle)?;
            }
        }

        self.snapshot()?;
        Ok(())
    }

    /// Splits the embedding, migrates the low-dimensional ledgers and opens
    /// a fresh trust region at the new dimensionality.
    fn split(&mut self) -> Result<()> {
        let cfg = self.config.get();
        info!("Trust region terminated, splitting the embedding");
        let mapping = self.state.embedding.split(cfg.n_new_bins_on_split)?;
        self.state.store.remap_low_dim(&mapping);
        self.state.trust_region = TrustRegion::new(
            self.state.embedding.target_dim(),
            cfg.length_init_discrete,
            cfg.length_min_discrete,
            cfg.success_tolerance,
        );
        self.state.note_split();
        Ok(())
    }

    /// Restarts at full dimensionality: local data is dropped, the trust
    /// region is reset and a fresh initial design is drawn. Global data
    /// survives.
    fn restart(&mut self, oracle: &mut dyn Oracle) -> Result<()> {
        info!("Reached full dimensionality, restarting with new random samples");
        self.state.reset_stage_budget();
        self.state.store.reset_local();
        self.state.trust_region.reset();
        self.sample_init(oracle)
    }

    fn store_batch(&mut self, batch: &EvaluatedBatch) -> Result<()> {
        self.state.store.append_local(
            &batch.xs_down,
            &batch.xs_up,
            &batch.fxs,
            batch.repeated_fxs.as_ref(),
            batch.repeated_xs.as_ref(),
        )
    }

    fn snapshot(&self) -> Result<()> {
        if let Some(recorder) = &self.recorder {
            recorder
                .write_results(&self.state.store.x_up_global, &self.state.store.fx_global)?;
            if let Some(rep) = &self.state.store.fx_repeated {
                recorder.write_repeated_results(rep)?;
            }
        }
        Ok(())
    }

    /// Refits on the local data, picks the posterior-mean best observed
    /// configuration and confirms it with repeated measurements.
    fn best_solution(&mut self, oracle: &mut dyn Oracle) -> Result<BestSolution> {
        let cfg = self.config.get();
        info!(
            "Confirming best configuration with {} repetitions",
            cfg.benchmarking_repetitions
        );
        let x_scaled = self.state.store.x_tr.mapv(|v| (v + 1.0) / 2.0);
        let norm = Normalization::fit(&self.state.store.fx_tr);
        let fx_scaled = norm.apply(&self.state.store.fx_tr);
        let model = self.surrogate.fit(x_scaled.view(), fx_scaled.view())?;
        let (best_idx, _) = best_posterior_index(model.as_ref(), &x_scaled.view(), true)?;
        let x_up = self.state.store.x_up_tr.row(best_idx).to_owned();

        let fxs: Vec<f64> = (0..cfg.benchmarking_repetitions)
            .map(|r| oracle.evaluate(x_up.view(), r == 0))
            .collect();
        let mean = fxs.iter().sum::<f64>() / fxs.len() as f64;
        let std = sample_std(&fxs);
        info!("Best configuration results {fxs:?}, mean {mean:.3} (±{std:.3})");
        Ok(BestSolution {
            x_up,
            fxs: Array1::from(fxs),
            mean,
            std,
        })
    }
}
