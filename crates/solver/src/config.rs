//! Run configuration
//!
//! [`NsboConfig`] is a builder validated into [`ValidNsboConfig`] before a
//! run starts. Defaults follow the reference deployment for database and
//! cluster parameter tuning: 10 initial samples, initial embedded
//! dimensionality 5, 3 benchmarking repetitions, initial trust-region
//! length 40.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{NsboError, Result};
use crate::noise::NoisePolicy;

/// Acquisition function selected for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionKind {
    /// Plain improvement-based criterion.
    ExpectedImprovement,
    /// Risk-adjusted criterion for noisy measurements (Huang et al. 2006).
    AugmentedExpectedImprovement,
}

/// NSBO configuration builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsboConfig {
    /// Number of initial points drawn per (re)start.
    pub n_init: usize,
    /// Embedded dimensionality at run start.
    pub initial_target_dim: usize,
    /// Number of new bins added per bin on a split.
    pub n_new_bins_on_split: usize,
    /// Total evaluation budget (in configurations, not repeats).
    pub max_evals: usize,
    /// Evaluation horizon over which dimensionality should reach the input
    /// dimensionality; drives per-dimensionality split budgets.
    pub max_evals_until_input_dim: usize,
    /// Number of configurations proposed per iteration.
    pub batch_size: usize,
    /// Interleaved discrete/continuous proposal rounds per iteration.
    pub n_interleaved: usize,
    /// Repetition count R for repeated benchmarking.
    pub benchmarking_repetitions: usize,
    /// Active noise-handling policy; fixed for the lifetime of a run.
    pub noise: NoisePolicy,
    /// Acquisition function choice.
    pub acquisition: AcquisitionKind,
    /// Noise scale τ of the augmented acquisition criterion.
    pub aei_noise_scale: f64,
    /// Initial trust-region length (shared discrete/continuous scalar).
    pub length_init_discrete: f64,
    /// Minimum trust-region length; below it the region terminates.
    pub length_min_discrete: f64,
    /// Consecutive strict improvements required before the region expands.
    pub success_tolerance: usize,
    /// Run-wide RNG seed.
    pub seed: u64,
    /// Directory for run artifacts; disables persistence when unset.
    pub results_dir: Option<PathBuf>,
}

impl Default for NsboConfig {
    fn default() -> Self {
        NsboConfig {
            n_init: 10,
            initial_target_dim: 5,
            n_new_bins_on_split: 2,
            max_evals: 50,
            max_evals_until_input_dim: 45,
            batch_size: 1,
            n_interleaved: 5,
            benchmarking_repetitions: 3,
            noise: NoisePolicy::Noisy,
            acquisition: AcquisitionKind::ExpectedImprovement,
            aei_noise_scale: 1.0,
            length_init_discrete: 40.0,
            length_min_discrete: 1.0,
            success_tolerance: 3,
            seed: 1996,
            results_dir: None,
        }
    }
}

impl NsboConfig {
    pub fn n_init(mut self, n: usize) -> Self {
        self.n_init = n;
        self
    }

    pub fn initial_target_dim(mut self, d: usize) -> Self {
        self.initial_target_dim = d;
        self
    }

    pub fn n_new_bins_on_split(mut self, k: usize) -> Self {
        self.n_new_bins_on_split = k;
        self
    }

    pub fn max_evals(mut self, n: usize) -> Self {
        self.max_evals = n;
        self
    }

    pub fn max_evals_until_input_dim(mut self, n: usize) -> Self {
        self.max_evals_until_input_dim = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn n_interleaved(mut self, n: usize) -> Self {
        self.n_interleaved = n;
        self
    }

    pub fn benchmarking_repetitions(mut self, r: usize) -> Self {
        self.benchmarking_repetitions = r;
        self
    }

    pub fn noise(mut self, noise: NoisePolicy) -> Self {
        self.noise = noise;
        self
    }

    pub fn acquisition(mut self, kind: AcquisitionKind) -> Self {
        self.acquisition = kind;
        self
    }

    pub fn trust_region_lengths(mut self, init: f64, min: f64) -> Self {
        self.length_init_discrete = init;
        self.length_min_discrete = min;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    /// Validates the configuration.
    pub fn check(self) -> Result<ValidNsboConfig> {
        if self.n_init == 0 {
            return Err(NsboError::InvalidConfig("n_init must be positive".into()));
        }
        if self.initial_target_dim == 0 {
            return Err(NsboError::InvalidConfig(
                "initial_target_dim must be positive".into(),
            ));
        }
        if self.batch_size == 0 || self.n_interleaved == 0 {
            return Err(NsboError::InvalidConfig(
                "batch_size and n_interleaved must be positive".into(),
            ));
        }
        if self.benchmarking_repetitions == 0 {
            return Err(NsboError::InvalidConfig(
                "benchmarking_repetitions must be positive".into(),
            ));
        }
        if self.max_evals < self.n_init {
            return Err(NsboError::InvalidConfig(
                "max_evals must cover the initial samples".into(),
            ));
        }
        if !(self.length_min_discrete > 0.0 && self.length_init_discrete > self.length_min_discrete)
        {
            return Err(NsboError::InvalidConfig(
                "trust-region lengths must satisfy 0 < min < init".into(),
            ));
        }
        if let NoisePolicy::Adaptive { threshold } = self.noise {
            if !(threshold > 0.0) {
                return Err(NsboError::InvalidConfig(
                    "adaptive noise threshold must be positive".into(),
                ));
            }
        }
        Ok(ValidNsboConfig(self))
    }
}

/// A checked configuration; the only form the solver accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidNsboConfig(NsboConfig);

impl ValidNsboConfig {
    pub fn get(&self) -> &NsboConfig {
        &self.0
    }

    /// True when incumbent predictions use the posterior mean only
    /// ("effective" best); tied to the augmented acquisition criterion.
    pub fn effective(&self) -> bool {
        self.0.acquisition == AcquisitionKind::AugmentedExpectedImprovement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NsboConfig::default().check().is_ok());
    }

    #[test]
    fn test_rejects_zero_repetitions() {
        let cfg = NsboConfig {
            benchmarking_repetitions: 0,
            ..Default::default()
        };
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_rejects_inverted_trust_region_lengths() {
        let cfg = NsboConfig::default().trust_region_lengths(1.0, 4.0);
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_effective_follows_acquisition() {
        let ei = NsboConfig::default().check().unwrap();
        assert!(!ei.effective());
        let aei = NsboConfig::default()
            .acquisition(AcquisitionKind::AugmentedExpectedImprovement)
            .check()
            .unwrap();
        assert!(aei.effective());
    }
}
