//! `nsbo-solver` optimizes expensive, noisy, mixed-type configuration
//! spaces (database knobs, cluster settings) under a small evaluation
//! budget.
//!
//! The optimizer works in a low-dimensional random embedding of the
//! original space: same-typed parameters are grouped into bins that share
//! one embedded coordinate. A trust region around the incumbent shrinks
//! when iterations fail to improve; when it collapses, the embedding is
//! split into finer bins (migrating all observations), and once full
//! dimensionality is reached the search restarts from fresh random samples
//! while keeping the global history. Measurement noise is handled by a
//! per-run [`NoisePolicy`] that decides how repeated benchmark runs become
//! observations and how progress is judged.
//!
//! The surrogate model is pluggable through the
//! [`SurrogateBuilder`](nsbo_surrogate::SurrogateBuilder) trait; the
//! companion `nsbo-surrogate` crate ships a Gaussian process default. The
//! benchmark itself is abstracted as an [`Oracle`].
//!
//! ```
//! use ndarray::ArrayView1;
//! use nsbo_solver::{NoisePolicy, NsboConfig, NsboSolver, Oracle, ParamDef, SearchSpace};
//! use nsbo_surrogate::GpSurrogateBuilder;
//!
//! struct Quadratic;
//!
//! impl Oracle for Quadratic {
//!     fn evaluate(&mut self, x: ArrayView1<f64>, _reset: bool) -> f64 {
//!         x.iter().map(|v| v * v).sum()
//!     }
//! }
//!
//! # fn main() -> nsbo_solver::Result<()> {
//! let space = SearchSpace::new(vec![
//!     ParamDef::binary("cache_enabled"),
//!     ParamDef::binary("compression"),
//!     ParamDef::continuous("memory_fraction", 0.1, 0.9),
//! ])?;
//! let config = NsboConfig::default()
//!     .n_init(3)
//!     .max_evals(5)
//!     .initial_target_dim(2)
//!     .noise(NoisePolicy::RepeatedSingle);
//! let mut solver = NsboSolver::new(config, space, GpSurrogateBuilder::default())?;
//! let mut oracle = Quadratic;
//! let best = solver.run(&mut oracle)?;
//! assert!(best.mean.is_finite());
//! # Ok(())
//! # }
//! ```

mod acquisition;
mod config;
mod embedding;
mod errors;
mod noise;
mod observations;
mod oracle;
mod persistence;
mod solver;
mod space;
mod trust_region;

pub use acquisition::{best_posterior_index, norm_cdf, norm_pdf, Acquisition};
pub use config::{AcquisitionKind, NsboConfig, ValidNsboConfig};
pub use embedding::{grid_values, remap, Bin, IndexMapping, RandomEmbedding};
pub use errors::{NsboError, Result};
pub use noise::{Assessment, EvaluatedBatch, NoisePolicy};
pub use observations::{sample_std, Normalization, ObservationStore};
pub use oracle::{Oracle, FAILURE_SENTINEL};
pub use persistence::{RunRecorder, TrEvent};
pub use solver::{BestSolution, NsboSolver, RunState, NSBO_LOG};
pub use space::{ParamDef, SearchSpace};
pub use trust_region::TrustRegion;
