use nsbo_surrogate::SurrogateError;

#[derive(Debug, thiserror::Error)]
pub enum NsboError {
    /// Returned when the search space description is unusable (empty space,
    /// categorical cardinality below two, inverted bounds, ...).
    #[error("invalid search space: {0}")]
    InvalidSpace(String),

    /// Returned when a configuration value fails validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when observation ledgers would lose row alignment.
    #[error("observation store misaligned: {context} (expected {expected} rows, got {got})")]
    StoreMisaligned {
        /// Which append was rejected.
        context: &'static str,
        /// Expected row count.
        expected: usize,
        /// Offending row count.
        got: usize,
    },

    /// Returned when every benchmarked point in the trust region carries the
    /// failure sentinel, leaving the imputation std undefined.
    #[error("all observations in the trust region are failed runs; cannot impute")]
    AllFailuresInTrustRegion,

    /// Returned when an operation needs trust-region observations but the
    /// local store is empty.
    #[error("trust-region observation store is empty")]
    EmptyTrustRegion,

    /// Returned when a split is requested at full dimensionality.
    #[error("cannot split embedding: target dimensionality {target_dim} already equals input dimensionality")]
    SplitAtFullDimensionality {
        /// Current embedded dimensionality.
        target_dim: usize,
    },

    /// Surrogate model training failed; fatal to the run.
    #[error("surrogate model fit failed")]
    Surrogate(#[from] SurrogateError),

    /// Artifact persistence failed.
    #[error("persistence error")]
    Io(#[from] std::io::Error),

    /// Trust-region event record serialization failed.
    #[error("record serialization error")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NsboError>;
