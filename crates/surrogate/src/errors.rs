#[derive(Debug, thiserror::Error)]
pub enum SurrogateError {
    /// Returned when the training set is empty or degenerate.
    #[error("invalid training data: {0}")]
    InvalidTrainingData(String),

    /// Returned when the training data dimensions do not line up.
    #[error("shape mismatch: {rows} rows of x but {targets} targets")]
    ShapeMismatch {
        /// Number of rows in the input matrix.
        rows: usize,
        /// Number of target values.
        targets: usize,
    },

    /// Returned when model fitting fails (e.g. the kernel matrix is not
    /// positive definite even after jittering).
    #[error("model fitting failed: {0}")]
    Fit(String),

    /// Returned when a prediction is requested with the wrong input width.
    #[error("prediction dimension mismatch: model was fit on {expected} columns, got {got}")]
    PredictDimensionMismatch {
        /// Input width the model was trained on.
        expected: usize,
        /// Input width of the query.
        got: usize,
    },
}

pub type Result<T> = std::result::Result<T, SurrogateError>;
