//! Error taxonomy for the analysis core.

/// Result alias used throughout the analysis core.
pub type AnalysisResult<T> = std::result::Result<T, Error>;

/// Errors produced while normalizing, combining, or updating indicators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A normalization range with `min == max` cannot scale anything.
    #[error("invalid normalization range: min {min} == max {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("malformed weight configuration in aggregate '{aggregate}': {reason}")]
    BadWeightConfig { aggregate: String, reason: String },

    /// A score value that is neither a number nor a list of numbers.
    #[error("cannot score non-numeric value: {value}")]
    InvalidScore { value: String },

    /// A post without a `model_output` field never went through the
    /// transformation pipeline.
    #[error("post '{post_id}' has no model_output field")]
    MissingModelOutput { post_id: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors surfaced by a document store implementation, propagated unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad document: {0}")]
    Serialization(#[from] serde_json::Error),
}
