//! Crate-wide error type.
//!
//! Every failure is raised at the boundary of the operation that detects
//! it; there is no silent recovery. NaN in resampled data is a value, not
//! an error (see [`crate::epochs`]).
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Timing files with inconsistent run counts, unparsable onsets, or a
    /// trial table missing a required column.
    #[error("malformed timing source: {0}")]
    MalformedTimingSource(String),

    /// An event array with zero rows was handed to the epoch extractor.
    /// Callers that iterate over runs may legitimately skip such a run.
    #[error("event array has zero rows")]
    EmptyEventSet,

    /// Number of per-run event arrays does not match the number of cached
    /// recordings.
    #[error("{events} event arrays supplied for {runs} recordings")]
    RunCountMismatch { events: usize, runs: usize },

    /// An epochs tensor, event array, or label dictionary disagrees in
    /// shape or content with its companions.
    #[error("shape invariant violation: {0}")]
    ShapeInvariantViolation(String),

    /// A cache blob exists but cannot be read back. Never silently
    /// rebuilt; delete the blob to force fresh construction.
    #[error("corrupt cache blob {}: {reason}", path.display())]
    CorruptCache { path: PathBuf, reason: String },

    /// `Epochs::summary` needs the ordered condition factor names in the
    /// epochs metadata to explode composite labels into columns.
    #[error("summary requires condition factor names in the epochs metadata")]
    ConditionsNotDeclared,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}
