use std::path::PathBuf;

/// Errors surfaced by the training pipelines.
///
/// Tensor shape problems inside burn ops are not represented here; those
/// panic inside the framework and abort the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RBM visible units must be exactly 0.0 or 1.0.
    #[error("visible units must be binary, found {value} at row {row}, column {col}")]
    NonBinaryInput { row: usize, col: usize, value: f32 },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("dataset `{0}` is empty")]
    EmptyDataset(&'static str),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("record error: {0}")]
    Record(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
