use std::path::PathBuf;

use thiserror::Error;

/// Every failure the trainer, the data layer or the driver can report.
///
/// Nothing is retried: errors propagate to the caller and the driver exits.
#[derive(Debug, Error)]
pub enum Error {
    #[error("modality channels (t1 {t1} + b0 {b0}) do not sum to input_dim {input_dim}")]
    ChannelMismatch { t1: usize, b0: usize, input_dim: usize },

    #[error("wrong input setting: no input modality is enabled")]
    NoInputModality,

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("batch is missing the '{0}' modality")]
    MissingModality(&'static str),

    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("state mismatch: {0}")]
    StateMismatch(String),

    #[error("invalid device '{0}'")]
    InvalidDevice(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unrecognised checkpoint file name '{0}'")]
    UnknownCheckpoint(String),

    #[error("{path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn shape(
        context: impl Into<String>,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> Self {
        Error::ShapeMismatch { context: context.into(), expected, found }
    }
}
