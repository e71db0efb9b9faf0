//! Error types for the stage pipeline.

use std::sync::Arc;

/// Boxed error returned by stage transformations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for the pipeline engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A stage's transformation failed for a single item. The item is dropped.
    #[error("stage `{stage}` failed to transform item: {source}")]
    Transform {
        stage: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A stage was registered with zero workers
    #[error("stage `{stage}` must have at least one worker")]
    InvalidWorkerCount { stage: String },

    /// The pipeline was configured with a zero-capacity queue
    #[error("queue buffer size must be greater than zero")]
    InvalidBufferSize,

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Wrap a transformation failure raised by `stage`
    pub fn transform(stage: impl Into<String>, error: BoxError) -> Self {
        Error::Transform {
            stage: stage.into(),
            source: Arc::from(error),
        }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Name of the stage that produced this error, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            Error::Transform { stage, .. } | Error::InvalidWorkerCount { stage } => Some(stage),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;
