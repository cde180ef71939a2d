//! Runtime error types.

use mosaic_core::CompositeError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;

/// Errors that can occur while building or running a [`MosaicRuntime`](crate::MosaicRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The log file could not be opened.
    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// Composition or a lifecycle transition failed.
    #[error(transparent)]
    Composite(#[from] CompositeError),

    /// Installing the shutdown signal handlers failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// The composite error, if this is one.
    pub fn as_composite(&self) -> Option<&CompositeError> {
        match self {
            Self::Composite(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
