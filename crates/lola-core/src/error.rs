//! Error taxonomy for the LoLa shared-memory binding core.
//!
//! Recoverable kinds cross the public boundary as `Result` values; the
//! few precondition violations the design calls out (moved-from guard
//! reused, mismatched queue positions) abort instead.

use thiserror::Error;

/// Result type alias for LoLa core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error enum for the binding.
#[derive(Error, Debug)]
pub enum Error {
    /// Another live skeleton already owns this (service, instance), or a
    /// directory/watch operation failed terminally.
    #[error("BindingFailure: {0}")]
    BindingFailure(String),

    /// A shared-memory object could not be created or opened.
    #[error("ErroneousFileHandle: {0}")]
    ErroneousFileHandle(String),

    /// The method call queue has no free slot (non-fatal, caller may retry).
    #[error("CallQueueFull")]
    CallQueueFull,

    /// Invalid configuration detected at startup (duplicate IDs, ASIL
    /// mismatch, unsupported queue size). Terminal for the process.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable error-code string for upward propagation.
    pub fn code(&self) -> &'static str {
        match self {
            Error::BindingFailure(_) => "BINDING_FAILURE",
            Error::ErroneousFileHandle(_) => "ERRONEOUS_FILE_HANDLE",
            Error::CallQueueFull => "CALL_QUEUE_FULL",
            Error::Configuration(_) => "CONFIGURATION",
            Error::Io(_) => "IO",
            Error::Json(_) => "JSON",
        }
    }

    /// True for kinds that are expected to be retried by the caller rather
    /// than treated as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BindingFailure(_) | Error::ErroneousFileHandle(_) | Error::CallQueueFull
        )
    }
}
