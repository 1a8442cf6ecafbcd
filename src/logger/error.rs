use thiserror::Error;

/// A failure of the logger itself. Neither kind is ever propagated to the host; both are
/// handed to the `on_error` hook (or logged if there is none).
#[derive(Error, Debug)]
pub enum LoggerError {
    /// Checking, deleting or installing the index template failed.
    #[error("Failed to provision index template '{template}': {cause:#}")]
    Provisioning {
        template: String,
        cause: anyhow::Error,
    },

    /// Writing a log document failed. The document is lost.
    #[error("Failed to write log document into '{index}': {cause:#}")]
    Write { index: String, cause: anyhow::Error },
}

impl LoggerError {
    /// The underlying error chain.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            LoggerError::Provisioning { cause, .. } => cause,
            LoggerError::Write { cause, .. } => cause,
        }
    }
}
