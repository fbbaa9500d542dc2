use thiserror::Error;

use cartera_remote::{BlobError, RemoteError};

/// Errors produced by the sync layer.
///
/// Validation errors are raised before any remote call; remote and
/// storage errors propagate the collaborator's failure after any
/// compensating action has run. The gateway never retries on its own
/// beyond the configured [`crate::RetryPolicy`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// Rejected before any remote write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The document store rejected an operation.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Object storage rejected an operation.
    #[error(transparent)]
    Storage(#[from] BlobError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
