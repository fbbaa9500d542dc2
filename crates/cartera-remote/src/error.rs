use thiserror::Error;

/// Errors produced by the remote document store.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// A write targeted a document that does not exist.
    #[error("no document `{id}` in collection `{collection}`")]
    NotFound { collection: String, id: String },

    /// The backend rejected or could not service the request.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// An atomic batch was rejected; no operation in it was applied.
    #[error("batch rejected: {0}")]
    BatchRejected(String),
}

/// Errors produced by object storage.
#[derive(Error, Debug)]
pub enum BlobError {
    /// No blob stored at the given path.
    #[error("no blob at `{0}`")]
    NotFound(String),

    /// The path escapes the storage root or contains invalid components.
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),

    /// Underlying I/O failure.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RemoteError>;
