use thiserror::Error;

use crate::transport::TransportError;

/// An error that happens when fetching blobs or definitions from upstream.
///
/// Errors are cloneable because they are stored in the in-memory caches and replayed
/// to every caller of the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The repository, commit or file does not exist upstream.
    #[error("not found")]
    NotFound,
    /// The requested revision does not resolve to a commit.
    #[error("commit not found")]
    CommitNotFound,
    /// There is no code intelligence index for the requested file.
    #[error("lsif not found")]
    LsifUnavailable,
    /// The query could not be executed, or upstream answered with a list of errors.
    ///
    /// The attached string contains the transport or upstream error messages.
    #[error("transport error: {0}")]
    Transport(String),
    /// The query succeeded, but its payload does not have the expected shape.
    #[error("malformed: {0}")]
    Malformed(String),
    /// An unexpected error in the fetch layer itself, such as a panicking computation.
    #[error("internal error")]
    InternalError,
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// An entry in a cache, containing either `Ok(T)` or an error denoting the reason why an
/// item could not be fetched.
pub type CacheEntry<T = ()> = Result<T, FetchError>;
