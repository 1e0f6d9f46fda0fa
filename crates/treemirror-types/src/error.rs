//! Error types shared by the relay and the applier.

use std::io;
use thiserror::Error;

/// Errors raised while reducing or validating a root-relative path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The watched root's name does not appear as a segment of the path.
    #[error("root '{root}' not found in path {path}")]
    RootNotInPath { root: String, path: String },

    /// Nothing is left once the root is stripped (the root itself).
    #[error("path is empty")]
    Empty,

    /// Absolute paths cannot be resolved against a root.
    #[error("path must be relative: {0}")]
    Absolute(String),

    /// `..` segments would escape the root.
    #[error("path must not contain '..': {0}")]
    ParentSegment(String),
}

/// Errors raised by the server while applying a mutation.
///
/// Each variant maps onto exactly one HTTP status; see the server's
/// `IntoResponse` impl.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// Target path does not exist (or is not the expected kind).
    #[error("{0}")]
    NotFound(String),

    /// Wrong entry kind already occupies the target.
    #[error("{0}")]
    Conflict(String),

    /// Underlying filesystem operation failed.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Entry is neither a regular file, a directory, nor a symlink.
    #[error("{0} is neither a file nor a directory")]
    UnsupportedKind(String),

    /// Supplied relative path failed validation.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// Request was missing a field or was otherwise malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upload body exceeded the configured limit.
    #[error("upload too large: {0}")]
    PayloadTooLarge(String),
}

impl ApplyError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(context: impl Into<String>, source: io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

/// Result type alias for applier operations
pub type ApplyResult<T> = Result<T, ApplyError>;
