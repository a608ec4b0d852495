use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors produced by the storage backends.
///
/// Callers inspect the kind with `matches!`, never the message. Two
/// variants carry a payload next to the error condition: [`AlreadyExists`]
/// hands back the short URL of the pre-existing record, and [`Removed`]
/// hands back the long URL of the tombstoned record so the boundary layer
/// can distinguish "gone" from "never existed".
///
/// [`AlreadyExists`]: StorageError::AlreadyExists
/// [`Removed`]: StorageError::Removed
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("url is already shortened: {short_url}")]
    AlreadyExists { short_url: String },
    #[error("short url does not exist")]
    UidNotFound,
    #[error("short url has been removed: {long_url}")]
    Removed { long_url: String },
    #[error("invalid user id")]
    UserIdNotValid,
    #[error("user does not exist")]
    UserNotFound,
    #[error("user has no shortened urls")]
    UserUrlsEmpty,
    #[error("invalid request data")]
    InvalidData,
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("snapshot operation failed: {0}")]
    Snapshot(String),
}
