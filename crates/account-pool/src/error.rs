//! Error types for pool operations

/// Errors from pool operations.
///
/// Unparsable persisted lines are not an error: they are carried as
/// [`CooldownLine::Malformed`](crate::CooldownLine::Malformed) and preserved.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The available pool is empty. Expected, reported to the caller.
    #[error("out of stock")]
    OutOfStock,

    /// A pool file could not be read or written.
    #[error("pool store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    pub(crate) fn store(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Error::StoreUnavailable(format!("{context}: {err}"))
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
