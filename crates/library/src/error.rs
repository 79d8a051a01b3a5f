//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a facade failure.
///
/// `UserNotFound`, `BookNotFound`, and `AlreadyBorrowed` are expected
/// outcomes of borrow calls with stale or wrong identifiers; `Validation`
/// means the caller's input never reached the store. `Store` covers the
/// persistence layer rejecting an otherwise well-formed operation.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("store error")]
    Store,
    #[display("user not found: {_0}")]
    UserNotFound(#[error(not(source))] i64),
    #[display("book not found: {_0}")]
    BookNotFound(#[error(not(source))] i64),
    #[display("user {_0} already has book {_1} on loan")]
    AlreadyBorrowed(#[error(not(source))] i64, i64),
    #[display("invalid value for {_0}")]
    Validation(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
