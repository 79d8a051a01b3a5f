//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. `UserNotFound`/`BookNotFound`/`AlreadyBorrowed` are expected
/// outcomes of borrow/return calls with bad input and should be reported to
/// the caller; `InvalidData` names the field of an insert that broke a
/// catalog invariant (or of a stored row that couldn't be decoded);
/// `Database` means the store itself rejected the operation.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("user not found: {_0}")]
    UserNotFound(#[error(not(source))] i64),
    #[display("book not found: {_0}")]
    BookNotFound(#[error(not(source))] i64),
    #[display("user {_0} already has book {_1} on loan")]
    AlreadyBorrowed(#[error(not(source))] i64, i64),
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
