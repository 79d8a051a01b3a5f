mod book;
mod borrowing;
mod user;

pub use self::book::{Book, NewBook};
pub(crate) use self::book::BookRow;
pub use self::borrowing::{Borrowing, Loan};
pub(crate) use self::borrowing::{BorrowingRow, LoanRow};
pub use self::user::User;
pub(crate) use self::user::{UserRow, validate_name};
