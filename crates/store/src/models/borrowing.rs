use crate::error::{Error, ErrorKind};
use crate::models::{Book, BookRow};
use exn::ResultExt;
use time::UtcDateTime;

/// A borrowing event: one user taking one book out once.
///
/// A fact record. After creation it is mutated in exactly one way: setting
/// `returned_at` once, transitioning the loan from open to closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Borrowing {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub borrowed_at: UtcDateTime,
    /// `None` while the book is still checked out.
    pub returned_at: Option<UtcDateTime>,
}

impl Borrowing {
    /// Returns `true` if the book has not been returned yet.
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// A borrowing joined with the book it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Loan {
    pub borrowing: Borrowing,
    pub book: Book,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BorrowingRow {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) book_id: i64,
    pub(crate) borrowed_at: i64,
    pub(crate) returned_at: Option<i64>,
}
impl TryFrom<BorrowingRow> for Borrowing {
    type Error = Error;
    fn try_from(row: BorrowingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            borrowed_at: UtcDateTime::from_unix_timestamp(row.borrowed_at)
                .or_raise(|| ErrorKind::InvalidData("borrow date"))?,
            returned_at: row
                .returned_at
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("return date"))?,
        })
    }
}

/// Join row for `borrowings INNER JOIN books`.
///
/// The borrowing's own id is aliased to `loan_id` in the query so it doesn't
/// collide with the book's `id` column; `book_id` is omitted since it is by
/// definition equal to the joined book's id.
#[derive(sqlx::FromRow)]
pub(crate) struct LoanRow {
    pub(crate) loan_id: i64,
    pub(crate) user_id: i64,
    pub(crate) borrowed_at: i64,
    pub(crate) returned_at: Option<i64>,
    #[sqlx(flatten)]
    pub(crate) book: BookRow,
}
impl TryFrom<LoanRow> for Loan {
    type Error = Error;
    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        let borrowing = Borrowing::try_from(BorrowingRow {
            id: row.loan_id,
            user_id: row.user_id,
            book_id: row.book.id,
            borrowed_at: row.borrowed_at,
            returned_at: row.returned_at,
        })?;
        let book = Book::try_from(row.book)?;
        Ok(Loan { borrowing, book })
    }
}
