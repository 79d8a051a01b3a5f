//! Repository for books, users, and the borrowing ledger.
//!
//! The three entity types are tightly coupled: a borrowing is meaningless
//! without the user and book it references, so one repository covers all of
//! them rather than one per table.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Book, BookRow, Borrowing, BorrowingRow, Loan, LoanRow, NewBook, User, UserRow, validate_name};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

/// Repository for catalog entities.
///
/// Cheap to clone: it holds only a handle to the connection pool. Every
/// method represents one logical unit of work; multi-statement mutations run
/// inside a transaction that commits on success and rolls back on drop, so a
/// failed call never leaves partially-applied state behind.
///
/// All returned values are detached models. Nothing borrowed from a
/// connection survives past the method call.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn sqlx_hates_usize(limit: usize) -> Result<i64> {
        i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Insert a single book, returning the stored record with its assigned id.
    ///
    /// The book must pass [`NewBook::validate`]; nothing is written otherwise.
    pub async fn insert_book(&self, book: &NewBook) -> Result<Book> {
        book.validate()?;
        let row: BookRow = sqlx::query_as(include_str!("../queries/insert_book.sql"))
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.genre)
            .bind(i64::from(book.year))
            .bind(book.rating)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.try_into()
    }

    /// Insert a batch of books in a single transaction.
    ///
    /// This is the insert-many capability bulk loaders rely on: every book
    /// passes [`NewBook::validate`] before anything is written, and either
    /// the whole batch lands or none of it does.
    pub async fn insert_books(&self, books: &[NewBook]) -> Result<u64> {
        for book in books {
            book.validate()?;
        }
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for book in books {
            sqlx::query(include_str!("../queries/insert_book.sql"))
                .bind(&book.title)
                .bind(&book.author)
                .bind(&book.genre)
                .bind(i64::from(book.year))
                .bind(book.rating)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(books.len() as u64)
    }

    /// Get a book by id.
    pub async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Book::try_from).transpose()
    }

    /// List every book in the catalog, in id (discovery) order.
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Search books with the predicate pushed down to SQL.
    ///
    /// Case-sensitive contains over title, author, and genre, via `instr()`
    /// rather than `LIKE` (which is case-insensitive for ASCII in SQLite).
    /// An empty keyword matches every book, the same as `str::contains("")`.
    pub async fn search_books(&self, keyword: &str) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/search_books.sql"))
            .bind(keyword)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// The top `limit` books by rating (descending, id ascending on ties).
    pub async fn top_rated_books(&self, limit: usize) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/top_rated.sql"))
            .bind(Self::sqlx_hates_usize(limit)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Top-rated books the user has never borrowed, any genre.
    pub async fn top_rated_excluding(&self, user_id: i64, limit: usize) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/top_rated_excluding.sql"))
            .bind(user_id)
            .bind(Self::sqlx_hates_usize(limit)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Top-rated books of one genre the user has never borrowed.
    pub async fn top_rated_in_genre_excluding(&self, user_id: i64, genre: &str, limit: usize) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/top_rated_in_genre_excluding.sql"))
            .bind(user_id)
            .bind(genre)
            .bind(Self::sqlx_hates_usize(limit)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Count the books in the catalog.
    pub async fn count_books(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_books.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(count as u64)
    }

    /// Mean rating across all books; 0.0 when the catalog is empty.
    pub async fn average_rating(&self) -> Result<f64> {
        // COALESCE turns AVG's NULL-on-empty into 0.0, so there is no
        // division by zero to dodge here.
        sqlx::query_scalar(include_str!("../queries/average_rating.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user, returning the stored record with its assigned id.
    ///
    /// Names must be non-blank. Duplicate names are accepted; uniqueness is
    /// the caller's convention.
    pub async fn insert_user(&self, name: &str) -> Result<User> {
        validate_name(name)?;
        let row: UserRow = sqlx::query_as(include_str!("../queries/insert_user.sql"))
            .bind(name)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.try_into()
    }

    /// Insert a batch of users in a single transaction.
    ///
    /// Every name is checked before anything is written; one blank name
    /// keeps the whole batch out.
    pub async fn insert_users(&self, names: &[String]) -> Result<u64> {
        for name in names {
            validate_name(name)?;
        }
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for name in names {
            sqlx::query(include_str!("../queries/insert_user.sql"))
                .bind(name)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(names.len() as u64)
    }

    /// Get a user by id.
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(include_str!("../queries/get_user.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(User::try_from).transpose()
    }

    /// List every registered user, in id order.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(include_str!("../queries/list_users.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(User::try_from).collect()
    }

    /// Count the registered users.
    pub async fn count_users(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_users.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(count as u64)
    }

    // =========================================================================
    // Borrowings
    // =========================================================================

    /// Check out a book for a user.
    ///
    /// The existence checks and the insert run in one transaction, so two
    /// racing calls cannot both observe "no open loan" and both insert.
    /// Raises [`ErrorKind::UserNotFound`], [`ErrorKind::BookNotFound`], or
    /// [`ErrorKind::AlreadyBorrowed`] as appropriate; the transaction rolls
    /// back on every error path.
    #[instrument(skip(self))]
    pub async fn borrow(&self, user_id: i64, book_id: i64) -> Result<Borrowing> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let user: Option<UserRow> = sqlx::query_as(include_str!("../queries/get_user.sql"))
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if user.is_none() {
            exn::bail!(ErrorKind::UserNotFound(user_id));
        }
        let book: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if book.is_none() {
            exn::bail!(ErrorKind::BookNotFound(book_id));
        }
        let open: Option<BorrowingRow> = sqlx::query_as(include_str!("../queries/open_borrowing.sql"))
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if open.is_some() {
            exn::bail!(ErrorKind::AlreadyBorrowed(user_id, book_id));
        }
        let row: BorrowingRow = sqlx::query_as(include_str!("../queries/insert_borrowing.sql"))
            .bind(user_id)
            .bind(book_id)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(user_id, book_id, "book checked out");
        row.try_into()
    }

    /// Close the unique open loan for a (user, book) pair.
    ///
    /// Returns `Ok(false)` if there is nothing to close: the single UPDATE
    /// targets `returned_at IS NULL`, so a loan can only ever transition
    /// from open to closed once.
    #[instrument(skip(self))]
    pub async fn return_book(&self, user_id: i64, book_id: i64) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/close_borrowing.sql"))
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the open loan for a (user, book) pair, if any.
    pub async fn open_borrowing(&self, user_id: i64, book_id: i64) -> Result<Option<Borrowing>> {
        let row: Option<BorrowingRow> = sqlx::query_as(include_str!("../queries/open_borrowing.sql"))
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Borrowing::try_from).transpose()
    }

    /// Every borrowing a user ever made, most recent first.
    pub async fn borrowings_for_user(&self, user_id: i64) -> Result<Vec<Borrowing>> {
        let rows: Vec<BorrowingRow> = sqlx::query_as(include_str!("../queries/borrowings_for_user.sql"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Borrowing::try_from).collect()
    }

    /// Every borrowing a user ever made, joined with its book, most recent
    /// first. One entry per borrowing event, so re-borrowed books repeat.
    pub async fn borrowed_history(&self, user_id: i64) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(include_str!("../queries/borrowed_history.sql"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// The user's currently open loans, joined with their books.
    pub async fn currently_borrowed(&self, user_id: i64) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(include_str!("../queries/currently_borrowed.sql"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Loan::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    fn book(title: &str, genre: &str, rating: f64) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Test Author".to_string(),
            genre: genre.to_string(),
            year: 2020,
            rating,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_book() {
        let repo = repo().await;
        let inserted = repo.insert_book(&book("Dune", "Science Fiction", 8.7)).await.unwrap();
        let fetched = repo.get_book(inserted.id).await.unwrap().unwrap();
        assert_eq!(inserted, fetched);
        assert!(repo.get_book(inserted.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_insert_is_atomic_per_batch() {
        let repo = repo().await;
        // One off-scale rating at the end keeps the whole batch out.
        let mut batch = vec![book("A", "Fiction", 5.0), book("B", "Fiction", 6.0), book("C", "Mystery", 42.0)];
        let err = repo.insert_books(&batch).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("rating")));
        assert_eq!(repo.count_books().await.unwrap(), 0);

        batch.last_mut().unwrap().rating = 7.0;
        assert_eq!(repo.insert_books(&batch).await.unwrap(), 3);
        assert_eq!(repo.count_books().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_insert_paths_reject_invalid_books() {
        let repo = repo().await;
        let mut bad = book("", "Fiction", 42.0);
        bad.year = 17;
        let err = repo.insert_book(&bad).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
        let err = repo.insert_books(&[bad]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
        assert!(repo.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_paths_reject_blank_user_names() {
        let repo = repo().await;
        let err = repo.insert_user("   ").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("name")));
        let names = vec!["Alice".to_string(), "   ".to_string()];
        let err = repo.insert_users(&names).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("name")));
        assert_eq!(repo.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_is_case_sensitive_contains() {
        let repo = repo().await;
        repo.insert_book(&book("Python Guide", "Programming", 4.5)).await.unwrap();
        repo.insert_book(&book("python for ants", "Programming", 3.0)).await.unwrap();
        let hits = repo.search_books("Python").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Python Guide");
        // Genre and author fields are matched too.
        assert_eq!(repo.search_books("Programming").await.unwrap().len(), 2);
        assert_eq!(repo.search_books("Test Author").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_keyword_matches_every_book() {
        let repo = repo().await;
        repo.insert_book(&book("A", "Fiction", 5.0)).await.unwrap();
        repo.insert_book(&book("B", "Mystery", 6.0)).await.unwrap();
        assert_eq!(repo.search_books("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_top_rated_breaks_ties_by_id() {
        let repo = repo().await;
        let first = repo.insert_book(&book("First", "Fiction", 9.0)).await.unwrap();
        let second = repo.insert_book(&book("Second", "Fiction", 9.0)).await.unwrap();
        let best = repo.insert_book(&book("Best", "Fiction", 9.5)).await.unwrap();
        let top = repo.top_rated_books(3).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![best.id, first.id, second.id]);
    }

    #[tokio::test]
    async fn test_average_rating_on_empty_catalog_is_zero() {
        let repo = repo().await;
        assert_eq!(repo.average_rating().await.unwrap(), 0.0);
        assert_eq!(repo.count_books().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_borrow_lifecycle() {
        let repo = repo().await;
        let user = repo.insert_user("Alice").await.unwrap();
        let b = repo.insert_book(&book("Dune", "Science Fiction", 8.7)).await.unwrap();

        let loan = repo.borrow(user.id, b.id).await.unwrap();
        assert!(loan.is_open());

        // Second borrow without a return must not create a second open loan.
        let double = repo.borrow(user.id, b.id).await;
        assert!(matches!(&*double.unwrap_err(), ErrorKind::AlreadyBorrowed(_, _)));
        assert_eq!(repo.currently_borrowed(user.id).await.unwrap().len(), 1);

        assert!(repo.return_book(user.id, b.id).await.unwrap());
        // Nothing left to close.
        assert!(!repo.return_book(user.id, b.id).await.unwrap());

        // Borrowing again after a return opens a fresh loan.
        repo.borrow(user.id, b.id).await.unwrap();
        assert_eq!(repo.borrowed_history(user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_borrow_requires_existing_user_and_book() {
        let repo = repo().await;
        let user = repo.insert_user("Alice").await.unwrap();
        let b = repo.insert_book(&book("Dune", "Science Fiction", 8.7)).await.unwrap();
        let err = repo.borrow(user.id + 99, b.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UserNotFound(_)));
        let err = repo.borrow(user.id, b.id + 99).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BookNotFound(_)));
        // Failed attempts leave no ledger entries behind.
        assert!(repo.borrowings_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exclusion_queries_skip_borrowed_books() {
        let repo = repo().await;
        let user = repo.insert_user("Alice").await.unwrap();
        let read = repo.insert_book(&book("Read", "Fiction", 9.9)).await.unwrap();
        let unread = repo.insert_book(&book("Unread", "Fiction", 5.0)).await.unwrap();
        repo.borrow(user.id, read.id).await.unwrap();
        // Returned books still count as borrowed for recommendation purposes.
        repo.return_book(user.id, read.id).await.unwrap();
        let candidates = repo.top_rated_excluding(user.id, 10).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, unread.id);
        let in_genre = repo.top_rated_in_genre_excluding(user.id, "Fiction", 10).await.unwrap();
        assert_eq!(in_genre.len(), 1);
        assert_eq!(in_genre[0].id, unread.id);
    }
}
