//! The library facade: the single entry point external callers use.

use crate::error::{ErrorKind, Result};
use crate::recommend::{self, GenrePreference, Recommendation};
use crate::search::SearchStrategy;
use exn::ResultExt;
use folio_store::error::ErrorKind as StoreErrorKind;
use folio_store::{Book, Borrowing, Loan, NewBook, Repository, User};
use std::collections::BTreeMap;
use tracing::instrument;

const FAVORITE_AUTHOR_LIMIT: usize = 3;
const RECENT_LOAN_LIMIT: usize = 3;

/// Catalog-wide counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub total_books: u64,
    pub total_users: u64,
    /// Mean rating across all books, rounded to two decimals; 0.0 when the
    /// catalog is empty.
    pub average_rating: f64,
}

/// An author ranked by how often a user borrowed their books.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteAuthor {
    pub author: String,
    pub borrow_count: u64,
}

/// Aggregated view of one user's borrowing behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingProfile {
    pub user_id: i64,
    pub total_borrowed: u64,
    pub currently_borrowed: u64,
    /// Genre shares, highest first.
    pub genre_preferences: Vec<GenrePreference>,
    /// Up to three authors, most borrowed first, names ascending on ties.
    pub favorite_authors: Vec<FavoriteAuthor>,
    /// The last three borrowings, most recent first.
    pub recent_borrowings: Vec<Loan>,
}

/// Facade orchestrating CRUD, search, the borrow/return lifecycle, and
/// statistics over the catalog.
///
/// Holds nothing but a repository handle: the store connection provider is
/// passed in explicitly at construction, and every method is one scoped
/// unit of work. All returned values are detached snapshots.
#[derive(Debug, Clone)]
pub struct Library {
    repo: Repository,
}

impl Library {
    /// Create a facade over the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Access the underlying repository, for callers that need queries the
    /// facade doesn't expose (bulk seeding, mostly).
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Add a book to the catalog, returning the stored snapshot.
    ///
    /// Titles, authors, and genres must be non-blank; the year must be a
    /// plausible 4-digit value and the rating must lie in 0.0 to 10.0. The
    /// store enforces these on every insert path; here the offending field
    /// surfaces as [`ErrorKind::Validation`].
    pub async fn add_book(&self, title: &str, author: &str, genre: &str, year: i32, rating: f64) -> Result<Book> {
        let book = NewBook {
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            year,
            rating,
        };
        match self.repo.insert_book(&book).await {
            Ok(book) => Ok(book),
            Err(error) => {
                let kind = match &*error {
                    StoreErrorKind::InvalidData(field) => ErrorKind::Validation(*field),
                    _ => ErrorKind::Store,
                };
                Err(error).or_raise(|| kind)
            },
        }
    }

    /// Register a user, returning the stored snapshot.
    ///
    /// Names must be non-blank. Duplicate names are accepted: uniqueness is
    /// a caller convention, not a constraint the store enforces.
    pub async fn add_user(&self, name: &str) -> Result<User> {
        match self.repo.insert_user(name).await {
            Ok(user) => Ok(user),
            Err(error) => {
                let kind = match &*error {
                    StoreErrorKind::InvalidData(field) => ErrorKind::Validation(*field),
                    _ => ErrorKind::Store,
                };
                Err(error).or_raise(|| kind)
            },
        }
    }

    /// Every book in the catalog, in id order.
    pub async fn all_books(&self) -> Result<Vec<Book>> {
        self.repo.list_books().await.or_raise(|| ErrorKind::Store)
    }

    /// Every registered user, in id order.
    pub async fn all_users(&self) -> Result<Vec<User>> {
        self.repo.list_users().await.or_raise(|| ErrorKind::Store)
    }

    /// Search books by keyword with the given strategy.
    pub async fn search(&self, keyword: &str, strategy: SearchStrategy) -> Result<Vec<Book>> {
        strategy.search(&self.repo, keyword).await
    }

    /// The top `limit` books by rating.
    pub async fn top_rated(&self, limit: usize) -> Result<Vec<Book>> {
        self.repo.top_rated_books(limit).await.or_raise(|| ErrorKind::Store)
    }

    // =========================================================================
    // Borrowing lifecycle
    // =========================================================================

    /// Check out a book for a user.
    ///
    /// Fails with [`ErrorKind::UserNotFound`] / [`ErrorKind::BookNotFound`]
    /// for unknown identifiers and [`ErrorKind::AlreadyBorrowed`] when the
    /// pair already has an open loan. The store rolls the attempt back in
    /// full on every failure.
    #[instrument(skip(self))]
    pub async fn borrow(&self, user_id: i64, book_id: i64) -> Result<Borrowing> {
        match self.repo.borrow(user_id, book_id).await {
            Ok(borrowing) => Ok(borrowing),
            Err(error) => {
                let kind = match &*error {
                    StoreErrorKind::UserNotFound(id) => ErrorKind::UserNotFound(*id),
                    StoreErrorKind::BookNotFound(id) => ErrorKind::BookNotFound(*id),
                    StoreErrorKind::AlreadyBorrowed(user, book) => ErrorKind::AlreadyBorrowed(*user, *book),
                    _ => ErrorKind::Store,
                };
                Err(error).or_raise(|| kind)
            },
        }
    }

    /// Return a borrowed book.
    ///
    /// `Ok(false)` means there was no open loan for the pair to close;
    /// that includes identifiers that don't exist at all.
    #[instrument(skip(self))]
    pub async fn return_book(&self, user_id: i64, book_id: i64) -> Result<bool> {
        self.repo.return_book(user_id, book_id).await.or_raise(|| ErrorKind::Store)
    }

    /// The books a user currently has checked out.
    pub async fn borrowed_books(&self, user_id: i64) -> Result<Vec<Loan>> {
        self.repo.currently_borrowed(user_id).await.or_raise(|| ErrorKind::Store)
    }

    // =========================================================================
    // Statistics and recommendations
    // =========================================================================

    /// Catalog-wide counters.
    pub async fn statistics(&self) -> Result<Statistics> {
        let total_books = self.repo.count_books().await.or_raise(|| ErrorKind::Store)?;
        let total_users = self.repo.count_users().await.or_raise(|| ErrorKind::Store)?;
        let average = self.repo.average_rating().await.or_raise(|| ErrorKind::Store)?;
        Ok(Statistics {
            total_books,
            total_users,
            average_rating: (average * 100.0).round() / 100.0,
        })
    }

    /// A user's genre preference shares, highest first.
    pub async fn preferred_genres(&self, user_id: i64) -> Result<Vec<GenrePreference>> {
        recommend::preferred_genres(&self.repo, user_id).await
    }

    /// Recommend up to `limit` unread books for a user.
    pub async fn recommend(&self, user_id: i64, limit: usize) -> Result<Vec<Recommendation>> {
        recommend::recommend(&self.repo, user_id, limit).await
    }

    /// Aggregate a user's borrowing behaviour into a reading profile.
    pub async fn reading_profile(&self, user_id: i64) -> Result<ReadingProfile> {
        // History arrives most recent first (borrowed_at descending, id
        // descending on ties), so "the last three borrowings" is a prefix.
        let history = self.repo.borrowed_history(user_id).await.or_raise(|| ErrorKind::Store)?;
        let currently_borrowed = history.iter().filter(|loan| loan.borrowing.is_open()).count() as u64;
        let genre_preferences = recommend::preferred_genres(&self.repo, user_id).await?;

        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for loan in &history {
            *counts.entry(loan.book.author.as_str()).or_default() += 1;
        }
        let mut favorite_authors: Vec<FavoriteAuthor> = counts
            .into_iter()
            .map(|(author, borrow_count)| FavoriteAuthor { author: author.to_string(), borrow_count })
            .collect();
        // Stable sort over the BTreeMap's alphabetical order: equal counts
        // stay name-ascending.
        favorite_authors.sort_by(|a, b| b.borrow_count.cmp(&a.borrow_count));
        favorite_authors.truncate(FAVORITE_AUTHOR_LIMIT);

        let recent_borrowings = history.iter().take(RECENT_LOAN_LIMIT).cloned().collect();
        Ok(ReadingProfile {
            user_id,
            total_borrowed: history.len() as u64,
            currently_borrowed,
            genre_preferences,
            favorite_authors,
            recent_borrowings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_store::Database;

    async fn library() -> Library {
        let db = Database::connect_in_memory().await.unwrap();
        Library::new(Repository::from(&db))
    }

    #[tokio::test]
    async fn test_statistics_on_empty_catalog() {
        let library = library().await;
        let stats = library.statistics().await.unwrap();
        assert_eq!(stats.total_books, 0);
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.average_rating, 0.0);
    }

    #[tokio::test]
    async fn test_statistics_rounds_average_to_two_decimals() {
        let library = library().await;
        library.add_book("A", "a", "Fiction", 2020, 7.0).await.unwrap();
        library.add_book("B", "b", "Fiction", 2020, 8.0).await.unwrap();
        library.add_book("C", "c", "Fiction", 2020, 8.0).await.unwrap();
        let stats = library.statistics().await.unwrap();
        assert_eq!(stats.total_books, 3);
        // 23 / 3 = 7.666..., rounded.
        assert_eq!(stats.average_rating, 7.67);
    }

    #[tokio::test]
    async fn test_add_book_validation() {
        let library = library().await;
        let cases: [(&str, &str, &str, i32, f64); 5] = [
            ("", "a", "g", 2020, 5.0),
            ("t", "  ", "g", 2020, 5.0),
            ("t", "a", "", 2020, 5.0),
            ("t", "a", "g", 99, 5.0),
            ("t", "a", "g", 2020, 10.5),
        ];
        for (title, author, genre, year, rating) in cases {
            let err = library.add_book(title, author, genre, year, rating).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::Validation(_)), "accepted {title:?}/{author:?}/{genre:?}/{year}/{rating}");
        }
        assert_eq!(library.statistics().await.unwrap().total_books, 0);
    }

    #[tokio::test]
    async fn test_add_user_rejects_blank_names_but_allows_duplicates() {
        let library = library().await;
        assert!(library.add_user("   ").await.is_err());
        let first = library.add_user("Alice").await.unwrap();
        let second = library.add_user("Alice").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_borrow_maps_store_errors_to_typed_kinds() {
        let library = library().await;
        let user = library.add_user("Alice").await.unwrap();
        let book = library.add_book("Dune", "Herbert", "Science Fiction", 1965, 8.7).await.unwrap();

        let err = library.borrow(user.id + 1, book.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UserNotFound(_)));
        let err = library.borrow(user.id, book.id + 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BookNotFound(_)));

        library.borrow(user.id, book.id).await.unwrap();
        let err = library.borrow(user.id, book.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyBorrowed(_, _)));
    }

    #[tokio::test]
    async fn test_return_after_return_reports_false() {
        let library = library().await;
        let user = library.add_user("Alice").await.unwrap();
        let book = library.add_book("Dune", "Herbert", "Science Fiction", 1965, 8.7).await.unwrap();
        library.borrow(user.id, book.id).await.unwrap();
        assert!(library.return_book(user.id, book.id).await.unwrap());
        assert!(!library.return_book(user.id, book.id).await.unwrap());
        assert!(library.borrowed_books(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reading_profile_aggregates() {
        let library = library().await;
        let user = library.add_user("Book Worm").await.unwrap();
        let by_austen_1 = library.add_book("Emma", "Austen", "Fiction", 1815, 8.0).await.unwrap();
        let by_austen_2 = library.add_book("Persuasion", "Austen", "Fiction", 1817, 8.5).await.unwrap();
        let by_christie = library.add_book("Nemesis", "Christie", "Mystery", 1971, 7.5).await.unwrap();
        let by_banks = library.add_book("Excession", "Banks", "Science Fiction", 1996, 8.2).await.unwrap();

        for book in [&by_austen_1, &by_austen_2, &by_christie, &by_banks] {
            library.borrow(user.id, book.id).await.unwrap();
        }
        library.return_book(user.id, by_christie.id).await.unwrap();

        let profile = library.reading_profile(user.id).await.unwrap();
        assert_eq!(profile.total_borrowed, 4);
        assert_eq!(profile.currently_borrowed, 3);
        assert_eq!(profile.genre_preferences[0].genre, "Fiction");
        assert_eq!(profile.genre_preferences[0].share, 50.0);

        assert_eq!(profile.favorite_authors.len(), 3);
        assert_eq!(profile.favorite_authors[0].author, "Austen");
        assert_eq!(profile.favorite_authors[0].borrow_count, 2);
        // Banks and Christie tie at one borrow each; names ascending.
        assert_eq!(profile.favorite_authors[1].author, "Banks");
        assert_eq!(profile.favorite_authors[2].author, "Christie");

        // Most recent first; all four borrows may share a timestamp, so the
        // id tie-break decides.
        assert_eq!(profile.recent_borrowings.len(), 3);
        assert_eq!(profile.recent_borrowings[0].book.id, by_banks.id);
        assert_eq!(profile.recent_borrowings[1].book.id, by_christie.id);
        assert_eq!(profile.recent_borrowings[2].book.id, by_austen_2.id);
    }

    #[tokio::test]
    async fn test_profile_for_user_without_history_is_empty() {
        let library = library().await;
        let user = library.add_user("Fresh").await.unwrap();
        let profile = library.reading_profile(user.id).await.unwrap();
        assert_eq!(profile.total_borrowed, 0);
        assert_eq!(profile.currently_borrowed, 0);
        assert!(profile.genre_preferences.is_empty());
        assert!(profile.favorite_authors.is_empty());
        assert!(profile.recent_borrowings.is_empty());
    }
}
