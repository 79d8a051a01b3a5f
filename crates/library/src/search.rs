//! Keyword search over the book catalog.
//!
//! Two interchangeable strategies with the same contract: case-sensitive
//! substring match against title, author, and genre. The naive strategy
//! materializes the whole catalog and filters in memory; the indexed
//! strategy pushes the predicate down to the store so only matching rows
//! are deserialized. Both return the same result set in the same (id)
//! order, a property the tests assert rather than assume.
//!
//! An empty keyword matches every book in both strategies, consistent with
//! the empty string being a substring of everything.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_store::{Book, Repository};

/// Which search implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Fetch all books and filter with an explicit in-memory scan.
    ///
    /// O(N * L) for N books of average field length L; every row is
    /// deserialized regardless of selectivity. Kept around as the
    /// reference implementation the indexed path is checked against.
    Naive,
    /// Push the substring predicate down to SQL (`instr()` over the three
    /// columns) so non-matching rows are never materialized.
    #[default]
    Indexed,
}

impl SearchStrategy {
    /// Search books whose title, author, or genre contains `keyword`.
    pub async fn search(&self, repo: &Repository, keyword: &str) -> Result<Vec<Book>> {
        match self {
            Self::Naive => naive_search(repo, keyword).await,
            Self::Indexed => indexed_search(repo, keyword).await,
        }
    }
}

/// Full-scan search: every book is fetched, then filtered in memory.
pub async fn naive_search(repo: &Repository, keyword: &str) -> Result<Vec<Book>> {
    let mut books = repo.list_books().await.or_raise(|| ErrorKind::Store)?;
    books.retain(|book| {
        book.title.contains(keyword) || book.author.contains(keyword) || book.genre.contains(keyword)
    });
    Ok(books)
}

/// Store-delegated search: the contains predicate runs inside SQLite.
pub async fn indexed_search(repo: &Repository, keyword: &str) -> Result<Vec<Book>> {
    repo.search_books(keyword).await.or_raise(|| ErrorKind::Store)
}
