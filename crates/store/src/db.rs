//! Database connection and pool management.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// One logical unit of work per facade call; a handful of connections is
// plenty for the synchronous request/response model this serves.
const MAX_CONNECTIONS: u32 = 4;

/// Database connection pool for the catalog.
///
/// The main entry point for interacting with the catalog database. It
/// manages the SQLite connection pool and hands its pool to repositories.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the catalog database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Not gated behind `#[cfg(test)]` so that other crates can also use
    ///   this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // An in-memory database must be limited to one connection, otherwise
        // parallel connections see separate empty databases.
        Self::new(options, Some(1)).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // WAL mode for better concurrent read performance.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // Referential integrity for borrowings -> users/books.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // PRAGMA busy_timeout = 1000ms; bulk seeding can hold the single
            // writer long enough to trip SQLITE_BUSY on a zero timeout.
            .busy_timeout(std::time::Duration::from_millis(1000))
    }

    /// Run database migrations.
    ///
    /// Called automatically by `connect` and `connect_in_memory`, but can be
    /// called manually if needed.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// Waits for all connections to be returned to the pool and then closes
    /// them. After calling this, the Database instance should not be used.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
