//! Command-line front end for the folio catalog.
//!
//! Thin glue only: config -> store -> facade. Anything with actual logic
//! lives in `folio-library` and `folio-store`.

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::ResultExt;
use folio_config::Config;
use folio_library::{Library, SearchStrategy};
use folio_store::{Database, NewBook, Repository};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("store error")]
    Store,
    #[display("library error")]
    Library,
    #[display("could not read seed file")]
    Seed,
}
type Error = exn::Exn<ErrorKind>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(name = "folio", about = "Library catalog with search and recommendations", version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./folio.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a book to the catalog.
    AddBook {
        title: String,
        author: String,
        genre: String,
        #[arg(long)]
        year: i32,
        /// Rating on the 0.0 to 10.0 scale.
        #[arg(long)]
        rating: f64,
    },
    /// Register a user.
    AddUser { name: String },
    /// Search books by keyword (title, author, or genre).
    Search {
        keyword: String,
        /// Use the in-memory full-scan strategy instead of the indexed one.
        #[arg(long)]
        naive: bool,
    },
    /// Show the top-rated books.
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Check out a book for a user.
    Borrow { user_id: i64, book_id: i64 },
    /// Return a borrowed book.
    Return { user_id: i64, book_id: i64 },
    /// Catalog-wide statistics.
    Stats,
    /// A user's reading profile.
    Profile { user_id: i64 },
    /// Recommend books for a user.
    Recommend {
        user_id: i64,
        /// Defaults to `recommendations.default_limit` from the config.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Bulk-load books and/or users from JSON arrays.
    Seed {
        #[arg(long)]
        books: Option<PathBuf>,
        #[arg(long)]
        users: Option<PathBuf>,
    },
}

/// Shape of one entry in a user seed file.
#[derive(Deserialize)]
struct SeedUser {
    name: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(parent) = config.database.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Store)?;
    }
    let db = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Store)?;
    let library = Library::new(Repository::from(&db));

    match cli.command {
        Command::AddBook { title, author, genre, year, rating } => {
            let book = library
                .add_book(&title, &author, &genre, year, rating)
                .await
                .or_raise(|| ErrorKind::Library)?;
            println!("added book #{}: {} by {}", book.id, book.title, book.author);
        },
        Command::AddUser { name } => {
            let user = library.add_user(&name).await.or_raise(|| ErrorKind::Library)?;
            println!("added user #{}: {}", user.id, user.name);
        },
        Command::Search { keyword, naive } => {
            let strategy = if naive { SearchStrategy::Naive } else { SearchStrategy::Indexed };
            let books = library.search(&keyword, strategy).await.or_raise(|| ErrorKind::Library)?;
            println!("{} result(s) for {keyword:?}", books.len());
            for book in books {
                println!("  #{} {} by {} [{}] ({}, {:.1})", book.id, book.title, book.author, book.genre, book.year, book.rating);
            }
        },
        Command::Top { limit } => {
            for book in library.top_rated(limit).await.or_raise(|| ErrorKind::Library)? {
                println!("{:>4.1}  #{} {} by {}", book.rating, book.id, book.title, book.author);
            }
        },
        Command::Borrow { user_id, book_id } => {
            library.borrow(user_id, book_id).await.or_raise(|| ErrorKind::Library)?;
            println!("user {user_id} borrowed book {book_id}");
        },
        Command::Return { user_id, book_id } => {
            if library.return_book(user_id, book_id).await.or_raise(|| ErrorKind::Library)? {
                println!("user {user_id} returned book {book_id}");
            } else {
                println!("no open loan for user {user_id} and book {book_id}");
            }
        },
        Command::Stats => {
            let stats = library.statistics().await.or_raise(|| ErrorKind::Library)?;
            println!("books: {}", stats.total_books);
            println!("users: {}", stats.total_users);
            println!("average rating: {:.2}", stats.average_rating);
        },
        Command::Profile { user_id } => {
            let profile = library.reading_profile(user_id).await.or_raise(|| ErrorKind::Library)?;
            println!("user {user_id}");
            println!("  borrowed in total: {}", profile.total_borrowed);
            println!("  currently out: {}", profile.currently_borrowed);
            for pref in &profile.genre_preferences {
                println!("  {:>5.1}% {}", pref.share, pref.genre);
            }
            for author in &profile.favorite_authors {
                println!("  {} ({} borrow(s))", author.author, author.borrow_count);
            }
            for loan in &profile.recent_borrowings {
                let state = if loan.borrowing.is_open() { "out" } else { "returned" };
                println!("  {} [{state}]", loan.book.title);
            }
        },
        Command::Recommend { user_id, limit } => {
            let limit = limit.unwrap_or(config.recommendations.default_limit);
            let recs = library.recommend(user_id, limit).await.or_raise(|| ErrorKind::Library)?;
            for rec in recs {
                println!("#{} {} by {} [{}] ({:.1})", rec.book.id, rec.book.title, rec.book.author, rec.book.genre, rec.book.rating);
                println!("    reason: {}", rec.reason);
            }
        },
        Command::Seed { books, users } => {
            let repo = library.repository();
            if let Some(path) = books {
                let raw = std::fs::read_to_string(&path).or_raise(|| ErrorKind::Seed)?;
                let batch: Vec<NewBook> = serde_json::from_str(&raw).or_raise(|| ErrorKind::Seed)?;
                let count = repo.insert_books(&batch).await.or_raise(|| ErrorKind::Store)?;
                println!("seeded {count} book(s) from {}", path.display());
            }
            if let Some(path) = users {
                let raw = std::fs::read_to_string(&path).or_raise(|| ErrorKind::Seed)?;
                let seed: Vec<SeedUser> = serde_json::from_str(&raw).or_raise(|| ErrorKind::Seed)?;
                let names: Vec<String> = seed.into_iter().map(|user| user.name).collect();
                let count = repo.insert_users(&names).await.or_raise(|| ErrorKind::Store)?;
                println!("seeded {count} user(s) from {}", path.display());
            }
        },
    }
    db.close().await;
    Ok(())
}
