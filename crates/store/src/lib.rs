//! SQLite persistence layer for the folio catalog.
//!
//! This crate owns the three entity types (books, users, borrowings) and is
//! the only place SQL lives. Everything above it works with detached value
//! types: rows are converted to owned models before leaving a query, so no
//! live database handles ever escape a repository call.
//!
//! # Architecture
//! - [`Database`] manages the connection pool and runs embedded migrations.
//! - [`Repository`] exposes the query and mutation surface. Every mutation
//!   that takes more than one statement runs inside a transaction: it either
//!   commits fully or rolls back on drop.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{Book, Borrowing, Loan, NewBook, User};
pub use crate::repo::Repository;
