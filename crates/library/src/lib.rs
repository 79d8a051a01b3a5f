//! Search, recommendations, and the facade over the folio catalog.
//!
//! [`Library`] is the single entry point external callers use: it validates
//! input, delegates to the [`search`] and [`recommend`] modules, and returns
//! detached value types from `folio-store`. Each call is one scoped unit of
//! work against the store; nothing here holds state between calls.

pub mod error;
mod facade;
pub mod recommend;
pub mod search;

pub use crate::facade::{FavoriteAuthor, Library, ReadingProfile, Statistics};
pub use crate::recommend::{GenrePreference, Recommendation};
pub use crate::search::SearchStrategy;
