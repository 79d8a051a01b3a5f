//! Genre-preference recommendations derived from borrowing history.
//!
//! Two stages:
//! 1. [`preferred_genres`] turns a user's full borrowing history (returned
//!    loans included) into per-genre percentage shares.
//! 2. [`recommend`] walks genres by descending share, pulling top-rated
//!    unread books from each, then backfills with top-rated books from any
//!    genre until the requested limit is reached or candidates run out.
//!
//! Ordering is deterministic everywhere: genres tie-break alphabetically,
//! books tie-break by ascending id.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_store::{Book, Repository};
use std::collections::{BTreeMap, HashSet};

/// Reason attached when the user has no borrowing history at all.
pub const NO_HISTORY_REASON: &str = "no borrowing history - top rated";
/// Reason attached to backfill picks outside the user's preferred genres.
pub const TOP_RATED_REASON: &str = "top rated";

/// One genre's slice of a user's borrowing history.
#[derive(Debug, Clone, PartialEq)]
pub struct GenrePreference {
    pub genre: String,
    /// Percentage of all borrowings in this genre, rounded to one decimal.
    pub share: f64,
}

/// A recommended book together with the reason it was picked.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub book: Book,
    pub reason: String,
}

fn round_to_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Derive a user's genre preferences from every borrowing they ever made.
///
/// Each borrowing event counts once, so re-borrowing a genre raises its
/// share. Returns an empty vec for users with no history (or unknown ids,
/// which are indistinguishable from history-less users at this layer).
/// Sorted by descending share, then genre name ascending.
pub async fn preferred_genres(repo: &Repository, user_id: i64) -> Result<Vec<GenrePreference>> {
    let history = repo.borrowed_history(user_id).await.or_raise(|| ErrorKind::Store)?;
    if history.is_empty() {
        return Ok(Vec::new());
    }
    let total = history.len() as f64;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for loan in &history {
        *counts.entry(loan.book.genre.clone()).or_default() += 1;
    }
    let mut preferences: Vec<GenrePreference> = counts
        .into_iter()
        .map(|(genre, count)| GenrePreference {
            genre,
            share: round_to_one_decimal(count as f64 / total * 100.0),
        })
        .collect();
    // The BTreeMap already yields genres alphabetically; the stable sort
    // keeps that as the tie-break within equal shares.
    preferences.sort_by(|a, b| b.share.total_cmp(&a.share));
    Ok(preferences)
}

/// Recommend up to `limit` books the user has not borrowed before.
///
/// Users without history get the top-rated books of the whole catalog,
/// tagged with [`NO_HISTORY_REASON`]. Everyone else gets unread books from
/// their preferred genres first (highest share first, rating descending
/// within a genre), backfilled with [`TOP_RATED_REASON`] picks from any
/// genre once the preferred ones are exhausted. A book is never
/// recommended twice in one result.
pub async fn recommend(repo: &Repository, user_id: i64, limit: usize) -> Result<Vec<Recommendation>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let preferences = preferred_genres(repo, user_id).await?;
    if preferences.is_empty() {
        let top = repo.top_rated_books(limit).await.or_raise(|| ErrorKind::Store)?;
        return Ok(top
            .into_iter()
            .map(|book| Recommendation { book, reason: NO_HISTORY_REASON.to_string() })
            .collect());
    }
    let mut picks: Vec<Recommendation> = Vec::with_capacity(limit);
    let mut seen: HashSet<i64> = HashSet::new();
    for preference in &preferences {
        if picks.len() == limit {
            break;
        }
        let candidates = repo
            .top_rated_in_genre_excluding(user_id, &preference.genre, limit)
            .await
            .or_raise(|| ErrorKind::Store)?;
        for book in candidates {
            if picks.len() == limit {
                break;
            }
            if seen.insert(book.id) {
                let reason = format!("borrowed {:.1}% {} books", preference.share, preference.genre);
                picks.push(Recommendation { book, reason });
            }
        }
    }
    if picks.len() < limit {
        // Over-fetch by the number already picked so overlap with the
        // preferred-genre picks can't starve the backfill.
        let candidates = repo
            .top_rated_excluding(user_id, limit + seen.len())
            .await
            .or_raise(|| ErrorKind::Store)?;
        for book in candidates {
            if picks.len() == limit {
                break;
            }
            if seen.insert(book.id) {
                picks.push(Recommendation { book, reason: TOP_RATED_REASON.to_string() });
            }
        }
    }
    Ok(picks)
}
