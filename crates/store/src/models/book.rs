use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::Deserialize;
use time::UtcDateTime;

/// A catalogued book, detached from the store.
///
/// `created_at` is assigned at insertion and never mutated afterwards.
/// Ratings use the canonical 0.0 to 10.0 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub year: i32,
    pub rating: f64,
    pub created_at: UtcDateTime,
}

/// A book waiting to be inserted; the store assigns `id` and `created_at`.
///
/// Deserializable so bulk loaders can feed batches straight from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub year: i32,
    pub rating: f64,
}
impl NewBook {
    /// Check the invariants every stored book must satisfy: non-blank title,
    /// author, and genre, a 4-digit year, and a rating in 0.0 to 10.0.
    ///
    /// Every insert path runs this, so bulk loads can't smuggle in rows the
    /// catalog would never accept one at a time.
    pub fn validate(&self) -> Result<(), Error> {
        for (value, field) in [(&self.title, "title"), (&self.author, "author"), (&self.genre, "genre")] {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::InvalidData(field));
            }
        }
        if !(1000..=9999).contains(&self.year) {
            exn::bail!(ErrorKind::InvalidData("year"));
        }
        if !self.rating.is_finite() || !(0.0..=10.0).contains(&self.rating) {
            exn::bail!(ErrorKind::InvalidData("rating"));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) genre: String,
    pub(crate) year: i64,
    pub(crate) rating: f64,
    pub(crate) created_at: i64,
}
impl TryFrom<BookRow> for Book {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            author: row.author,
            genre: row.genre,
            year: i32::try_from(row.year).or_raise(|| ErrorKind::InvalidData("year"))?,
            rating: row.rating,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let created = UtcDateTime::now();
        let row = BookRow {
            id: 7,
            title: "The Rust Programming Language".to_string(),
            author: "Steve Klabnik".to_string(),
            genre: "Programming".to_string(),
            year: 2019,
            rating: 9.4,
            created_at: created.unix_timestamp(),
        };
        let model = Book::try_from(row).unwrap();
        assert_eq!(model.year, 2019);
        // Unix timestamps are measured in seconds, so nanoseconds are stripped.
        assert_eq!(model.created_at, created.replace_nanosecond(0).unwrap());
    }

    #[test]
    fn test_new_book_invariants() {
        let good = NewBook {
            title: "The Rust Programming Language".to_string(),
            author: "Steve Klabnik".to_string(),
            genre: "Programming".to_string(),
            year: 2019,
            rating: 9.4,
        };
        assert!(good.validate().is_ok());

        let mut blank_title = good.clone();
        blank_title.title = "  ".to_string();
        assert!(matches!(&*blank_title.validate().unwrap_err(), ErrorKind::InvalidData("title")));

        let mut two_digit_year = good.clone();
        two_digit_year.year = 17;
        assert!(matches!(&*two_digit_year.validate().unwrap_err(), ErrorKind::InvalidData("year")));

        let mut off_scale = good.clone();
        off_scale.rating = 42.0;
        assert!(matches!(&*off_scale.validate().unwrap_err(), ErrorKind::InvalidData("rating")));

        let mut nan = good.clone();
        nan.rating = f64::NAN;
        assert!(matches!(&*nan.validate().unwrap_err(), ErrorKind::InvalidData("rating")));
    }

    #[test]
    fn test_row_with_absurd_year_is_rejected() {
        let row = BookRow {
            id: 1,
            title: "t".to_string(),
            author: "a".to_string(),
            genre: "g".to_string(),
            year: i64::MAX,
            rating: 5.0,
            created_at: 0,
        };
        assert!(Book::try_from(row).is_err());
    }
}
