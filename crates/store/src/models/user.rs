use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// A registered library member.
///
/// Names are unique by convention only; the store does not enforce it.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: UtcDateTime,
}

/// Names must be non-blank before they hit the store; duplicates are fine.
pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        exn::bail!(ErrorKind::InvalidData("name"));
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) created_at: i64,
}
impl TryFrom<UserRow> for User {
    type Error = Error;
    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
        })
    }
}
