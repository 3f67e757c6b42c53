use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A child profile. The authorization set lives in the `child_managers`
/// join table; any user id present there may read/write the profile and
/// its feeding records.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub name: String,
    pub dob: NaiveDateTime,
    pub gender: String,
    pub created_at: NaiveDateTime,
}
