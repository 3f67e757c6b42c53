use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single feeding record. Records are immutable once created: there is no
/// edit or delete path.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feeding {
    pub id: String,
    pub child_id: String,
    pub food_item: String,
    pub quantity: String,
    /// One of the `Liking` values, stored as text.
    pub liking: String,
    /// JSON-encoded array of allergy/reaction strings.
    pub allergies: String,
    pub notes: String,
    pub fed_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl Feeding {
    /// Decode the stored allergies column. A malformed value decodes to an
    /// empty list rather than failing the read.
    pub fn allergy_list(&self) -> Vec<String> {
        serde_json::from_str(&self.allergies).unwrap_or_default()
    }
}

/// How well a feeding was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liking {
    Loved,
    Liked,
    Disliked,
    Refused,
}

impl Liking {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "loved" => Some(Liking::Loved),
            "liked" => Some(Liking::Liked),
            "disliked" => Some(Liking::Disliked),
            "refused" => Some(Liking::Refused),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(self) -> &'static str {
        match self {
            Liking::Loved => "loved",
            Liking::Liked => "liked",
            Liking::Disliked => "disliked",
            Liking::Refused => "refused",
        }
    }
}

impl From<Liking> for String {
    fn from(liking: Liking) -> Self {
        liking.as_str().to_string()
    }
}

impl TryFrom<&str> for Liking {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value).ok_or_else(|| format!("Invalid liking: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liking_round_trip() {
        for s in ["loved", "liked", "disliked", "refused"] {
            assert_eq!(Liking::from_str(s).unwrap().as_str(), s);
        }
        assert_eq!(Liking::from_str("LOVED"), Some(Liking::Loved));
        assert_eq!(Liking::from_str("meh"), None);
    }

    #[test]
    fn allergy_list_tolerates_bad_json() {
        let feeding = Feeding {
            id: "f1".to_string(),
            child_id: "c1".to_string(),
            food_item: "Pureed carrots".to_string(),
            quantity: "4 oz".to_string(),
            liking: "liked".to_string(),
            allergies: "not-json".to_string(),
            notes: String::new(),
            fed_at: chrono::Utc::now().naive_utc(),
            created_at: chrono::Utc::now().naive_utc(),
        };
        assert!(feeding.allergy_list().is_empty());
    }
}
