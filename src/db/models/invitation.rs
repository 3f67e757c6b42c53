use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An invitation proposing that the named email be granted manager access to
/// a child profile. `status` is written exactly once after creation
/// (`pending -> accepted` or `pending -> declined`) and the record is
/// terminal afterward.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub child_id: String,
    /// Denormalized at creation time so invitee dashboards don't need a
    /// child read they are not yet authorized for.
    pub child_name: String,
    pub inviter_id: String,
    pub inviter_email: String,
    pub invitee_email: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(InvitationStatus::Pending),
            "accepted" => Some(InvitationStatus::Accepted),
            "declined" => Some(InvitationStatus::Declined),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }
}

impl From<InvitationStatus> for String {
    fn from(status: InvitationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<&str> for InvitationStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value).ok_or_else(|| format!("Invalid invitation status: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in ["pending", "accepted", "declined"] {
            assert_eq!(InvitationStatus::from_str(s).unwrap().as_str(), s);
        }
        assert_eq!(
            InvitationStatus::from_str("Accepted"),
            Some(InvitationStatus::Accepted)
        );
        assert_eq!(InvitationStatus::from_str("revoked"), None);
    }
}
