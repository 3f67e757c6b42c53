use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One invitation status transition, recorded in the outbox in the same
/// transaction that performed the transition.
///
/// Each row carries the before/after status snapshot the reconciler's guard
/// condition inspects. The outbox worker claims due rows and redelivers on
/// transient failure, so the reconciler itself never schedules retries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvitationEvent {
    /// Primary key (UUID)
    pub id: String,

    /// The invitation that transitioned (references `invitations.id`)
    pub invitation_id: String,

    /// Status immediately before the update.
    pub prev_status: String,

    /// Status immediately after the update.
    pub new_status: String,

    /// Number of delivery attempts already made.
    pub attempts: i32,

    /// Maximum attempts permitted before the event is marked failed.
    pub max_attempts: i32,

    /// Timestamp when the event becomes eligible for (re)delivery.
    pub next_attempt_at: NaiveDateTime,

    /// Last error observed when a delivery attempt failed (if any).
    pub last_error: Option<String>,

    /// Delivery status: 'pending', 'processing', 'done', 'failed'
    pub status: String,

    /// Creation timestamp
    pub created_at: NaiveDateTime,

    /// Last update timestamp
    pub updated_at: NaiveDateTime,
}
