use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::InvitationEvent;
use crate::error::{AppError, AppResult};

/// Repository for the invitation event outbox.
///
/// Implementation notes:
/// - Claiming uses an atomic single-statement UPDATE with a subselect:
///   `UPDATE ... WHERE id = (SELECT id FROM ... LIMIT 1) RETURNING ...`
///   This avoids a long-lived transaction and reduces contention on SQLite.
/// - Events are appended by `InvitationRepository::transition_with_event`
///   inside the transaction that flips the invitation status.
pub struct InvitationEventRepository;

impl InvitationEventRepository {
    /// Claim up to `limit` due events and return them.
    ///
    /// Each claim is a single atomic statement, so two workers polling the
    /// same outbox never receive the same event.
    pub async fn fetch_and_claim_due(
        pool: &SqlitePool,
        limit: i64,
    ) -> AppResult<Vec<InvitationEvent>> {
        let mut events: Vec<InvitationEvent> = Vec::new();
        if limit <= 0 {
            return Ok(events);
        }

        for _ in 0..(limit as usize) {
            let now = Utc::now().naive_utc();

            let opt = sqlx::query_as::<_, InvitationEvent>(
                r#"
                UPDATE invitation_events
                SET status = 'processing', updated_at = ?
                WHERE id = (
                    SELECT id FROM invitation_events
                    WHERE status = 'pending'
                      AND next_attempt_at <= ?
                    ORDER BY next_attempt_at ASC
                    LIMIT 1
                )
                RETURNING
                    id, invitation_id, prev_status, new_status,
                    attempts, max_attempts, next_attempt_at, last_error,
                    status, created_at, updated_at
                "#,
            )
            .bind(now)
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

            if let Some(event) = opt {
                events.push(event);
            } else {
                break;
            }
        }

        Ok(events)
    }

    /// Mark an event as delivered. Returns the updated row.
    pub async fn mark_done(pool: &SqlitePool, id: &str) -> AppResult<InvitationEvent> {
        let now = Utc::now().naive_utc();
        let event = sqlx::query_as::<_, InvitationEvent>(
            r#"
            UPDATE invitation_events
            SET status = 'done', updated_at = ?
            WHERE id = ?
            RETURNING
                id, invitation_id, prev_status, new_status,
                attempts, max_attempts, next_attempt_at, last_error,
                status, created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    /// Mark an event as terminally failed and record the last error.
    /// Used for failures that redelivery cannot fix.
    pub async fn mark_failed(
        pool: &SqlitePool,
        id: &str,
        last_error: Option<String>,
    ) -> AppResult<InvitationEvent> {
        let now = Utc::now().naive_utc();
        let event = sqlx::query_as::<_, InvitationEvent>(
            r#"
            UPDATE invitation_events
            SET status = 'failed', last_error = ?, updated_at = ?
            WHERE id = ?
            RETURNING
                id, invitation_id, prev_status, new_status,
                attempts, max_attempts, next_attempt_at, last_error,
                status, created_at, updated_at
            "#,
        )
        .bind(last_error)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    /// Increment attempts, set `next_attempt_at` and `last_error`, and put the
    /// event back in the queue. If the new attempt count reaches
    /// `max_attempts`, the event is marked failed instead.
    ///
    /// Returns the updated row.
    pub async fn register_attempt_and_schedule(
        pool: &SqlitePool,
        id: &str,
        next_attempt_at: chrono::NaiveDateTime,
        last_error: Option<String>,
    ) -> AppResult<InvitationEvent> {
        let now = Utc::now().naive_utc();
        let event = sqlx::query_as::<_, InvitationEvent>(
            r#"
            UPDATE invitation_events
            SET
                attempts = attempts + 1,
                next_attempt_at = ?,
                last_error = ?,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                updated_at = ?
            WHERE id = ?
            RETURNING
                id, invitation_id, prev_status, new_status,
                attempts, max_attempts, next_attempt_at, last_error,
                status, created_at, updated_at
            "#,
        )
        .bind(next_attempt_at)
        .bind(last_error)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    /// Fetch an event by id.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<InvitationEvent> {
        let event = sqlx::query_as::<_, InvitationEvent>(
            r#"
            SELECT
                id, invitation_id, prev_status, new_status,
                attempts, max_attempts, next_attempt_at, last_error,
                status, created_at, updated_at
            FROM invitation_events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::InvitationStatus;
    use crate::db::test_support::memory_pool;
    use crate::db::{ChildRepository, InvitationRepository, UserRepository};

    async fn seed_event(pool: &SqlitePool) -> InvitationEvent {
        let inviter = UserRepository::create(pool, "parent@example.com", "hash")
            .await
            .unwrap();
        let child = ChildRepository::create(
            pool,
            "Leo",
            Utc::now().naive_utc(),
            "Boy",
            &inviter.id,
        )
        .await
        .unwrap();
        let invitation = InvitationRepository::create(
            pool,
            &child.id,
            &child.name,
            &inviter.id,
            &inviter.email,
            "aunt@example.com",
        )
        .await
        .unwrap();
        let (_, event) = InvitationRepository::transition_with_event(
            pool,
            &invitation.id,
            InvitationStatus::Pending,
            InvitationStatus::Accepted,
            3,
        )
        .await
        .unwrap()
        .unwrap();
        event
    }

    #[tokio::test]
    async fn due_events_are_claimed_once() {
        let pool = memory_pool().await;
        let event = seed_event(&pool).await;

        let claimed = InvitationEventRepository::fetch_and_claim_due(&pool, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, event.id);
        assert_eq!(claimed[0].status, "processing");

        // Already claimed: nothing left to pick up.
        let empty = InvitationEventRepository::fetch_and_claim_due(&pool, 10)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn rescheduling_fails_event_at_max_attempts() {
        let pool = memory_pool().await;
        let event = seed_event(&pool).await;
        let next = Utc::now().naive_utc();

        let e1 = InvitationEventRepository::register_attempt_and_schedule(
            &pool,
            &event.id,
            next,
            Some("store unavailable".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(e1.attempts, 1);
        assert_eq!(e1.status, "pending");

        let e2 = InvitationEventRepository::register_attempt_and_schedule(
            &pool, &event.id, next, None,
        )
        .await
        .unwrap();
        assert_eq!(e2.attempts, 2);
        assert_eq!(e2.status, "pending");

        // max_attempts = 3: third attempt moves the event to failed.
        let e3 = InvitationEventRepository::register_attempt_and_schedule(
            &pool, &event.id, next, None,
        )
        .await
        .unwrap();
        assert_eq!(e3.attempts, 3);
        assert_eq!(e3.status, "failed");
    }
}
