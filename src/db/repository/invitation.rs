use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Invitation, InvitationEvent, InvitationStatus};
use crate::error::{AppError, AppResult};

// ============================================================================
// Invitation Repository
// ============================================================================

pub struct InvitationRepository;

impl InvitationRepository {
    pub async fn create(
        pool: &SqlitePool,
        child_id: &str,
        child_name: &str,
        inviter_id: &str,
        inviter_email: &str,
        invitee_email: &str,
    ) -> AppResult<Invitation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (
                id, child_id, child_name, inviter_id, inviter_email,
                invitee_email, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            RETURNING
                id, child_id, child_name, inviter_id, inviter_email,
                invitee_email, status, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(child_id)
        .bind(child_name)
        .bind(inviter_id)
        .bind(inviter_email)
        .bind(invitee_email)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(invitation)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Invitation>> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT
                id, child_id, child_name, inviter_id, inviter_email,
                invitee_email, status, created_at, updated_at
            FROM invitations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(invitation)
    }

    /// Whether a pending invitation already exists for this child/email pair.
    ///
    /// This backs the create handler's pre-check. It is intentionally not
    /// atomic with the insert, so two racing creates can both pass; accepting
    /// either duplicate is safe because the grant is idempotent.
    pub async fn pending_exists(
        pool: &SqlitePool,
        child_id: &str,
        invitee_email: &str,
    ) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invitations
            WHERE child_id = ? AND invitee_email = ? AND status = 'pending'
            "#,
        )
        .bind(child_id)
        .bind(invitee_email)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count > 0)
    }

    /// Pending invitations addressed to the given email, newest first.
    pub async fn list_pending_for_email(
        pool: &SqlitePool,
        invitee_email: &str,
    ) -> AppResult<Vec<Invitation>> {
        let invitations = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT
                id, child_id, child_name, inviter_id, inviter_email,
                invitee_email, status, created_at, updated_at
            FROM invitations
            WHERE invitee_email = ? AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(invitee_email)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(invitations)
    }

    /// All invitations sent for a child, newest first.
    pub async fn list_by_child(pool: &SqlitePool, child_id: &str) -> AppResult<Vec<Invitation>> {
        let invitations = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT
                id, child_id, child_name, inviter_id, inviter_email,
                invitee_email, status, created_at, updated_at
            FROM invitations
            WHERE child_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(child_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(invitations)
    }

    /// Transition an invitation's status and append the matching outbox event
    /// in a single transaction.
    ///
    /// The UPDATE is guarded on the expected current status, so a record that
    /// already left `from` is not transitioned again; in that case no event is
    /// written and `None` is returned.
    pub async fn transition_with_event(
        pool: &SqlitePool,
        id: &str,
        from: InvitationStatus,
        to: InvitationStatus,
        max_attempts: i32,
    ) -> AppResult<Option<(Invitation, InvitationEvent)>> {
        let now = Utc::now().naive_utc();

        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let updated = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING
                id, child_id, child_name, inviter_id, inviter_email,
                invitee_email, status, created_at, updated_at
            "#,
        )
        .bind(to.as_str())
        .bind(now)
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let invitation = match updated {
            Some(invitation) => invitation,
            None => {
                tx.rollback().await.map_err(AppError::Database)?;
                return Ok(None);
            }
        };

        let event_id = Uuid::new_v4().to_string();
        let event = sqlx::query_as::<_, InvitationEvent>(
            r#"
            INSERT INTO invitation_events (
                id, invitation_id, prev_status, new_status,
                attempts, max_attempts, next_attempt_at, last_error,
                status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 0, ?, ?, NULL, 'pending', ?, ?)
            RETURNING
                id, invitation_id, prev_status, new_status,
                attempts, max_attempts, next_attempt_at, last_error,
                status, created_at, updated_at
            "#,
        )
        .bind(&event_id)
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(max_attempts)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(Some((invitation, event)))
    }
}
