use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::GrantWorkerConfig;
use crate::db::models::{InvitationEvent, InvitationStatus};
use crate::db::{ChildRepository, InvitationEventRepository, InvitationRepository};
use crate::error::{AppError, AppResult};
use crate::services::identity::{DirectoryIdentityProvider, IdentityProvider};
use crate::AppState;

/// Result of reconciling a single invitation event.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The transition was not `pending -> accepted`; nothing to do.
    Skipped,
    /// The invitee is now in the child's manager set. `newly_added` is false
    /// when the grant was already present (replayed delivery).
    Granted { user_id: String, newly_added: bool },
    /// No account exists for the invitee email. Terminal for this delivery:
    /// the invitation stays `accepted` and no grant happens.
    IdentityNotFound,
}

/// Turns an accepted invitation into an actual access grant.
///
/// Invoked by the grant worker for every claimed outbox event. The guard
/// condition plus the set-union grant make the whole procedure idempotent,
/// so at-least-once delivery with duplicate invocations is safe.
pub struct InvitationReconciler {
    pool: SqlitePool,
    identity: Arc<dyn IdentityProvider>,
}

impl InvitationReconciler {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self::with_identity(
            state.db.clone(),
            Arc::new(DirectoryIdentityProvider::new(state.db.clone())),
        )
    }

    pub fn with_identity(pool: SqlitePool, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { pool, identity }
    }

    /// Apply the reconciliation contract to one event.
    ///
    /// Only the `pending -> accepted` transition has an effect; every other
    /// transition returns `Skipped` without touching any record. Errors are
    /// transient infra failures that the outbox substrate may redeliver.
    pub async fn reconcile(&self, event: &InvitationEvent) -> AppResult<ReconcileOutcome> {
        let prev = InvitationStatus::from_str(&event.prev_status);
        let new = InvitationStatus::from_str(&event.new_status);
        if prev != Some(InvitationStatus::Pending) || new != Some(InvitationStatus::Accepted) {
            return Ok(ReconcileOutcome::Skipped);
        }

        let invitation = InvitationRepository::find_by_id(&self.pool, &event.invitation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Invitation not found: {}", event.invitation_id))
            })?;

        let user_id = match self
            .identity
            .lookup_user_by_email(&invitation.invitee_email)
            .await?
        {
            Some(user_id) => user_id,
            None => {
                // Deliberately leaves the invitation marked accepted with no
                // grant; there is no remediation path beyond the recorded
                // failure on the event row.
                tracing::error!(
                    invitation_id = %invitation.id,
                    child_id = %invitation.child_id,
                    invitee_email = %invitation.invitee_email,
                    "No account found for invitee email; access grant skipped"
                );
                return Ok(ReconcileOutcome::IdentityNotFound);
            }
        };

        let newly_added =
            ChildRepository::add_manager(&self.pool, &invitation.child_id, &user_id).await?;

        tracing::info!(
            invitation_id = %invitation.id,
            child_id = %invitation.child_id,
            invitee_email = %invitation.invitee_email,
            user_id = %user_id,
            newly_added,
            "Granted manager access for accepted invitation"
        );

        Ok(ReconcileOutcome::Granted {
            user_id,
            newly_added,
        })
    }

    /// Reconcile a claimed event and settle its delivery status.
    ///
    /// Guard skips and grants mark the event done; an unresolvable invitee
    /// marks it failed without retry. Transient errors put the event back in
    /// the queue with exponential backoff (until `max_attempts`, enforced by
    /// the repository) and are returned to the caller for logging.
    pub async fn process_claimed_event(
        &self,
        worker: &GrantWorkerConfig,
        event: InvitationEvent,
    ) -> AppResult<()> {
        match self.reconcile(&event).await {
            Ok(ReconcileOutcome::Skipped) | Ok(ReconcileOutcome::Granted { .. }) => {
                InvitationEventRepository::mark_done(&self.pool, &event.id).await?;
                Ok(())
            }
            Ok(ReconcileOutcome::IdentityNotFound) => {
                InvitationEventRepository::mark_failed(
                    &self.pool,
                    &event.id,
                    Some("No account found for invitee email".to_string()),
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                let delay = backoff_seconds(worker, event.attempts);
                let next_attempt_at =
                    Utc::now().naive_utc() + chrono::Duration::seconds(delay as i64);
                InvitationEventRepository::register_attempt_and_schedule(
                    &self.pool,
                    &event.id,
                    next_attempt_at,
                    Some(e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }
}

/// Exponential backoff for redelivery: initial * 2^attempts, capped.
fn backoff_seconds(worker: &GrantWorkerConfig, attempts: i32) -> u64 {
    let exp = worker
        .initial_backoff_seconds
        .saturating_mul(2u64.saturating_pow(attempts.max(0) as u32));
    exp.min(worker.max_backoff_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::db::{Invitation, UserRepository};

    fn worker_config() -> GrantWorkerConfig {
        GrantWorkerConfig {
            enabled: true,
            poll_interval_seconds: 1,
            batch_size: 10,
            max_attempts: 5,
            initial_backoff_seconds: 30,
            max_backoff_seconds: 3600,
        }
    }

    async fn seed_child_with_owner(pool: &SqlitePool) -> (String, String) {
        let owner = UserRepository::create(pool, "parent@example.com", "hash")
            .await
            .unwrap();
        let child = ChildRepository::create(
            pool,
            "Leo",
            Utc::now().naive_utc(),
            "Boy",
            &owner.id,
        )
        .await
        .unwrap();
        (child.id, owner.id)
    }

    async fn invite(pool: &SqlitePool, child_id: &str, inviter_id: &str, email: &str) -> Invitation {
        InvitationRepository::create(
            pool,
            child_id,
            "Leo",
            inviter_id,
            "parent@example.com",
            email,
        )
        .await
        .unwrap()
    }

    async fn transition(
        pool: &SqlitePool,
        invitation_id: &str,
        to: InvitationStatus,
    ) -> InvitationEvent {
        let (_, event) = InvitationRepository::transition_with_event(
            pool,
            invitation_id,
            InvitationStatus::Pending,
            to,
            5,
        )
        .await
        .unwrap()
        .unwrap();
        event
    }

    fn reconciler(pool: &SqlitePool) -> InvitationReconciler {
        InvitationReconciler::with_identity(
            pool.clone(),
            Arc::new(DirectoryIdentityProvider::new(pool.clone())),
        )
    }

    #[tokio::test]
    async fn accepted_invitation_grants_access() {
        let pool = memory_pool().await;
        let (child_id, owner_id) = seed_child_with_owner(&pool).await;
        let invitee = UserRepository::create(&pool, "aunt@example.com", "hash")
            .await
            .unwrap();

        let invitation = invite(&pool, &child_id, &owner_id, "aunt@example.com").await;
        let event = transition(&pool, &invitation.id, InvitationStatus::Accepted).await;

        reconciler(&pool)
            .process_claimed_event(&worker_config(), event.clone())
            .await
            .unwrap();

        let managers = ChildRepository::managers(&pool, &child_id).await.unwrap();
        assert_eq!(managers.len(), 2);
        assert!(managers.contains(&owner_id));
        assert!(managers.contains(&invitee.id));

        let settled = InvitationEventRepository::find_by_id(&pool, &event.id)
            .await
            .unwrap();
        assert_eq!(settled.status, "done");
    }

    #[tokio::test]
    async fn replayed_delivery_leaves_managers_unchanged() {
        let pool = memory_pool().await;
        let (child_id, owner_id) = seed_child_with_owner(&pool).await;
        UserRepository::create(&pool, "aunt@example.com", "hash")
            .await
            .unwrap();

        let invitation = invite(&pool, &child_id, &owner_id, "aunt@example.com").await;
        let event = transition(&pool, &invitation.id, InvitationStatus::Accepted).await;

        let r = reconciler(&pool);
        match r.reconcile(&event).await.unwrap() {
            ReconcileOutcome::Granted { newly_added, .. } => assert!(newly_added),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Same notification delivered again: the grant is a no-op.
        match r.reconcile(&event).await.unwrap() {
            ReconcileOutcome::Granted { newly_added, .. } => assert!(!newly_added),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let managers = ChildRepository::managers(&pool, &child_id).await.unwrap();
        assert_eq!(managers.len(), 2);
    }

    #[tokio::test]
    async fn declined_transition_is_a_noop() {
        let pool = memory_pool().await;
        let (child_id, owner_id) = seed_child_with_owner(&pool).await;
        UserRepository::create(&pool, "aunt@example.com", "hash")
            .await
            .unwrap();

        let invitation = invite(&pool, &child_id, &owner_id, "aunt@example.com").await;
        let event = transition(&pool, &invitation.id, InvitationStatus::Declined).await;

        reconciler(&pool)
            .process_claimed_event(&worker_config(), event.clone())
            .await
            .unwrap();

        // Guard skip: no mutation, event settled as done.
        let managers = ChildRepository::managers(&pool, &child_id).await.unwrap();
        assert_eq!(managers, vec![owner_id]);
        let settled = InvitationEventRepository::find_by_id(&pool, &event.id)
            .await
            .unwrap();
        assert_eq!(settled.status, "done");
    }

    #[tokio::test]
    async fn unregistered_invitee_fails_without_mutation() {
        let pool = memory_pool().await;
        let (child_id, owner_id) = seed_child_with_owner(&pool).await;

        // aunt@example.com never registered.
        let invitation = invite(&pool, &child_id, &owner_id, "aunt@example.com").await;
        let event = transition(&pool, &invitation.id, InvitationStatus::Accepted).await;

        reconciler(&pool)
            .process_claimed_event(&worker_config(), event.clone())
            .await
            .unwrap();

        // No grant happened, but the invitation stays accepted.
        let managers = ChildRepository::managers(&pool, &child_id).await.unwrap();
        assert_eq!(managers, vec![owner_id]);

        let invitation = InvitationRepository::find_by_id(&pool, &invitation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invitation.status, "accepted");

        let settled = InvitationEventRepository::find_by_id(&pool, &event.id)
            .await
            .unwrap();
        assert_eq!(settled.status, "failed");
        assert!(settled.last_error.is_some());
    }

    #[tokio::test]
    async fn concurrent_grants_never_drop_either() {
        let pool = memory_pool().await;
        let (child_id, owner_id) = seed_child_with_owner(&pool).await;
        let aunt = UserRepository::create(&pool, "aunt@example.com", "hash")
            .await
            .unwrap();
        let uncle = UserRepository::create(&pool, "uncle@example.com", "hash")
            .await
            .unwrap();

        let inv_a = invite(&pool, &child_id, &owner_id, "aunt@example.com").await;
        let inv_b = invite(&pool, &child_id, &owner_id, "uncle@example.com").await;
        let event_a = transition(&pool, &inv_a.id, InvitationStatus::Accepted).await;
        let event_b = transition(&pool, &inv_b.id, InvitationStatus::Accepted).await;

        let r1 = reconciler(&pool);
        let r2 = reconciler(&pool);
        let (a, b) = tokio::join!(r1.reconcile(&event_a), r2.reconcile(&event_b));
        a.unwrap();
        b.unwrap();

        // The final manager set is the union regardless of interleaving.
        let managers = ChildRepository::managers(&pool, &child_id).await.unwrap();
        assert_eq!(managers.len(), 3);
        assert!(managers.contains(&owner_id));
        assert!(managers.contains(&aunt.id));
        assert!(managers.contains(&uncle.id));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let worker = worker_config();
        assert_eq!(backoff_seconds(&worker, 0), 30);
        assert_eq!(backoff_seconds(&worker, 1), 60);
        assert_eq!(backoff_seconds(&worker, 2), 120);
        // Large attempt counts hit the cap instead of overflowing.
        assert_eq!(backoff_seconds(&worker, 30), 3600);
        assert_eq!(backoff_seconds(&worker, 1000), 3600);
    }
}
