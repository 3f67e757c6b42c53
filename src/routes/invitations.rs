use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::{
    ChildRepository, Invitation, InvitationRepository, InvitationStatus,
};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_incoming).post(create_invitation))
        .route("/sent", get(list_sent))
        .route("/:id/accept", post(accept_invitation))
        .route("/:id/decline", post(decline_invitation))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub child_id: String,
    pub invitee_email: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSentQuery {
    pub child_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: String,
    pub child_id: String,
    pub child_name: String,
    pub inviter_email: String,
    pub invitee_email: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            id: i.id,
            child_id: i.child_id,
            child_name: i.child_name,
            inviter_email: i.inviter_email,
            invitee_email: i.invitee_email,
            status: i.status,
            created_at: i.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Invite another account (by email) to manage a child. Manager-only.
///
/// The duplicate check below is a pre-check, not a constraint: two racing
/// creates for the same (child, email) pair can both pass it. The resulting
/// duplicate pending invitations are harmless because the eventual grant is
/// idempotent.
async fn create_invitation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateInvitationRequest>,
) -> AppResult<Json<InvitationResponse>> {
    let child = ChildRepository::find_by_id(&state.db, &request.child_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Child profile not found".to_string()))?;

    if !ChildRepository::is_manager(&state.db, &child.id, &user.id).await? {
        return Err(AppError::Forbidden);
    }

    let invitee_email = request.invitee_email.trim().to_lowercase();
    if invitee_email.is_empty() || !invitee_email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if invitee_email == user.email {
        return Err(AppError::BadRequest(
            "You cannot invite yourself".to_string(),
        ));
    }

    if InvitationRepository::pending_exists(&state.db, &child.id, &invitee_email).await? {
        return Err(AppError::Conflict(
            "An invitation has already been sent to this user for this child".to_string(),
        ));
    }

    let invitation = InvitationRepository::create(
        &state.db,
        &child.id,
        &child.name,
        &user.id,
        &user.email,
        &invitee_email,
    )
    .await?;

    tracing::info!(
        invitation_id = %invitation.id,
        child_id = %child.id,
        invitee_email = %invitation.invitee_email,
        "Created invitation"
    );

    Ok(Json(invitation.into()))
}

/// Pending invitations addressed to the current user.
async fn list_incoming(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<InvitationResponse>>> {
    let invitations =
        InvitationRepository::list_pending_for_email(&state.db, &user.email).await?;
    Ok(Json(invitations.into_iter().map(Into::into).collect()))
}

/// Invitations sent for a child, newest first. Manager-only.
async fn list_sent(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListSentQuery>,
) -> AppResult<Json<Vec<InvitationResponse>>> {
    let child = ChildRepository::find_by_id(&state.db, &query.child_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Child profile not found".to_string()))?;

    if !ChildRepository::is_manager(&state.db, &child.id, &user.id).await? {
        return Err(AppError::Forbidden);
    }

    let invitations = InvitationRepository::list_by_child(&state.db, &child.id).await?;
    Ok(Json(invitations.into_iter().map(Into::into).collect()))
}

/// Accept an invitation addressed to the current user.
async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<InvitationResponse>> {
    transition(&state, &user.email, &id, InvitationStatus::Accepted).await
}

/// Decline an invitation addressed to the current user.
async fn decline_invitation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<InvitationResponse>> {
    transition(&state, &user.email, &id, InvitationStatus::Declined).await
}

/// Flip a pending invitation to its terminal status and append the outbox
/// event in the same transaction. The grant worker picks the event up from
/// there; this handler never mutates the manager set itself.
async fn transition(
    state: &Arc<AppState>,
    user_email: &str,
    id: &str,
    to: InvitationStatus,
) -> AppResult<Json<InvitationResponse>> {
    let invitation = InvitationRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

    if invitation.invitee_email != user_email {
        return Err(AppError::Forbidden);
    }

    let max_attempts = state.config.grant_worker.max_attempts as i32;
    let result = InvitationRepository::transition_with_event(
        &state.db,
        id,
        InvitationStatus::Pending,
        to,
        max_attempts,
    )
    .await?;

    let (invitation, _event) = result.ok_or_else(|| {
        AppError::Conflict("Invitation is no longer pending".to_string())
    })?;

    tracing::info!(
        invitation_id = %invitation.id,
        child_id = %invitation.child_id,
        status = %invitation.status,
        "Invitation status updated"
    );

    Ok(Json(invitation.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::test_support::memory_pool;
    use crate::db::InvitationEventRepository;
    use crate::services::reconciler::InvitationReconciler;

    async fn test_app() -> (axum::Router, Arc<AppState>) {
        let pool = memory_pool().await;
        let mut config = Config::default();
        config.jwt.secret = "test-secret".to_string();
        let state = Arc::new(AppState { db: pool, config });

        let app = axum::Router::new()
            .nest("/api/auth", crate::routes::auth::router())
            .nest(
                "/api/children",
                crate::routes::children::router().merge(crate::routes::feedings::router()),
            )
            .nest("/api/invitations", crate::routes::invitations::router())
            .with_state(state.clone());

        (app, state)
    }

    async fn request(
        app: &axum::Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(app: &axum::Router, email: &str) -> String {
        let (status, body) = request(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({ "email": email, "password": "hunter2-hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn invitation_acceptance_grants_access_end_to_end() {
        let (app, state) = test_app().await;

        let parent_token = register(&app, "parent@example.com").await;
        let aunt_token = register(&app, "aunt@example.com").await;

        // Parent creates a child profile.
        let (status, child) = request(
            &app,
            "POST",
            "/api/children",
            Some(&parent_token),
            Some(serde_json::json!({ "name": "Leo", "dob": "2024-01-15", "gender": "Boy" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let child_id = child["id"].as_str().unwrap().to_string();

        // Parent invites the aunt.
        let (status, _) = request(
            &app,
            "POST",
            "/api/invitations",
            Some(&parent_token),
            Some(serde_json::json!({ "child_id": child_id, "invitee_email": "aunt@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Duplicate pending invitation for the same pair is rejected by the
        // pre-check.
        let (status, _) = request(
            &app,
            "POST",
            "/api/invitations",
            Some(&parent_token),
            Some(serde_json::json!({ "child_id": child_id, "invitee_email": "aunt@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Inviting yourself is rejected.
        let (status, _) = request(
            &app,
            "POST",
            "/api/invitations",
            Some(&parent_token),
            Some(serde_json::json!({ "child_id": child_id, "invitee_email": "parent@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // The aunt sees the pending invitation on her dashboard.
        let (status, incoming) =
            request(&app, "GET", "/api/invitations", Some(&aunt_token), None).await;
        assert_eq!(status, StatusCode::OK);
        let incoming = incoming.as_array().unwrap();
        assert_eq!(incoming.len(), 1);
        let invitation_id = incoming[0]["id"].as_str().unwrap().to_string();

        // Before acceptance she cannot read the child profile.
        let (status, _) = request(
            &app,
            "GET",
            &format!("/api/children/{}", child_id),
            Some(&aunt_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Accept: flips the status and appends the outbox event.
        let (status, accepted) = request(
            &app,
            "POST",
            &format!("/api/invitations/{}/accept", invitation_id),
            Some(&aunt_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "accepted");

        // Accepting twice hits the terminal-status guard.
        let (status, _) = request(
            &app,
            "POST",
            &format!("/api/invitations/{}/accept", invitation_id),
            Some(&aunt_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Drain the outbox the way the grant worker does.
        let events = InvitationEventRepository::fetch_and_claim_due(&state.db, 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        let reconciler = InvitationReconciler::new(&state);
        for event in events {
            reconciler
                .process_claimed_event(&state.config.grant_worker, event)
                .await
                .unwrap();
        }

        // The aunt can now read the child profile and it lists both managers.
        let (status, detail) = request(
            &app,
            "GET",
            &format!("/api/children/{}", child_id),
            Some(&aunt_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["managers"].as_array().unwrap().len(), 2);

        // And the child shows up in her managed list.
        let (status, children) =
            request(&app, "GET", "/api/children", Some(&aunt_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(children.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn declining_never_grants_access() {
        let (app, state) = test_app().await;

        let parent_token = register(&app, "parent@example.com").await;
        let uncle_token = register(&app, "uncle@example.com").await;

        let (_, child) = request(
            &app,
            "POST",
            "/api/children",
            Some(&parent_token),
            Some(serde_json::json!({ "name": "Mia", "dob": "2023-06-01", "gender": "Girl" })),
        )
        .await;
        let child_id = child["id"].as_str().unwrap().to_string();

        let (_, invitation) = request(
            &app,
            "POST",
            "/api/invitations",
            Some(&parent_token),
            Some(serde_json::json!({ "child_id": child_id, "invitee_email": "uncle@example.com" })),
        )
        .await;
        let invitation_id = invitation["id"].as_str().unwrap().to_string();

        let (status, declined) = request(
            &app,
            "POST",
            &format!("/api/invitations/{}/decline", invitation_id),
            Some(&uncle_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(declined["status"], "declined");

        // The event is delivered but the guard makes it a no-op.
        let events = InvitationEventRepository::fetch_and_claim_due(&state.db, 10)
            .await
            .unwrap();
        let reconciler = InvitationReconciler::new(&state);
        for event in events {
            reconciler
                .process_claimed_event(&state.config.grant_worker, event)
                .await
                .unwrap();
        }

        let (status, _) = request(
            &app,
            "GET",
            &format!("/api/children/{}", child_id),
            Some(&uncle_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn only_the_invitee_may_respond() {
        let (app, _state) = test_app().await;

        let parent_token = register(&app, "parent@example.com").await;
        let _aunt_token = register(&app, "aunt@example.com").await;

        let (_, child) = request(
            &app,
            "POST",
            "/api/children",
            Some(&parent_token),
            Some(serde_json::json!({ "name": "Leo", "dob": "2024-01-15", "gender": "Boy" })),
        )
        .await;
        let child_id = child["id"].as_str().unwrap().to_string();

        let (_, invitation) = request(
            &app,
            "POST",
            "/api/invitations",
            Some(&parent_token),
            Some(serde_json::json!({ "child_id": child_id, "invitee_email": "aunt@example.com" })),
        )
        .await;
        let invitation_id = invitation["id"].as_str().unwrap().to_string();

        // The inviter cannot accept on the invitee's behalf.
        let (status, _) = request(
            &app,
            "POST",
            &format!("/api/invitations/{}/accept", invitation_id),
            Some(&parent_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
