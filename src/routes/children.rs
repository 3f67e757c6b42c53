use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::{Child, ChildRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_children).post(create_child))
        .route("/:id", get(get_child))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    /// Date of birth as `YYYY-MM-DD`.
    pub dob: NaiveDate,
    pub gender: String,
}

#[derive(Debug, Serialize)]
pub struct ChildResponse {
    pub id: String,
    pub name: String,
    pub dob: NaiveDateTime,
    pub gender: String,
    pub created_at: NaiveDateTime,
}

impl From<Child> for ChildResponse {
    fn from(c: Child) -> Self {
        Self {
            id: c.id,
            name: c.name,
            dob: c.dob,
            gender: c.gender,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChildDetailResponse {
    #[serde(flatten)]
    pub child: ChildResponse,
    /// User ids authorized to manage this child.
    pub managers: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a child profile. The creator automatically becomes the first
/// manager.
async fn create_child(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateChildRequest>,
) -> AppResult<Json<ChildResponse>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name must not be empty".to_string()));
    }
    let gender = request.gender.trim();
    if gender.is_empty() {
        return Err(AppError::Validation("Gender must not be empty".to_string()));
    }

    let dob = request
        .dob
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::Validation("Invalid date of birth".to_string()))?;

    let child = ChildRepository::create(&state.db, name, dob, gender, &user.id).await?;

    tracing::info!(child_id = %child.id, user_id = %user.id, "Created child profile");

    Ok(Json(child.into()))
}

/// List child profiles the current user manages.
async fn list_children(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<ChildResponse>>> {
    let children = ChildRepository::list_managed_by(&state.db, &user.id).await?;
    Ok(Json(children.into_iter().map(Into::into).collect()))
}

/// Get a single child profile. Manager-only.
async fn get_child(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ChildDetailResponse>> {
    let child = ChildRepository::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Child profile not found".to_string()))?;

    if !ChildRepository::is_manager(&state.db, &child.id, &user.id).await? {
        return Err(AppError::Forbidden);
    }

    let managers = ChildRepository::managers(&state.db, &child.id).await?;

    Ok(Json(ChildDetailResponse {
        child: child.into(),
        managers,
    }))
}
