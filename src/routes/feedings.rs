use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{ChildRepository, Feeding, FeedingRepository, Liking};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

/// Feeding routes are nested under `/api/children`.
pub fn router() -> Router<Arc<AppState>> {
    // Same `:id` segment name as the children router this merges with.
    Router::new().route("/:id/feedings", get(list_feedings).post(create_feeding))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateFeedingRequest {
    pub food_item: String,
    pub quantity: String,
    /// One of `loved`, `liked`, `disliked`, `refused`.
    pub liking: String,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub notes: String,
    /// When the feeding happened; defaults to now.
    pub fed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct FeedingResponse {
    pub id: String,
    pub child_id: String,
    pub food_item: String,
    pub quantity: String,
    pub liking: String,
    pub allergies: Vec<String>,
    pub notes: String,
    pub fed_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl From<Feeding> for FeedingResponse {
    fn from(f: Feeding) -> Self {
        let allergies = f.allergy_list();
        Self {
            id: f.id,
            child_id: f.child_id,
            food_item: f.food_item,
            quantity: f.quantity,
            liking: f.liking,
            allergies,
            notes: f.notes,
            fed_at: f.fed_at,
            created_at: f.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Record a feeding for a child. Manager-only. Records are immutable once
/// created.
async fn create_feeding(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(child_id): Path<String>,
    Json(request): Json<CreateFeedingRequest>,
) -> AppResult<Json<FeedingResponse>> {
    let child = ChildRepository::find_by_id(&state.db, &child_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Child profile not found".to_string()))?;

    if !ChildRepository::is_manager(&state.db, &child.id, &user.id).await? {
        return Err(AppError::Forbidden);
    }

    let food_item = request.food_item.trim();
    if food_item.is_empty() {
        return Err(AppError::Validation(
            "Food item must not be empty".to_string(),
        ));
    }
    let quantity = request.quantity.trim();
    if quantity.is_empty() {
        return Err(AppError::Validation(
            "Quantity must not be empty".to_string(),
        ));
    }
    let liking = Liking::from_str(&request.liking)
        .ok_or_else(|| AppError::Validation(format!("Invalid liking: {}", request.liking)))?;

    let allergies: Vec<String> = request
        .allergies
        .iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    let allergies_json = serde_json::to_string(&allergies)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode allergies: {}", e)))?;

    let fed_at = request.fed_at.unwrap_or_else(|| Utc::now().naive_utc());

    let feeding = FeedingRepository::create(
        &state.db,
        &child.id,
        food_item,
        quantity,
        liking.as_str(),
        &allergies_json,
        request.notes.trim(),
        fed_at,
    )
    .await?;

    Ok(Json(feeding.into()))
}

/// Feeding history for a child, newest first. Manager-only.
async fn list_feedings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(child_id): Path<String>,
) -> AppResult<Json<Vec<FeedingResponse>>> {
    let child = ChildRepository::find_by_id(&state.db, &child_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Child profile not found".to_string()))?;

    if !ChildRepository::is_manager(&state.db, &child.id, &user.id).await? {
        return Err(AppError::Forbidden);
    }

    let feedings = FeedingRepository::list_by_child(&state.db, &child.id).await?;
    Ok(Json(feedings.into_iter().map(Into::into).collect()))
}
