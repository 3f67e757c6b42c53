use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::Feeding;
use crate::error::{AppError, AppResult};

// ============================================================================
// Feeding Repository
// ============================================================================

pub struct FeedingRepository;

impl FeedingRepository {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &SqlitePool,
        child_id: &str,
        food_item: &str,
        quantity: &str,
        liking: &str,
        allergies_json: &str,
        notes: &str,
        fed_at: NaiveDateTime,
    ) -> AppResult<Feeding> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let feeding = sqlx::query_as::<_, Feeding>(
            r#"
            INSERT INTO feedings (
                id, child_id, food_item, quantity, liking,
                allergies, notes, fed_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, child_id, food_item, quantity, liking,
                allergies, notes, fed_at, created_at
            "#,
        )
        .bind(&id)
        .bind(child_id)
        .bind(food_item)
        .bind(quantity)
        .bind(liking)
        .bind(allergies_json)
        .bind(notes)
        .bind(fed_at)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(feeding)
    }

    /// Feeding history for a child, newest first.
    pub async fn list_by_child(pool: &SqlitePool, child_id: &str) -> AppResult<Vec<Feeding>> {
        let feedings = sqlx::query_as::<_, Feeding>(
            r#"
            SELECT
                id, child_id, food_item, quantity, liking,
                allergies, notes, fed_at, created_at
            FROM feedings
            WHERE child_id = ?
            ORDER BY fed_at DESC
            "#,
        )
        .bind(child_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(feedings)
    }
}
