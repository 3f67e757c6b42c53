use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::Child;
use crate::error::{AppError, AppResult};

// ============================================================================
// Child Repository
// ============================================================================

pub struct ChildRepository;

impl ChildRepository {
    /// Create a child profile. The creator is inserted into the manager set
    /// in the same transaction, so the set is never empty.
    pub async fn create(
        pool: &SqlitePool,
        name: &str,
        dob: NaiveDateTime,
        gender: &str,
        creator_id: &str,
    ) -> AppResult<Child> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let child = sqlx::query_as::<_, Child>(
            r#"
            INSERT INTO children (id, name, dob, gender, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, dob, gender, created_at
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(dob)
        .bind(gender)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO child_managers (child_id, user_id, granted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(creator_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(child)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Child>> {
        let child = sqlx::query_as::<_, Child>(
            r#"
            SELECT id, name, dob, gender, created_at
            FROM children
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(child)
    }

    /// Children the given user manages, newest first.
    pub async fn list_managed_by(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Child>> {
        let children = sqlx::query_as::<_, Child>(
            r#"
            SELECT c.id, c.name, c.dob, c.gender, c.created_at
            FROM children c
            JOIN child_managers m ON m.child_id = c.id
            WHERE m.user_id = ?
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(children)
    }

    /// Add a user to a child's manager set.
    ///
    /// `INSERT OR IGNORE` gives the append union semantics: re-applying the
    /// same grant is a no-op and concurrent appends never conflict.
    /// Returns true when the user was newly added.
    pub async fn add_manager(
        pool: &SqlitePool,
        child_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO child_managers (child_id, user_id, granted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(child_id)
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_manager(pool: &SqlitePool, child_id: &str, user_id: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM child_managers
            WHERE child_id = ? AND user_id = ?
            "#,
        )
        .bind(child_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count > 0)
    }

    pub async fn managers(pool: &SqlitePool, child_id: &str) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM child_managers
            WHERE child_id = ?
            ORDER BY granted_at ASC, user_id ASC
            "#,
        )
        .bind(child_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::db::UserRepository;

    #[tokio::test]
    async fn creator_becomes_first_manager() {
        let pool = memory_pool().await;
        let user = UserRepository::create(&pool, "parent@example.com", "hash")
            .await
            .unwrap();

        let child = ChildRepository::create(
            &pool,
            "Leo",
            Utc::now().naive_utc(),
            "Boy",
            &user.id,
        )
        .await
        .unwrap();

        assert!(ChildRepository::is_manager(&pool, &child.id, &user.id)
            .await
            .unwrap());
        assert_eq!(
            ChildRepository::managers(&pool, &child.id).await.unwrap(),
            vec![user.id.clone()]
        );
    }

    #[tokio::test]
    async fn add_manager_is_idempotent() {
        let pool = memory_pool().await;
        let owner = UserRepository::create(&pool, "owner@example.com", "hash")
            .await
            .unwrap();
        let other = UserRepository::create(&pool, "other@example.com", "hash")
            .await
            .unwrap();
        let child = ChildRepository::create(
            &pool,
            "Mia",
            Utc::now().naive_utc(),
            "Girl",
            &owner.id,
        )
        .await
        .unwrap();

        assert!(ChildRepository::add_manager(&pool, &child.id, &other.id)
            .await
            .unwrap());
        // Second append of the same id is a no-op.
        assert!(!ChildRepository::add_manager(&pool, &child.id, &other.id)
            .await
            .unwrap());

        let managers = ChildRepository::managers(&pool, &child.id).await.unwrap();
        assert_eq!(managers.len(), 2);
        assert!(managers.contains(&owner.id));
        assert!(managers.contains(&other.id));
    }
}
