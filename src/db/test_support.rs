//! Shared helpers for database-backed tests.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Open a fresh in-memory SQLite database with migrations applied.
///
/// Every connection opens a distinct `:memory:` database, so the pool is
/// capped at a single connection.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}
