pub mod models;

use sqlx::{sqlite::SqlitePool, migrate::MigrateDatabase, Sqlite};

pub type DbPool = SqlitePool;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
  if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
    tracing::info!("Creating database: {}", database_url);
    Sqlite::create_database(database_url).await?;
  }

  let pool = SqlitePool::connect(database_url).await?;

  tracing::info!("Running migrations...");
  sqlx::migrate!("./migrations")
    .run(&pool)
    .await?;

  tracing::info!("Database ready");
  Ok(pool)
}

/// Lets writers tell "a racing writer got there first" apart from real
/// failures when an insert hits a UNIQUE constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
  matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}

// In-memory SQLite gives every new connection its own empty database, so
// the test pool is pinned to a single connection.
#[cfg(test)]
pub async fn test_pool() -> DbPool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  sqlx::migrate!("./migrations").run(&pool).await.unwrap();
  pool
}
