use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub type DbPool = SqlitePool;

/// Application state holding the database connection pool. Constructed once
/// at process start and passed explicitly to everything that touches the
/// database — there is no global engine.
pub struct AppState {
  pub db: DbPool,
}

/// Initialize the connection pool and run migrations.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(database_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  Ok(pool)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_init_pool_runs_migrations() {
    let pool = init_pool("sqlite::memory:").await.expect("pool should initialize");
    let state = AppState { db: pool };
    state.db.close().await;
  }
}
