use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS galaxy_jobs (
            id UUID PRIMARY KEY,
            kind VARCHAR(50) NOT NULL,
            plugin VARCHAR(255) NOT NULL,
            state VARCHAR(50) NOT NULL,
            params JSONB NOT NULL DEFAULT '{}',
            info TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            update_time TIMESTAMPTZ NOT NULL,
            last_check TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The poll loops always query by kind and state
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_galaxy_jobs_kind_state ON galaxy_jobs(kind, state)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_galaxy_jobs_created_at ON galaxy_jobs(created_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
