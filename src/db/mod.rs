#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod repository;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::*;
pub use repository::*;
pub use traits::*;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;

pub async fn init_postgres_pool(connection_string: &str, max_connections: u32) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(connection_string)?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations: &[(i32, &str, &str)] = &[(
        1,
        "initial",
        include_str!("../../migrations/001_initial.sql"),
    )];

    // Statements are idempotent (IF NOT EXISTS), so every start replays them
    for &(_, _, sql) in migrations {
        sqlx::raw_sql(sql).execute(pool).await?;
    }

    for &(version, name, _) in migrations {
        sqlx::query(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2) ON CONFLICT (version) DO NOTHING"
        )
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let applied: Vec<(i32,)> = sqlx::query_as(
        "SELECT version FROM schema_migrations ORDER BY version"
    )
    .fetch_all(pool)
    .await?;

    tracing::info!(
        versions = ?applied.iter().map(|r| r.0).collect::<Vec<_>>(),
        "database migrations applied"
    );

    Ok(())
}
