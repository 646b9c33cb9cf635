use sqlx::SqlitePool;
use tracing::debug;

/// Run all schema migrations (versioned, tracked in `_sqlx_migrations` table)
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Running symbol store migrations...");
    sqlx::migrate!().run(pool).await?;
    debug!("Symbol store migrations completed");
    Ok(())
}
