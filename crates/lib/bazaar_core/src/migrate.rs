//! Schema migrations embedded from `bazaar_core/migrations/`.

use sqlx::PgPool;

/// Apply every pending migration.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
