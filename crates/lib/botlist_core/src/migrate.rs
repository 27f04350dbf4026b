//! Embedded schema for the core tables.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use tracing::info;

/// Migrations under `botlist_core/migrations/`, compiled into the binary.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations. Already-applied versions are skipped.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    let latest = MIGRATOR.iter().map(|m| m.version).max().unwrap_or_default();
    info!(version = latest, "Core schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_migration_is_embedded() {
        assert!(
            MIGRATOR
                .iter()
                .any(|m| m.description.contains("core"))
        );
    }
}
