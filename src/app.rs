//! Process bootstrap shared by the `shelf-app` and `shelf-cli` binaries.

use anyhow::Context;
use shelf_db::Database;
use shelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules;

/// Registry with every application module bound to `db`
pub fn build_registry(db: &Database) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, db);
    registry
}

fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    Database::open(&settings.database.path, settings.database.busy_timeout())
        .with_context(|| format!("failed to open database '{}'", settings.database.path))
}

/// Apply pending migrations and exit; returns how many were applied
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let db = open_database(settings)?;
    let registry = build_registry(&db);

    let applied = registry.run_migrations(&db).await?;
    tracing::info!(applied, "migrations complete");

    drop(registry);
    db.close().context("failed to close database")?;
    Ok(applied)
}

/// Run the HTTP server until a shutdown signal arrives
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let registry = build_registry(&db);

    registry.run_migrations(&db).await?;

    let ctx = InitCtx {
        settings,
        db: &db,
    };
    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    let served =
        shelf_http::start_server(&registry, settings, shelf_http::shutdown_signal()).await;

    registry.stop_all().await?;
    drop(registry);
    db.close().context("failed to close database")?;

    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent_on_a_file() {
        let path = std::env::temp_dir().join(format!("shelf-migrate-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut settings = Settings::default();
        settings.database.path = path.to_string_lossy().into_owned();

        assert_eq!(migrate(&settings).await.unwrap(), 1);
        assert_eq!(migrate(&settings).await.unwrap(), 0);

        let _ = std::fs::remove_file(&path);
    }
}
