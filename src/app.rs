//! Process bootstrap: store, context, module lifecycle and the HTTP server.

use std::sync::Arc;

use anyhow::Context;

use shelf_db::DocumentStore;
use shelf_kernel::{InitCtx, ModuleRegistry, Settings};

use crate::context::AppContext;
use crate::modules::{self, users};

/// Registry holding every application module bound to `ctx`.
pub fn build_registry(ctx: &AppContext) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, ctx);
    registry
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let store = shelf_db::connect(&settings.database)
        .await
        .context("failed to open document store")?;
    store.ping().await.context("document store is unreachable")?;
    tracing::info!(backend = store.backend(), "document store ready");
    Ok(store)
}

/// Serve the API until a shutdown signal arrives.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = open_store(&settings).await?;
    let ctx = AppContext::from_settings(&settings, store.clone())?;
    let registry = build_registry(&ctx);

    let init = InitCtx {
        settings: &settings,
        store: store.as_ref(),
    };
    registry.init_modules(&init).await?;
    let applied = registry.run_migrations(store.as_ref()).await?;
    tracing::info!(indexes = applied, "migrations applied");
    registry.start_modules(&init).await?;

    let served = shelf_http::start_server(&registry, &settings).await;
    registry.stop_modules().await?;
    served
}

/// Apply module migrations and exit.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let store = open_store(settings).await?;
    let ctx = AppContext::from_settings(settings, store.clone())?;
    build_registry(&ctx).run_migrations(store.as_ref()).await
}

/// Give the account registered under `email` the admin role.
pub async fn promote(settings: &Settings, email: &str) -> anyhow::Result<users::models::UserProfile> {
    let store = open_store(settings).await?;
    users::promote_to_admin(store, email).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_db::MemoryStore;

    #[test]
    fn registry_mounts_every_module() {
        let settings = Settings::default();
        let ctx = AppContext::from_settings(&settings, Arc::new(MemoryStore::new())).unwrap();
        let registry = build_registry(&ctx);

        let names: Vec<_> = registry.modules().iter().map(|module| module.name()).collect();
        assert_eq!(names, ["users", "books", "reviews"]);
        assert_eq!(registry.collect_migrations().len(), 2);
    }

    #[tokio::test]
    async fn migrate_runs_against_the_default_store() {
        let applied = migrate(&Settings::default()).await.unwrap();
        assert_eq!(applied, 3);
    }
}
