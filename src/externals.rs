//! External library service: the curated registry and per-game installs.
//!
//! Installed externals feed the bundle manifest; installing or removing one
//! re-triggers the build so the manifest stays current.

use std::sync::Arc;

use crate::error::KernelError;
use crate::store::AtomStore;
use crate::trigger::RebuildTrigger;
use crate::types::{ExternalDetail, GameId, InstalledExternal, RegistryEntry};

/// Service over the external-library registry and installs.
pub struct ExternalService<S> {
    store: Arc<S>,
    trigger: Arc<dyn RebuildTrigger>,
}

impl<S: AtomStore> ExternalService<S> {
    /// Create a new service.
    pub fn new(store: Arc<S>, trigger: Arc<dyn RebuildTrigger>) -> Self {
        Self { store, trigger }
    }

    /// List all available libraries from the curated registry.
    pub async fn list_registry(&self) -> Result<Vec<RegistryEntry>, KernelError> {
        Ok(self.store.list_registry().await?)
    }

    /// Install a registry library into a game by name.
    pub async fn install(
        &self,
        game: GameId,
        registry_name: &str,
    ) -> Result<InstalledExternal, KernelError> {
        let entry = self
            .store
            .get_registry_entry(registry_name)
            .await?
            .ok_or_else(|| {
                KernelError::not_found(format!(
                    "External \"{registry_name}\" not found in registry."
                ))
            })?;

        if !self.store.install_external(game, entry.id).await? {
            return Err(KernelError::validation(format!(
                "\"{registry_name}\" is already installed in this game."
            )));
        }

        tracing::info!(game_id = %game, name = registry_name, "external installed");

        // Rebuild so the manifest is regenerated.
        self.trigger.request_rebuild(game).await;

        let installed = self.store.installed_externals(game).await?;
        installed
            .into_iter()
            .find(|ext| ext.name == registry_name)
            .ok_or_else(|| {
                KernelError::not_found(format!(
                    "External \"{registry_name}\" vanished after install."
                ))
            })
    }

    /// Uninstall a registry library from a game by name.
    pub async fn uninstall(&self, game: GameId, registry_name: &str) -> Result<(), KernelError> {
        let entry = self
            .store
            .get_registry_entry(registry_name)
            .await?
            .ok_or_else(|| {
                KernelError::not_found(format!(
                    "External \"{registry_name}\" not found in registry."
                ))
            })?;

        if !self.store.uninstall_external(game, entry.id).await? {
            return Err(KernelError::validation(format!(
                "\"{registry_name}\" is not installed in this game."
            )));
        }

        tracing::info!(game_id = %game, name = registry_name, "external uninstalled");

        self.trigger.request_rebuild(game).await;
        Ok(())
    }

    /// Installed externals for a game, without API surfaces.
    pub async fn installed(&self, game: GameId) -> Result<Vec<InstalledExternal>, KernelError> {
        Ok(self.store.installed_externals(game).await?)
    }

    /// Full detail (including API surface) for specific installed externals.
    pub async fn read(
        &self,
        game: GameId,
        names: &[String],
    ) -> Result<Vec<ExternalDetail>, KernelError> {
        Ok(self.store.read_externals(game, names).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAtomStore, RegistryRow};
    use crate::trigger::NullRebuildTrigger;
    use uuid::Uuid;

    fn registry_row(name: &str) -> RegistryRow {
        RegistryRow {
            entry: RegistryEntry {
                id: Uuid::new_v4(),
                name: name.to_string(),
                display_name: name.to_uppercase(),
                package_name: format!("npm:{name}"),
                version: "1.0.0".to_string(),
                cdn_url: format!("https://cdn.example/{name}.js"),
                global_name: name.to_uppercase(),
                description: None,
            },
            api_surface: format!("{name} api docs"),
            load_type: "script".to_string(),
            module_imports: None,
        }
    }

    fn service() -> (ExternalService<InMemoryAtomStore>, Arc<InMemoryAtomStore>) {
        let store = Arc::new(InMemoryAtomStore::new());
        store.add_registry_row(registry_row("pixi"));
        store.add_registry_row(registry_row("howler"));
        let service = ExternalService::new(Arc::clone(&store), Arc::new(NullRebuildTrigger));
        (service, store)
    }

    #[tokio::test]
    async fn test_install_lifecycle() {
        let (service, store) = service();
        let game = store.create_game("pong", None).await.unwrap();

        let installed = service.install(game.id, "pixi").await.unwrap();
        assert_eq!(installed.name, "pixi");
        assert_eq!(installed.load_type, "script");

        // Duplicate install rejected.
        let err = service.install(game.id, "pixi").await.unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));

        // Unknown registry name.
        let err = service.install(game.id, "three").await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));

        let listed = service.installed(game.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_uninstall_lifecycle() {
        let (service, store) = service();
        let game = store.create_game("pong", None).await.unwrap();
        service.install(game.id, "pixi").await.unwrap();

        service.uninstall(game.id, "pixi").await.unwrap();
        assert!(service.installed(game.id).await.unwrap().is_empty());

        // Not installed anymore.
        let err = service.uninstall(game.id, "pixi").await.unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));
    }

    #[tokio::test]
    async fn test_read_includes_api_surface() {
        let (service, store) = service();
        let game = store.create_game("pong", None).await.unwrap();
        service.install(game.id, "pixi").await.unwrap();
        service.install(game.id, "howler").await.unwrap();

        let details = service.read(game.id, &["pixi".to_string()]).await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].api_surface, "pixi api docs");
    }
}
