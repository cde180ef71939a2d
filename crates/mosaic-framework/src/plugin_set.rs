//! Categorized plugin set and per-module records.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_core::{
    CompositeResult, ConfigStore, Module, ModuleContext, Plugin, PluginId, Tier, TypeCatalog,
};
use serde_json::Value;
use tracing::debug;

/// One module of the composite together with its context.
#[derive(Clone)]
pub struct ModuleRecord {
    /// Owning plugin.
    pub plugin: PluginId,
    /// Owning plugin's tier.
    pub tier: Tier,
    /// Display name.
    pub name: &'static str,
    /// The module instance.
    pub module: Arc<dyn Module>,
    /// Context handed to every hook.
    pub ctx: Arc<ModuleContext>,
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("plugin", &self.plugin)
            .field("tier", &self.tier)
            .field("name", &self.name)
            .field("state", &self.ctx.state())
            .finish()
    }
}

/// Plugins partitioned by tier, in registration order within each tier.
#[derive(Debug)]
pub struct PluginSet {
    all: Vec<Plugin>,
    core: Vec<usize>,
    app: Vec<usize>,
    host: Vec<usize>,
}

impl PluginSet {
    /// Partitions `plugins` by tier.
    pub fn categorize(plugins: Vec<Plugin>) -> Self {
        let mut set = Self {
            all: plugins,
            core: Vec::new(),
            app: Vec::new(),
            host: Vec::new(),
        };
        for (index, plugin) in set.all.iter().enumerate() {
            match plugin.tier() {
                Tier::Core => set.core.push(index),
                Tier::App => set.app.push(index),
                Tier::Host => set.host.push(index),
            }
        }
        debug!(
            core = set.core.len(),
            app = set.app.len(),
            host = set.host.len(),
            "Plugins categorized"
        );
        set
    }

    /// Every plugin, in registration order.
    pub fn all(&self) -> &[Plugin] {
        &self.all
    }

    /// Plugins of `tier`, in registration order.
    pub fn tier(&self, tier: Tier) -> impl Iterator<Item = &Plugin> {
        let indices = match tier {
            Tier::Core => &self.core,
            Tier::App => &self.app,
            Tier::Host => &self.host,
        };
        indices.iter().map(move |&i| &self.all[i])
    }

    pub fn core(&self) -> impl Iterator<Item = &Plugin> {
        self.tier(Tier::Core)
    }

    pub fn app(&self) -> impl Iterator<Item = &Plugin> {
        self.tier(Tier::App)
    }

    /// The host plugin. Validation guarantees exactly one.
    pub fn host(&self) -> Option<&Plugin> {
        self.host.first().map(|&i| &self.all[i])
    }

    /// Every plugin, Core first, then App, then Host.
    pub fn ordered(&self) -> impl Iterator<Item = &Plugin> {
        Tier::START_ORDER.into_iter().flat_map(move |tier| self.tier(tier))
    }

    /// Looks up a plugin by identity.
    pub fn get(&self, id: &str) -> Option<&Plugin> {
        self.all.iter().find(|p| p.id().as_str() == id)
    }

    /// Exported types a module of `tier` may discover.
    pub fn catalog_for(&self, tier: Tier) -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        for plugin in self.ordered().filter(|p| tier.can_discover(p.tier())) {
            catalog.extend_from(plugin.id(), plugin.tier(), plugin.types());
        }
        catalog
    }

    /// Materializes every config declaration, reading `settings` sections
    /// keyed by plugin identity.
    pub fn materialize_configs(&self, settings: &HashMap<String, Value>) -> CompositeResult<ConfigStore> {
        let mut store = ConfigStore::new();
        for plugin in &self.all {
            let section = settings.get(plugin.id().as_str());
            for entry in plugin.configs() {
                let value = entry.materialize(plugin.id(), section)?;
                store.insert(plugin.id().clone(), entry.type_id(), entry.type_name(), value);
            }
        }
        Ok(store)
    }

    /// Builds one record per module, Core → App → Host.
    pub fn module_records(&self, configs: &Arc<ConfigStore>) -> Vec<ModuleRecord> {
        self.ordered()
            .flat_map(|plugin| {
                plugin.modules().iter().map(move |entry| ModuleRecord {
                    plugin: plugin.id().clone(),
                    tier: plugin.tier(),
                    name: entry.name(),
                    module: Arc::clone(entry.module()),
                    ctx: Arc::new(ModuleContext::new(
                        plugin.id().clone(),
                        plugin.name(),
                        plugin.tier(),
                        entry.name(),
                        Arc::clone(configs),
                    )),
                })
            })
            .collect()
    }

    pub(crate) fn into_plugins(self) -> Vec<Plugin> {
        self.all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::KnownType;

    trait Theme: Send + Sync {}
    impl KnownType for dyn Theme {}
    struct Dark;
    impl Theme for Dark {}
    struct Light;
    impl Theme for Light {}
    struct Neon;
    impl Theme for Neon {}

    fn set() -> PluginSet {
        PluginSet::categorize(vec![
            Plugin::builder("host", "Host", Tier::Host)
                .export::<Neon>(|t| t.implements::<dyn Theme, _>(|| Arc::new(Neon)))
                .build()
                .unwrap(),
            Plugin::builder("app", "App", Tier::App)
                .export::<Light>(|t| t.implements::<dyn Theme, _>(|| Arc::new(Light)))
                .build()
                .unwrap(),
            Plugin::builder("core", "Core", Tier::Core)
                .export::<Dark>(|t| t.implements::<dyn Theme, _>(|| Arc::new(Dark)))
                .build()
                .unwrap(),
        ])
    }

    #[test]
    fn test_categorize_orders_by_tier() {
        let set = set();
        let ordered: Vec<_> = set.ordered().map(|p| p.id().as_str()).collect();
        assert_eq!(ordered, ["core", "app", "host"]);
        assert_eq!(set.host().map(|p| p.id().as_str()), Some("host"));
        assert_eq!(set.all()[0].id().as_str(), "host");
        assert_eq!(set.core().count(), 1);
        assert_eq!(set.app().count(), 1);
    }

    #[test]
    fn test_catalog_follows_discovery_visibility() {
        let set = set();
        assert_eq!(set.catalog_for(Tier::Core).len(), 3);

        let app = set.catalog_for(Tier::App);
        assert_eq!(app.len(), 2);
        assert!(app.contains::<Light>() && app.contains::<Neon>());

        let host = set.catalog_for(Tier::Host);
        assert_eq!(host.len(), 1);
        assert!(host.contains::<Neon>());
    }
}
