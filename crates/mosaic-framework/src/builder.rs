//! Composite assembly.
//!
//! [`CompositeBuilder::compose`] turns a set of plugins into a [`Composite`]:
//!
//! ```text
//! validate ─► categorize ─► resolve services ─► compose known types
//!          ─► initialize all ─► configure all ─► register services ─► build container
//! ```
//!
//! Any failure aborts composition. The builder is consumed either way.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_core::{
    CatalogTypeResolver, CompositeError, CompositeResult, ErrorCode, ModuleState, Plugin,
    ServiceRegistry, Tier, TypeCatalog, TypeResolver,
};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::composite::Composite;
use crate::phase::PhaseBarrier;
use crate::plugin_set::{ModuleRecord, PluginSet};
use crate::resolution::{ProvidedService, collect_exports, resolve_services};
use crate::validator::CompositeValidator;

/// Builder for [`Composite`].
pub struct CompositeBuilder {
    plugins: Vec<Plugin>,
    resolver: Box<dyn TypeResolver>,
    settings: HashMap<String, Value>,
    claim_current: bool,
}

impl Default for CompositeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeBuilder {
    /// Creates a builder using [`CatalogTypeResolver`].
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            resolver: Box::new(CatalogTypeResolver::new()),
            settings: HashMap::new(),
            claim_current: false,
        }
    }

    /// Adds a plugin. Registration order is kept within each tier.
    pub fn register_plugin(mut self, plugin: Plugin) -> Self {
        debug!(plugin = %plugin.id(), tier = %plugin.tier(), "Plugin registered");
        self.plugins.push(plugin);
        self
    }

    /// Adds several plugins.
    pub fn register_plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        for plugin in plugins {
            self = self.register_plugin(plugin);
        }
        self
    }

    /// Replaces the type resolver.
    pub fn resolver(mut self, resolver: impl TypeResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Sets the settings sections, keyed by plugin identity.
    pub fn plugin_settings(mut self, settings: HashMap<String, Value>) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the settings section of one plugin.
    pub fn plugin_section(mut self, plugin: impl Into<String>, section: Value) -> Self {
        self.settings.insert(plugin.into(), section);
        self
    }

    /// Registers the composite in the process-wide current slot while it is
    /// started.
    pub fn claim_current(mut self, claim: bool) -> Self {
        self.claim_current = claim;
        self
    }

    /// Validates, wires and configures every plugin, then builds the
    /// service container.
    pub fn compose(self) -> CompositeResult<Composite> {
        let span = tracing::info_span!("compose", plugins = self.plugins.len());
        let _entered = span.enter();

        let result = self.assemble();
        if let Err(e) = &result {
            error!(code = %e.code(), error = %e, "Composition failed");
        }
        result
    }

    fn assemble(self) -> CompositeResult<Composite> {
        let Self {
            plugins,
            resolver,
            settings,
            claim_current,
        } = self;

        CompositeValidator::new().validate(&plugins, resolver.as_ref())?;

        let set = PluginSet::categorize(plugins);
        let configs = Arc::new(set.materialize_configs(&settings)?);
        let records = set.module_records(&configs);

        let provided = collect_exports(&records);
        resolve_services(&records, &provided)?;

        let catalogs = Catalogs::new(&set);
        for record in &records {
            let _entered = record.ctx.span().enter();
            resolver.compose_known_types(record.module.as_ref(), catalogs.get(record.tier))?;
        }

        let configured = PhaseBarrier::new(&records).initialize_all()?.configure_all()?;
        debug!(modules = configured.len(), "Modules initialized and configured");

        let mut registry = ServiceRegistry::new();
        register_services(&records, &catalogs, &mut registry)?;
        register_exports(&provided, &mut registry);
        for (type_id, type_name, value) in configs.unique() {
            registry.add_erased(type_id, type_name, Arc::clone(value));
        }

        info!(
            plugins = set.all().len(),
            modules = records.len(),
            services = registry.len(),
            "Composite assembled"
        );
        Ok(Composite::assemble(
            set.into_plugins(),
            records,
            configs,
            registry,
            claim_current,
        ))
    }
}

impl std::fmt::Debug for CompositeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBuilder")
            .field("plugins", &self.plugins)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .field("claim_current", &self.claim_current)
            .finish_non_exhaustive()
    }
}

/// Known-type candidate sets, one per tier.
struct Catalogs {
    core: TypeCatalog,
    app: TypeCatalog,
    host: TypeCatalog,
}

impl Catalogs {
    fn new(set: &PluginSet) -> Self {
        Self {
            core: set.catalog_for(Tier::Core),
            app: set.catalog_for(Tier::App),
            host: set.catalog_for(Tier::Host),
        }
    }

    fn get(&self, tier: Tier) -> &TypeCatalog {
        match tier {
            Tier::Core => &self.core,
            Tier::App => &self.app,
            Tier::Host => &self.host,
        }
    }
}

/// Runs the default, scan and explicit registration hooks of every module,
/// Core → App → Host.
fn register_services(
    records: &[ModuleRecord],
    catalogs: &Catalogs,
    registry: &mut ServiceRegistry,
) -> CompositeResult<()> {
    for record in records {
        let _entered = record.ctx.span().enter();
        let ctx = record.ctx.as_ref();
        let result = record
            .module
            .register_default_services(ctx, registry)
            .and_then(|()| {
                record
                    .module
                    .scan_for_services(ctx, catalogs.get(record.tier), registry)
            })
            .and_then(|()| record.module.register_services(ctx, registry));
        if let Err(e) = result {
            let _ = ctx.advance(ModuleState::Faulted);
            return Err(CompositeError::composition(
                ErrorCode::ServiceRegistrationFailed,
                format!(
                    "module '{}' of plugin '{}' failed to register services",
                    record.name, record.plugin
                ),
            )
            .with_details(vec![record.plugin.to_string(), record.name.to_string()])
            .with_source(e));
        }
        ctx.advance(ModuleState::ServicesRegistered)?;
    }
    Ok(())
}

/// Publishes every exposed module contract as a singleton.
fn register_exports(provided: &[ProvidedService], registry: &mut ServiceRegistry) {
    for service in provided {
        registry.add_erased(
            service.export.contract,
            service.export.contract_name,
            Arc::clone(&service.export.value),
        );
    }
}
