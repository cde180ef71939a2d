//! Plugin definition and builder.
//!
//! A [`Plugin`] is an immutable bundle of modules, config declarations and
//! exported types, tagged with an identity and a [`Tier`]. Plugins are built
//! once with [`PluginBuilder`] and handed to the composite builder.
//!
//! ```rust,ignore
//! pub fn plugin() -> CompositeResult<Plugin> {
//!     Plugin::builder("storage", "Storage", Tier::Core)
//!         .metadata(plugin_metadata!())
//!         .module(SqliteModule::default())
//!         .settings::<StorageConfig>()
//!         .export::<JsonCodec>(|t| t.implements::<dyn Codec>(|| Arc::new(JsonCodec)))
//!         .build()
//! }
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::ConfigEntry;
use crate::error::{CompositeError, CompositeResult, ErrorCode};
use crate::module::Module;
use crate::tier::Tier;
use crate::types::{ExportedType, TypeExport};

// =============================================================================
// PluginId / PluginMetadata
// =============================================================================

/// Unique plugin identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(String);

impl PluginId {
    /// Creates an identity. Emptiness is checked by the validator, not here.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for an empty or whitespace-only identity.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PluginId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Descriptive metadata of the crate that defines a plugin.
///
/// | Field | Filled by [`plugin_metadata!`] from |
/// |-------|------------------------------------|
/// | `assembly` | `CARGO_PKG_NAME` |
/// | `version` | `CARGO_PKG_VERSION` |
/// | `description` | `CARGO_PKG_DESCRIPTION` |
///
/// [`plugin_metadata!`]: crate::plugin_metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Name of the defining crate.
    pub assembly: String,
    /// Semver version string.
    pub version: String,
    /// One-line description.
    pub description: String,
}

impl PluginMetadata {
    /// Creates metadata with an empty description.
    pub fn new(assembly: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            version: version.into(),
            description: String::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Builds [`PluginMetadata`] from the calling crate's Cargo environment.
#[macro_export]
macro_rules! plugin_metadata {
    () => {
        $crate::PluginMetadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            .with_description(env!("CARGO_PKG_DESCRIPTION"))
    };
}

// =============================================================================
// Plugin
// =============================================================================

/// A module registered on a plugin.
#[derive(Clone)]
pub struct ModuleEntry {
    module: Arc<dyn Module>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ModuleEntry {
    /// The module instance.
    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    /// `TypeId` of the concrete module type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified module type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Display name reported by the module.
    pub fn name(&self) -> &'static str {
        self.module.name()
    }
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// An immutable plugin: identity, tier, metadata, modules, configs, types.
pub struct Plugin {
    id: PluginId,
    name: String,
    tier: Tier,
    metadata: PluginMetadata,
    modules: Vec<ModuleEntry>,
    configs: Vec<ConfigEntry>,
    types: Vec<Arc<ExportedType>>,
}

impl Plugin {
    /// Starts building a plugin.
    pub fn builder(id: impl Into<PluginId>, name: impl Into<String>, tier: Tier) -> PluginBuilder {
        PluginBuilder {
            id: id.into(),
            name: name.into(),
            tier,
            metadata: None,
            modules: Vec::new(),
            configs: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Modules in registration order.
    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    /// Config declarations in registration order.
    pub fn configs(&self) -> &[ConfigEntry] {
        &self.configs
    }

    /// Exported types in registration order.
    pub fn types(&self) -> &[Arc<ExportedType>] {
        &self.types
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("version", &self.metadata.version)
            .field("modules", &self.modules.len())
            .field("configs", &self.configs.len())
            .field("types", &self.types.len())
            .finish()
    }
}

// =============================================================================
// PluginBuilder
// =============================================================================

/// Builder for [`Plugin`].
pub struct PluginBuilder {
    id: PluginId,
    name: String,
    tier: Tier,
    metadata: Option<PluginMetadata>,
    modules: Vec<ModuleEntry>,
    configs: Vec<ConfigEntry>,
    types: Vec<Arc<ExportedType>>,
}

impl PluginBuilder {
    /// Sets the plugin metadata. Defaults to this crate's name and version
    /// when not set; use [`plugin_metadata!`](crate::plugin_metadata) to
    /// capture the defining crate instead.
    pub fn metadata(mut self, metadata: PluginMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Adds a module. Each concrete module type may be added once.
    pub fn module<M: Module>(mut self, module: M) -> Self {
        self.modules.push(ModuleEntry {
            module: Arc::new(module),
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
        });
        self
    }

    /// Adds a literal config object.
    pub fn config<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.configs.push(ConfigEntry::value(value));
        self
    }

    /// Declares a config object deserialized from this plugin's settings
    /// section, or `T::default()` when the section is absent.
    pub fn settings<T>(mut self) -> Self
    where
        T: DeserializeOwned + Default + Send + Sync + 'static,
    {
        self.configs.push(ConfigEntry::section::<T>());
        self
    }

    /// Exports a concrete type for known-type discovery.
    pub fn export<T: 'static>(mut self, describe: impl FnOnce(TypeExport) -> TypeExport) -> Self {
        self.types
            .push(Arc::new(describe(TypeExport::new::<T>(false)).finish()));
        self
    }

    /// Exports an abstract type. It is visible to scanning but never
    /// instantiated.
    pub fn export_abstract<T: 'static>(
        mut self,
        describe: impl FnOnce(TypeExport) -> TypeExport,
    ) -> Self {
        self.types
            .push(Arc::new(describe(TypeExport::new::<T>(true)).finish()));
        self
    }

    /// Finishes the plugin.
    ///
    /// Fails with `duplicate-module` when a module type was added twice,
    /// `duplicate-export` when a type was exported twice and
    /// `duplicate-config` when a config type was declared twice.
    pub fn build(self) -> CompositeResult<Plugin> {
        for (i, entry) in self.modules.iter().enumerate() {
            if self.modules[..i].iter().any(|m| m.type_id == entry.type_id) {
                return Err(CompositeError::validation(
                    ErrorCode::DuplicateModule,
                    format!(
                        "module '{}' was added twice to plugin '{}'",
                        entry.type_name, self.id
                    ),
                    vec![self.id.to_string(), entry.type_name.to_string()],
                ));
            }
        }
        for (i, ty) in self.types.iter().enumerate() {
            if self.types[..i].iter().any(|t| t.type_id() == ty.type_id()) {
                return Err(CompositeError::validation(
                    ErrorCode::DuplicateExport,
                    format!("type '{}' was exported twice by plugin '{}'", ty.name(), self.id),
                    vec![self.id.to_string(), ty.name().to_string()],
                ));
            }
        }
        for (i, entry) in self.configs.iter().enumerate() {
            if self.configs[..i]
                .iter()
                .any(|c| c.type_id() == entry.type_id())
            {
                return Err(CompositeError::configuration(
                    ErrorCode::DuplicateConfig,
                    format!(
                        "config '{}' was declared twice by plugin '{}'",
                        entry.type_name(),
                        self.id
                    ),
                )
                .with_details(vec![self.id.to_string(), entry.type_name().to_string()]));
            }
        }

        let metadata = self.metadata.unwrap_or_else(|| {
            PluginMetadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        });
        Ok(Plugin {
            id: self.id,
            name: self.name,
            tier: self.tier,
            metadata,
            modules: self.modules,
            configs: self.configs,
            types: self.types,
        })
    }
}
