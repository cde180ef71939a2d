//! Plugin description and known-type composition.
//!
//! [`TypeResolver`] is the seam between the composition engine and the way
//! exported types are discovered. [`CatalogTypeResolver`] reads the explicit
//! factory registry built by `PluginBuilder::export`.

use tracing::debug;

use crate::error::CompositeResult;
use crate::module::Module;
use crate::plugin::Plugin;
use crate::slots::Slots;
use crate::types::TypeCatalog;

/// Static description of a plugin's defining crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescription {
    /// Crate name.
    pub assembly: String,
    /// Crate version.
    pub version: String,
    /// Concrete exported type names, in export order.
    pub types: Vec<&'static str>,
}

/// Discovers plugin types and fills known-type slots.
pub trait TypeResolver: Send + Sync {
    /// Describes `plugin`. Deterministic and idempotent.
    fn describe_plugin(&self, plugin: &Plugin) -> PluginDescription;

    /// Fills every `KnownTypes<K>` slot declared by `module` with one fresh
    /// instance of each concrete type in `candidates` implementing `K`.
    ///
    /// A slot with no match receives an empty collection. Factory failures
    /// surface as `instantiation-failed` naming the type.
    fn compose_known_types(&self, module: &dyn Module, candidates: &TypeCatalog) -> CompositeResult<()>;
}

/// Default [`TypeResolver`] backed by the plugins' exported type registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogTypeResolver;

impl CatalogTypeResolver {
    pub fn new() -> Self {
        Self
    }
}

impl TypeResolver for CatalogTypeResolver {
    fn describe_plugin(&self, plugin: &Plugin) -> PluginDescription {
        PluginDescription {
            assembly: plugin.metadata().assembly.clone(),
            version: plugin.metadata().version.clone(),
            types: plugin
                .types()
                .iter()
                .filter(|t| !t.is_abstract())
                .map(|t| t.name())
                .collect(),
        }
    }

    fn compose_known_types(&self, module: &dyn Module, candidates: &TypeCatalog) -> CompositeResult<()> {
        let mut slots = Slots::new();
        module.declare(&mut slots);
        for slot in slots.known() {
            let instances = candidates.instantiate_erased(slot.element(), slot.element_name())?;
            debug!(
                module = module.name(),
                known_type = slot.element_name(),
                count = instances.len(),
                "Known types composed"
            );
            slot.assign(instances)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorCode;
    use crate::plugin::PluginMetadata;
    use crate::slots::KnownTypes;
    use crate::tier::Tier;
    use crate::types::KnownType;

    trait Widget: Send + Sync {
        fn id(&self) -> u32;
    }
    impl KnownType for dyn Widget {}

    struct One;
    impl Widget for One {
        fn id(&self) -> u32 {
            1
        }
    }
    struct Two;
    impl Widget for Two {
        fn id(&self) -> u32 {
            2
        }
    }
    struct Base;

    #[derive(Default)]
    struct Gallery {
        widgets: KnownTypes<dyn Widget>,
    }

    impl Module for Gallery {
        fn declare<'a>(&'a self, slots: &mut Slots<'a>) {
            slots.known_types(&self.widgets);
        }
    }

    fn widgets_plugin() -> Plugin {
        Plugin::builder("widgets", "Widgets", Tier::App)
            .metadata(PluginMetadata::new("widgets", "0.3.0"))
            .export::<One>(|t| t.implements::<dyn Widget, _>(|| Arc::new(One)))
            .export_abstract::<Base>(|t| t.extends::<dyn Widget>())
            .export::<Two>(|t| t.implements::<dyn Widget, _>(|| Arc::new(Two)))
            .build()
            .unwrap()
    }

    fn catalog_of(plugin: &Plugin) -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.extend_from(plugin.id(), plugin.tier(), plugin.types());
        catalog
    }

    #[test]
    fn test_describe_is_deterministic() {
        let resolver = CatalogTypeResolver::new();
        let plugin = widgets_plugin();
        let first = resolver.describe_plugin(&plugin);
        assert_eq!(first, resolver.describe_plugin(&plugin));
        assert_eq!(first.version, "0.3.0");
        assert_eq!(first.types.len(), 2);
    }

    #[test]
    fn test_every_concrete_implementation_is_injected() {
        let plugin = widgets_plugin();
        let gallery = Gallery::default();
        CatalogTypeResolver
            .compose_known_types(&gallery, &catalog_of(&plugin))
            .unwrap();
        let ids: Vec<_> = gallery.widgets.iter().map(|w| w.id()).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn test_no_candidates_gives_empty_collection() {
        let gallery = Gallery::default();
        CatalogTypeResolver
            .compose_known_types(&gallery, &TypeCatalog::new())
            .unwrap();
        assert!(gallery.widgets.is_composed());
        assert!(gallery.widgets.is_empty());
    }

    #[test]
    fn test_composing_twice_is_rejected() {
        let gallery = Gallery::default();
        CatalogTypeResolver
            .compose_known_types(&gallery, &TypeCatalog::new())
            .unwrap();
        let err = CatalogTypeResolver
            .compose_known_types(&gallery, &TypeCatalog::new())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SlotAlreadyAssigned);
    }
}
