//! Exported types, contract markers and the type catalog.
//!
//! Plugins contribute types to the composition explicitly instead of through
//! runtime reflection. Each exported type lists the known-type contracts it
//! is assignable to and, for concrete types, a zero-argument factory per
//! contract:
//!
//! ```rust,ignore
//! pub trait Widget: Send + Sync { fn label(&self) -> &str; }
//! impl KnownType for dyn Widget {}
//!
//! Plugin::builder("widgets", "Widgets", Tier::Core)
//!     .export::<Button>(|t| t.implements::<dyn Widget>(|| Arc::new(Button)))
//!     .export_abstract::<BaseWidget>(|t| t.extends::<dyn Widget>())
//!     .build()?;
//! ```
//!
//! A [`TypeCatalog`] is the read-only view of the exported types visible to a
//! tier. It is the search space for known-type composition and is handed to
//! `Module::scan_for_services`.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BoxError, CompositeError, CompositeResult, ErrorCode};
use crate::plugin::PluginId;
use crate::tier::Tier;

// =============================================================================
// Contract markers
// =============================================================================

/// Marks a trait object as a known (pluggable) type.
///
/// Modules declare `KnownTypes<dyn K>` slots; the framework fills them with a
/// fresh instance of every concrete exported type implementing `K`.
///
/// ```rust,ignore
/// pub trait Codec: Send + Sync { fn name(&self) -> &str; }
/// impl KnownType for dyn Codec {}
/// ```
pub trait KnownType: Send + Sync + 'static {}

/// Marks a trait object as a module service contract.
///
/// One module exposes it (see `Module::expose`), others consume it through a
/// `ServiceSlot<dyn C>`. Resolution is singular: exactly one visible
/// implementer must exist.
pub trait ServiceContract: Send + Sync + 'static {}

/// Zero-argument instance factory. The returned value wraps an `Arc<K>`.
pub(crate) type InstanceFactory =
    Arc<dyn Fn() -> Result<Box<dyn Any + Send + Sync>, BoxError> + Send + Sync>;

// =============================================================================
// ExportedType
// =============================================================================

/// Assignability of an exported type to one known-type contract.
pub struct ContractImpl {
    contract: TypeId,
    contract_name: &'static str,
    factory: Option<InstanceFactory>,
}

impl ContractImpl {
    /// `TypeId` of the contract (`dyn K`).
    pub fn contract(&self) -> TypeId {
        self.contract
    }

    /// Contract type name.
    pub fn contract_name(&self) -> &'static str {
        self.contract_name
    }

    /// Returns `true` if a factory was registered for this contract.
    pub fn is_constructible(&self) -> bool {
        self.factory.is_some()
    }
}

/// A type contributed by a plugin.
pub struct ExportedType {
    name: &'static str,
    type_id: TypeId,
    is_abstract: bool,
    contracts: Vec<ContractImpl>,
}

impl ExportedType {
    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `TypeId` of the exported type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` for types exported through `export_abstract`.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Contracts this type is assignable to.
    pub fn contracts(&self) -> &[ContractImpl] {
        &self.contracts
    }

    /// Returns `true` if the type is assignable to `contract`.
    pub fn is_assignable_to(&self, contract: TypeId) -> bool {
        self.contracts.iter().any(|c| c.contract == contract)
    }

    /// Returns `true` if the type can be instantiated as `contract`.
    pub fn is_concrete_for(&self, contract: TypeId) -> bool {
        !self.is_abstract
            && self
                .contracts
                .iter()
                .any(|c| c.contract == contract && c.factory.is_some())
    }

    fn instantiate(&self, contract: TypeId) -> Option<Result<Box<dyn Any + Send + Sync>, BoxError>> {
        if self.is_abstract {
            return None;
        }
        self.contracts
            .iter()
            .filter(|c| c.contract == contract)
            .find_map(|c| c.factory.as_ref())
            .map(|factory| factory())
    }
}

impl fmt::Debug for ExportedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedType")
            .field("name", &self.name)
            .field("is_abstract", &self.is_abstract)
            .field(
                "contracts",
                &self.contracts.iter().map(|c| c.contract_name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder passed to `PluginBuilder::export` / `export_abstract`.
pub struct TypeExport {
    inner: ExportedType,
}

impl TypeExport {
    pub(crate) fn new<T: ?Sized + 'static>(is_abstract: bool) -> Self {
        Self {
            inner: ExportedType {
                name: type_name::<T>(),
                type_id: TypeId::of::<T>(),
                is_abstract,
                contracts: Vec::new(),
            },
        }
    }

    /// Declares the type assignable to `K` with an infallible factory.
    pub fn implements<K, F>(self, factory: F) -> Self
    where
        K: ?Sized + KnownType,
        F: Fn() -> Arc<K> + Send + Sync + 'static,
    {
        self.try_implements::<K, _>(move || Ok(factory()))
    }

    /// Declares the type assignable to `K` with a fallible factory.
    ///
    /// A factory error surfaces as `instantiation-failed` naming this type.
    pub fn try_implements<K, F>(mut self, factory: F) -> Self
    where
        K: ?Sized + KnownType,
        F: Fn() -> Result<Arc<K>, BoxError> + Send + Sync + 'static,
    {
        let erased: InstanceFactory = Arc::new(move || {
            factory().map(|instance| Box::new(instance) as Box<dyn Any + Send + Sync>)
        });
        self.inner.contracts.push(ContractImpl {
            contract: TypeId::of::<K>(),
            contract_name: type_name::<K>(),
            factory: Some(erased),
        });
        self
    }

    /// Declares the type assignable to `K` without a factory. The type is
    /// visible to scanning but never instantiated for `K`.
    pub fn extends<K>(mut self) -> Self
    where
        K: ?Sized + KnownType,
    {
        self.inner.contracts.push(ContractImpl {
            contract: TypeId::of::<K>(),
            contract_name: type_name::<K>(),
            factory: None,
        });
        self
    }

    pub(crate) fn finish(self) -> ExportedType {
        self.inner
    }
}

// =============================================================================
// TypeCatalog
// =============================================================================

/// One entry of a [`TypeCatalog`].
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Plugin that exported the type.
    pub plugin: PluginId,
    /// Tier of that plugin.
    pub tier: Tier,
    /// The exported type.
    pub ty: Arc<ExportedType>,
}

/// Read-only, ordered view over exported types.
///
/// Entry order is plugin registration order, then export order within a
/// plugin, which keeps composition deterministic.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    entries: Vec<CatalogEntry>,
}

impl TypeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every type of `plugin` not already in the catalog.
    ///
    /// A type exported by several plugins keeps the entry of the first one
    /// added, so each concrete type is instantiated at most once.
    pub fn extend_from(&mut self, plugin: &PluginId, tier: Tier, types: &[Arc<ExportedType>]) {
        for ty in types {
            if let Some(existing) = self.entries.iter().find(|e| e.ty.type_id == ty.type_id) {
                debug!(
                    ty = ty.name,
                    plugin = %plugin,
                    kept = %existing.plugin,
                    "Type already exported, skipping"
                );
                continue;
            }
            self.entries.push(CatalogEntry {
                plugin: plugin.clone(),
                tier,
                ty: Arc::clone(ty),
            });
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the catalog holds no types.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates all entries.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    /// Returns `true` if `T` is in the catalog.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.entries.iter().any(|e| e.ty.type_id == TypeId::of::<T>())
    }

    /// Entries assignable to `K`, abstract ones included.
    pub fn assignable_to<K: ?Sized + KnownType>(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.ty.is_assignable_to(TypeId::of::<K>()))
    }

    /// Entries that can be instantiated as `K`.
    pub fn concrete_for<K: ?Sized + KnownType>(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.ty.is_concrete_for(TypeId::of::<K>()))
    }

    /// Instantiates one fresh value per concrete type assignable to
    /// `contract`. Each returned box wraps an `Arc<K>`.
    pub fn instantiate_erased(
        &self,
        contract: TypeId,
        contract_name: &'static str,
    ) -> CompositeResult<Vec<Box<dyn Any + Send + Sync>>> {
        let mut instances = Vec::new();
        for entry in &self.entries {
            let Some(result) = entry.ty.instantiate(contract) else {
                continue;
            };
            let instance = result.map_err(|e| {
                CompositeError::composition(
                    ErrorCode::InstantiationFailed,
                    format!(
                        "failed to instantiate '{}' as '{contract_name}'",
                        entry.ty.name
                    ),
                )
                .with_details(vec![entry.ty.name.to_string(), entry.plugin.to_string()])
                .with_source(e)
            })?;
            instances.push(instance);
        }
        Ok(instances)
    }

    /// Typed variant of [`instantiate_erased`](Self::instantiate_erased).
    pub fn instantiate_all<K: ?Sized + KnownType>(&self) -> CompositeResult<Vec<Arc<K>>> {
        Ok(self
            .instantiate_erased(TypeId::of::<K>(), type_name::<K>())?
            .into_iter()
            .filter_map(|boxed| boxed.downcast::<Arc<K>>().ok().map(|arc| *arc))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Widget: Send + Sync {
        fn label(&self) -> &'static str;
    }
    impl KnownType for dyn Widget {}

    trait Gadget: Send + Sync {}
    impl KnownType for dyn Gadget {}

    struct Button;
    impl Widget for Button {
        fn label(&self) -> &'static str {
            "button"
        }
    }

    struct Slider;
    impl Widget for Slider {
        fn label(&self) -> &'static str {
            "slider"
        }
    }

    struct BaseWidget;

    fn catalog() -> TypeCatalog {
        let types = vec![
            Arc::new(
                TypeExport::new::<Button>(false)
                    .implements::<dyn Widget, _>(|| Arc::new(Button))
                    .finish(),
            ),
            Arc::new(TypeExport::new::<BaseWidget>(true).extends::<dyn Widget>().finish()),
            Arc::new(
                TypeExport::new::<Slider>(false)
                    .implements::<dyn Widget, _>(|| Arc::new(Slider))
                    .finish(),
            ),
        ];
        let mut catalog = TypeCatalog::new();
        catalog.extend_from(&PluginId::new("ui"), Tier::Core, &types);
        catalog
    }

    #[test]
    fn test_instantiates_every_concrete_type_in_order() {
        let widgets = catalog().instantiate_all::<dyn Widget>().unwrap();
        let labels: Vec<_> = widgets.iter().map(|w| w.label()).collect();
        assert_eq!(labels, ["button", "slider"]);
    }

    #[test]
    fn test_abstract_types_are_assignable_but_not_instantiated() {
        let catalog = catalog();
        assert_eq!(catalog.assignable_to::<dyn Widget>().count(), 3);
        assert_eq!(catalog.concrete_for::<dyn Widget>().count(), 2);
        assert!(catalog.contains::<BaseWidget>());
    }

    #[test]
    fn test_no_match_yields_empty_collection() {
        let gadgets = catalog().instantiate_all::<dyn Gadget>().unwrap();
        assert!(gadgets.is_empty());
    }

    #[test]
    fn test_factory_failure_names_the_type() {
        let types = vec![Arc::new(
            TypeExport::new::<Button>(false)
                .try_implements::<dyn Widget, _>(|| Err("out of pixels".into()))
                .finish(),
        )];
        let mut catalog = TypeCatalog::new();
        catalog.extend_from(&PluginId::new("ui"), Tier::App, &types);

        let err = catalog.instantiate_all::<dyn Widget>().err().unwrap();
        assert_eq!(err.code(), ErrorCode::InstantiationFailed);
        assert!(err.details()[0].contains("Button"));
    }

    #[test]
    fn test_factory_after_marker_is_used() {
        let ty = TypeExport::new::<Button>(false)
            .extends::<dyn Widget>()
            .implements::<dyn Widget, _>(|| Arc::new(Button))
            .finish();
        assert!(ty.is_concrete_for(TypeId::of::<dyn Widget>()));

        let mut catalog = TypeCatalog::new();
        catalog.extend_from(&PluginId::new("ui"), Tier::Core, &[Arc::new(ty)]);
        let widgets = catalog.instantiate_all::<dyn Widget>().unwrap();
        assert_eq!(widgets.len(), 1);
    }

    #[test]
    fn test_type_exported_by_two_plugins_is_kept_once() {
        let button = || {
            Arc::new(
                TypeExport::new::<Button>(false)
                    .implements::<dyn Widget, _>(|| Arc::new(Button))
                    .finish(),
            )
        };
        let mut catalog = TypeCatalog::new();
        catalog.extend_from(&PluginId::new("a"), Tier::Core, &[button()]);
        catalog.extend_from(&PluginId::new("b"), Tier::App, &[button()]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.iter().next().map(|e| e.plugin.as_str()), Some("a"));
        let labels: Vec<_> = catalog
            .instantiate_all::<dyn Widget>()
            .unwrap()
            .iter()
            .map(|w| w.label())
            .collect();
        assert_eq!(labels, ["button"]);
    }
}
