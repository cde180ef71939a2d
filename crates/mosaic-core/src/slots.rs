//! Injection slots declared by modules.
//!
//! A module keeps its dependencies in plain fields and lists them once in
//! `Module::declare`. The composition engine fills every declared slot
//! before any `initialize` hook runs; after that the slots are read-only.
//!
//! ```rust,ignore
//! struct ReportModule {
//!     repo: ServiceSlot<dyn Repository>,
//!     renderers: KnownTypes<dyn Renderer>,
//! }
//!
//! impl Module for ReportModule {
//!     fn declare<'a>(&'a self, slots: &mut Slots<'a>) {
//!         slots.service(&self.repo).known_types(&self.renderers);
//!     }
//! }
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::container::ServiceArc;
use crate::error::{CompositeError, CompositeResult, ErrorCode};
use crate::types::{KnownType, ServiceContract};

fn already_assigned(slot: &str) -> CompositeError {
    CompositeError::composition(
        ErrorCode::SlotAlreadyAssigned,
        format!("slot '{slot}' was already assigned"),
    )
    .with_details(vec![slot.to_string()])
}

fn type_mismatch(slot: &str) -> CompositeError {
    CompositeError::composition(
        ErrorCode::InstantiationFailed,
        format!("value offered to slot '{slot}' has the wrong type"),
    )
    .with_details(vec![slot.to_string()])
}

// =============================================================================
// ServiceSlot
// =============================================================================

/// A single-module service dependency, assigned once during composition.
pub struct ServiceSlot<T: ?Sized> {
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized> ServiceSlot<T> {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Returns the resolved service, if composition assigned one.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    /// Returns `true` once the slot is assigned.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: ?Sized + 'static> ServiceSlot<T> {
    /// Returns the resolved service or a `service-not-found` error.
    ///
    /// Convenient inside hooks: `let repo = self.repo.resolved()?;`
    pub fn resolved(&self) -> CompositeResult<&Arc<T>> {
        self.cell.get().ok_or_else(|| {
            CompositeError::composition(
                ErrorCode::ServiceNotFound,
                format!("service slot '{}' is not resolved", type_name::<T>()),
            )
        })
    }
}

impl<T: ?Sized> Default for ServiceSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ServiceSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSlot")
            .field("contract", &type_name::<T>())
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

/// Object-safe view of a [`ServiceSlot`] used by the resolution engine.
pub trait ErasedServiceSlot: Send + Sync {
    /// `TypeId` of the contract the slot expects.
    fn contract(&self) -> TypeId;
    /// Contract type name.
    fn contract_name(&self) -> &'static str;
    /// Returns `true` once assigned.
    fn is_assigned(&self) -> bool;
    /// Assigns the slot from an erased `Arc<T>`.
    fn assign(&self, value: &ServiceArc) -> CompositeResult<()>;
}

impl<T: ?Sized + ServiceContract> ErasedServiceSlot for ServiceSlot<T> {
    fn contract(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn contract_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn is_assigned(&self) -> bool {
        self.is_resolved()
    }

    fn assign(&self, value: &ServiceArc) -> CompositeResult<()> {
        let service = value
            .downcast_ref::<Arc<T>>()
            .ok_or_else(|| type_mismatch(type_name::<T>()))?;
        self.cell
            .set(Arc::clone(service))
            .map_err(|_| already_assigned(type_name::<T>()))
    }
}

// =============================================================================
// KnownTypes
// =============================================================================

/// A collection of fresh instances of every visible concrete implementation
/// of the known type `K`. Assigned once; empty when nothing matches.
pub struct KnownTypes<K: ?Sized> {
    cell: OnceLock<Vec<Arc<K>>>,
}

impl<K: ?Sized> KnownTypes<K> {
    /// Creates an unassigned collection slot.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Returns the composed instances, or `None` before composition.
    pub fn get(&self) -> Option<&[Arc<K>]> {
        self.cell.get().map(Vec::as_slice)
    }

    /// Number of composed instances (zero before composition).
    pub fn len(&self) -> usize {
        self.get().map_or(0, <[_]>::len)
    }

    /// Returns `true` if no instances were composed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the composed instances.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<K>> {
        self.get().unwrap_or(&[]).iter()
    }

    /// Returns `true` once composition assigned the collection.
    pub fn is_composed(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<K: ?Sized> Default for KnownTypes<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized> fmt::Debug for KnownTypes<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownTypes")
            .field("element", &type_name::<K>())
            .field("len", &self.len())
            .finish()
    }
}

/// Object-safe view of a [`KnownTypes`] slot used by the type resolver.
pub trait ErasedKnownSlot: Send + Sync {
    /// `TypeId` of the element contract.
    fn element(&self) -> TypeId;
    /// Element contract type name.
    fn element_name(&self) -> &'static str;
    /// Assigns the collection. Every box must wrap an `Arc<K>`.
    fn assign(&self, instances: Vec<Box<dyn Any + Send + Sync>>) -> CompositeResult<()>;
}

impl<K: ?Sized + KnownType> ErasedKnownSlot for KnownTypes<K> {
    fn element(&self) -> TypeId {
        TypeId::of::<K>()
    }

    fn element_name(&self) -> &'static str {
        type_name::<K>()
    }

    fn assign(&self, instances: Vec<Box<dyn Any + Send + Sync>>) -> CompositeResult<()> {
        if self.is_composed() {
            return Err(already_assigned(type_name::<K>()));
        }
        let typed = instances
            .into_iter()
            .map(|boxed| {
                boxed
                    .downcast::<Arc<K>>()
                    .map(|arc| *arc)
                    .map_err(|_| type_mismatch(type_name::<K>()))
            })
            .collect::<CompositeResult<Vec<_>>>()?;
        self.cell
            .set(typed)
            .map_err(|_| already_assigned(type_name::<K>()))
    }
}

// =============================================================================
// Slots / Exports
// =============================================================================

/// Declaration sink passed to `Module::declare`.
#[derive(Default)]
pub struct Slots<'a> {
    services: Vec<&'a dyn ErasedServiceSlot>,
    known: Vec<&'a dyn ErasedKnownSlot>,
}

impl<'a> Slots<'a> {
    /// Creates an empty declaration sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a service dependency on exactly one module implementing `T`.
    pub fn service<T>(&mut self, slot: &'a ServiceSlot<T>) -> &mut Self
    where
        T: ?Sized + ServiceContract,
    {
        self.services.push(slot);
        self
    }

    /// Declares a known-type collection of `K`.
    pub fn known_types<K>(&mut self, slot: &'a KnownTypes<K>) -> &mut Self
    where
        K: ?Sized + KnownType,
    {
        self.known.push(slot);
        self
    }

    /// Declared service slots, in declaration order.
    pub fn services(&self) -> &[&'a dyn ErasedServiceSlot] {
        &self.services
    }

    /// Declared known-type slots, in declaration order.
    pub fn known(&self) -> &[&'a dyn ErasedKnownSlot] {
        &self.known
    }
}

/// A service contract exposed by a module.
pub struct ServiceExport {
    /// `TypeId` of the contract.
    pub contract: TypeId,
    /// Contract type name.
    pub contract_name: &'static str,
    /// Erased `Arc<T>`.
    pub value: ServiceArc,
}

impl fmt::Debug for ServiceExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceExport")
            .field("contract", &self.contract_name)
            .finish_non_exhaustive()
    }
}

/// Sink passed to `Module::expose`.
#[derive(Debug, Default)]
pub struct Exports {
    items: Vec<ServiceExport>,
}

impl Exports {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes `service` as an implementation of contract `T`.
    ///
    /// ```rust,ignore
    /// fn expose(self: Arc<Self>, exports: &mut Exports) {
    ///     exports.expose::<dyn Repository>(self);
    /// }
    /// ```
    pub fn expose<T>(&mut self, service: Arc<T>) -> &mut Self
    where
        T: ?Sized + ServiceContract,
    {
        self.items.push(ServiceExport {
            contract: TypeId::of::<T>(),
            contract_name: type_name::<T>(),
            value: Arc::new(service),
        });
        self
    }

    /// Exposed contracts, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceExport> {
        self.items.iter()
    }

    /// Returns `true` if `contract` is exposed.
    pub fn provides(&self, contract: TypeId) -> bool {
        self.items.iter().any(|e| e.contract == contract)
    }

    /// Consumes the sink.
    pub fn into_vec(self) -> Vec<ServiceExport> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }
    impl ServiceContract for dyn Clock {}
    impl KnownType for dyn Clock {}

    struct Fixed(u64);
    impl Clock for Fixed {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_service_slot_assigns_once() {
        let slot = ServiceSlot::<dyn Clock>::new();
        assert!(slot.resolved().is_err());

        let mut exports = Exports::new();
        exports.expose::<dyn Clock>(Arc::new(Fixed(7)));
        let export = exports.into_vec().remove(0);

        slot.assign(&export.value).unwrap();
        assert_eq!(slot.get().unwrap().now(), 7);

        let err = slot.assign(&export.value).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SlotAlreadyAssigned);
    }

    #[test]
    fn test_service_slot_rejects_wrong_type() {
        let slot = ServiceSlot::<dyn Clock>::new();
        let wrong: ServiceArc = Arc::new(Arc::new(5u32));
        assert_eq!(
            slot.assign(&wrong).unwrap_err().code(),
            ErrorCode::InstantiationFailed
        );
        assert!(!slot.is_resolved());
    }

    #[test]
    fn test_known_types_empty_and_second_assignment() {
        let known = KnownTypes::<dyn Clock>::new();
        assert!(!known.is_composed());
        known.assign(Vec::new()).unwrap();
        assert!(known.is_composed());
        assert!(known.is_empty());

        let err = known.assign(Vec::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SlotAlreadyAssigned);
    }

    #[test]
    fn test_declaration_records_slots_in_order() {
        let a = ServiceSlot::<dyn Clock>::new();
        let b = KnownTypes::<dyn Clock>::new();
        let mut slots = Slots::new();
        slots.service(&a).known_types(&b);

        assert_eq!(slots.services().len(), 1);
        assert_eq!(slots.known()[0].element(), TypeId::of::<dyn Clock>());
    }
}
