//! Typed service container.
//!
//! The container is split the usual way:
//!
//! - [`ServiceRegistry`]: the mutable registration surface handed to module
//!   hooks during composition.
//! - [`ServiceProvider`]: the immutable result of [`ServiceRegistry::build`].
//!   Built exactly once, before the composite starts.
//! - [`ServiceScope`]: a short-lived resolution context. Each lifecycle phase
//!   creates a fresh scope, so scoped instances never leak across phases.
//!
//! Services are keyed by `TypeId::of::<T>()` where `T` is usually a trait
//! object (`dyn MyService`). Internally each value is an `Arc<T>` upcast to
//! [`ServiceArc`]; resolution downcasts it back to `Arc<T>`.
//!
//! ```rust,ignore
//! let mut registry = ServiceRegistry::new();
//! registry.add_singleton::<dyn Clock>(Arc::new(SystemClock));
//! registry.add_scoped::<RequestLog, _>(|_| Ok(Arc::new(RequestLog::default())));
//!
//! let provider = Arc::new(registry.build());
//! let scope = provider.create_scope();
//! let clock = scope.resolve::<dyn Clock>()?;
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{BoxError, CompositeError, CompositeResult, ErrorCode};

/// Type-erased service value. The inner `dyn Any` is an `Arc<T>`.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

type ErasedFactory = Arc<dyn Fn(&ServiceScope) -> Result<ServiceArc, BoxError> + Send + Sync>;

enum Binding {
    Singleton(ServiceArc),
    Scoped(ErasedFactory),
    Transient(ErasedFactory),
}

struct Registration {
    name: Option<String>,
    type_name: &'static str,
    binding: Binding,
}

fn erase<T: ?Sized + Send + Sync + 'static>(service: Arc<T>) -> ServiceArc {
    Arc::new(service)
}

fn unerase<T: ?Sized + Send + Sync + 'static>(value: &ServiceArc) -> Option<Arc<T>> {
    value.downcast_ref::<Arc<T>>().map(Arc::clone)
}

// =============================================================================
// ServiceRegistry
// =============================================================================

/// Mutable registration surface used during composition.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<TypeId, Vec<Registration>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, type_id: TypeId, registration: Registration) {
        trace!(
            service = registration.type_name,
            name = ?registration.name,
            "Service registered"
        );
        self.entries.entry(type_id).or_default().push(registration);
    }

    /// Registers a singleton under `T`. Later registrations win for
    /// [`ServiceScope::resolve`]; all are returned by [`ServiceScope::resolve_all`].
    pub fn add_singleton<T>(&mut self, service: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.push(
            TypeId::of::<T>(),
            Registration {
                name: None,
                type_name: type_name::<T>(),
                binding: Binding::Singleton(erase(service)),
            },
        );
        self
    }

    /// Registers a singleton only if no unnamed registration for `T` exists.
    ///
    /// Returns `true` when the service was added. Intended for
    /// `register_default_services` hooks so explicit registrations can
    /// override defaults regardless of ordering.
    pub fn try_add_singleton<T>(&mut self, service: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if self.contains::<T>() {
            return false;
        }
        self.add_singleton(service);
        true
    }

    /// Registers a named singleton under `T`.
    pub fn add_named_singleton<T>(&mut self, name: impl Into<String>, service: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.push(
            TypeId::of::<T>(),
            Registration {
                name: Some(name.into()),
                type_name: type_name::<T>(),
                binding: Binding::Singleton(erase(service)),
            },
        );
        self
    }

    /// Registers a factory invoked at most once per [`ServiceScope`].
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let erased: ErasedFactory = Arc::new(move |scope| factory(scope).map(erase));
        self.push(
            TypeId::of::<T>(),
            Registration {
                name: None,
                type_name: type_name::<T>(),
                binding: Binding::Scoped(erased),
            },
        );
        self
    }

    /// Registers a factory invoked on every resolution.
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let erased: ErasedFactory = Arc::new(move |scope| factory(scope).map(erase));
        self.push(
            TypeId::of::<T>(),
            Registration {
                name: None,
                type_name: type_name::<T>(),
                binding: Binding::Transient(erased),
            },
        );
        self
    }

    /// Registers an already-erased singleton (`value` must wrap an `Arc<T>`
    /// where `TypeId::of::<T>() == type_id`).
    ///
    /// Used by the composition engine to publish module service contracts and
    /// plugin configs without knowing their static types.
    pub fn add_erased(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        value: ServiceArc,
    ) -> &mut Self {
        self.push(
            type_id,
            Registration {
                name: None,
                type_name,
                binding: Binding::Singleton(value),
            },
        );
        self
    }

    /// Returns `true` if an unnamed registration for `T` exists.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.entries
            .get(&TypeId::of::<T>())
            .is_some_and(|regs| regs.iter().any(|r| r.name.is_none()))
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the registry into a provider.
    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            entries: self.entries,
            next_scope: AtomicU64::new(1),
        }
    }
}

// =============================================================================
// ServiceProvider
// =============================================================================

/// Immutable, fully built service container.
pub struct ServiceProvider {
    entries: HashMap<TypeId, Vec<Registration>>,
    next_scope: AtomicU64,
}

impl ServiceProvider {
    /// Creates a fresh resolution scope.
    pub fn create_scope(self: &Arc<Self>) -> ServiceScope {
        let id = self.next_scope.fetch_add(1, Ordering::Relaxed);
        trace!(scope = id, "Service scope created");
        ServiceScope {
            provider: Arc::clone(self),
            id,
            scoped: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if an unnamed registration for `T` exists.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.entries
            .get(&TypeId::of::<T>())
            .is_some_and(|regs| regs.iter().any(|r| r.name.is_none()))
    }

    /// Returns the last unnamed *singleton* registered under `T` without a
    /// scope. Scoped and transient registrations are ignored.
    pub fn get_singleton<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(&TypeId::of::<T>())?
            .iter()
            .rev()
            .filter(|r| r.name.is_none())
            .find_map(|r| match &r.binding {
                Binding::Singleton(value) => unerase::<T>(value),
                _ => None,
            })
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if the provider holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ServiceScope
// =============================================================================

/// Short-lived resolution context. Scoped services are created at most once
/// per scope and dropped with it.
pub struct ServiceScope {
    provider: Arc<ServiceProvider>,
    id: u64,
    scoped: Mutex<HashMap<(TypeId, usize), ServiceArc>>,
}

impl ServiceScope {
    /// Scope identifier, unique per provider.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the provider this scope resolves from.
    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    fn materialize(
        &self,
        type_id: TypeId,
        index: usize,
        registration: &Registration,
    ) -> CompositeResult<ServiceArc> {
        let instantiation_failed = |e: BoxError| {
            CompositeError::composition(
                ErrorCode::InstantiationFailed,
                format!("factory for service '{}' failed", registration.type_name),
            )
            .with_details(vec![registration.type_name.to_string()])
            .with_source(e)
        };

        match &registration.binding {
            Binding::Singleton(value) => Ok(Arc::clone(value)),
            Binding::Transient(factory) => factory(self).map_err(instantiation_failed),
            Binding::Scoped(factory) => {
                if let Some(value) = self.scoped.lock().get(&(type_id, index)) {
                    return Ok(Arc::clone(value));
                }
                // Lock released while the factory runs: it may resolve other
                // scoped services from this scope.
                let value = factory(self).map_err(instantiation_failed)?;
                Ok(Arc::clone(
                    self.scoped
                        .lock()
                        .entry((type_id, index))
                        .or_insert(value),
                ))
            }
        }
    }

    fn downcast<T>(value: &ServiceArc) -> CompositeResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        unerase::<T>(value).ok_or_else(|| {
            CompositeError::lifecycle(
                ErrorCode::ServiceNotRegistered,
                format!("registered value does not match service type '{}'", type_name::<T>()),
                Vec::new(),
            )
        })
    }

    /// Resolves the last unnamed registration of `T`.
    pub fn resolve<T>(&self) -> CompositeResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let found = self.provider.entries.get(&type_id).and_then(|regs| {
            regs.iter()
                .enumerate()
                .rev()
                .find(|(_, r)| r.name.is_none())
        });
        match found {
            Some((index, registration)) => {
                Self::downcast(&self.materialize(type_id, index, registration)?)
            }
            None => Err(CompositeError::lifecycle(
                ErrorCode::ServiceNotRegistered,
                format!("no service registered for '{}'", type_name::<T>()),
                Vec::new(),
            )),
        }
    }

    /// Resolves `T`, returning `None` when unregistered or when its factory fails.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>().ok()
    }

    /// Resolves every unnamed registration of `T`, in registration order.
    pub fn resolve_all<T>(&self) -> CompositeResult<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let Some(regs) = self.provider.entries.get(&type_id) else {
            return Ok(Vec::new());
        };
        regs.iter()
            .enumerate()
            .filter(|(_, r)| r.name.is_none())
            .map(|(index, r)| Self::downcast(&self.materialize(type_id, index, r)?))
            .collect()
    }

    /// Resolves the named registration of `T`.
    pub fn resolve_named<T>(&self, name: &str) -> CompositeResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let found = self.provider.entries.get(&type_id).and_then(|regs| {
            regs.iter()
                .enumerate()
                .rev()
                .find(|(_, r)| r.name.as_deref() == Some(name))
        });
        match found {
            Some((index, registration)) => {
                Self::downcast(&self.materialize(type_id, index, registration)?)
            }
            None => Err(CompositeError::lifecycle(
                ErrorCode::ServiceNotRegistered,
                format!("no service '{name}' registered for '{}'", type_name::<T>()),
                Vec::new(),
            )),
        }
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
