//! The module contract, its lifecycle states and the per-module context.
//!
//! A [`Module`] is the unit of behaviour inside a plugin. The engine drives
//! every module through the same sequence of hooks:
//!
//! ```text
//! declare / expose          slots filled, contracts published
//! initialize                all modules, Core → App → Host
//! configure                 only after every initialize succeeded
//! register_*_services       default → scan → explicit
//! start                     per tier, concurrent within a tier
//! run                       all modules, concurrent
//! stop                      per tier in reverse, concurrent within a tier
//! ```
//!
//! Every hook has a no-op default, so a module only implements what it needs.
//!
//! ```rust,ignore
//! struct Heartbeat { clock: ServiceSlot<dyn Clock> }
//!
//! #[async_trait]
//! impl Module for Heartbeat {
//!     fn declare<'a>(&'a self, slots: &mut Slots<'a>) {
//!         slots.service(&self.clock);
//!     }
//!
//!     async fn start(&self, ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
//!         info!(now = self.clock.resolved()?.now(), "heartbeat armed");
//!         Ok(())
//!     }
//! }
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{Span, trace};

use crate::config::ConfigStore;
use crate::container::{ServiceProvider, ServiceRegistry, ServiceScope};
use crate::error::{BoxError, CompositeError, CompositeResult, ErrorCode};
use crate::plugin::PluginId;
use crate::slots::{Exports, Slots};
use crate::tier::Tier;
use crate::types::TypeCatalog;

// =============================================================================
// Lifecycle phases and states
// =============================================================================

/// A module hook invoked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Initialize,
    Configure,
    RegisterServices,
    Start,
    Run,
    Stop,
}

impl LifecyclePhase {
    /// Lowercase phase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Configure => "configure",
            Self::RegisterServices => "register-services",
            Self::Start => "start",
            Self::Run => "run",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single module.
///
/// States only move forward. `Faulted` is reachable from every state except
/// `Stopped`; nothing leaves `Stopped` or `Faulted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Constructed,
    Initialized,
    Configured,
    ServicesRegistered,
    Started,
    Running,
    Stopped,
    Faulted,
}

impl ModuleState {
    /// Returns `true` if `self → next` is a legal transition.
    pub const fn can_advance_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Constructed, Initialized)
                | (Initialized, Configured)
                | (Configured, ServicesRegistered)
                | (ServicesRegistered, Started)
                | (Started, Running)
                | (Started | Running, Stopped)
                | (
                    Constructed
                        | Initialized
                        | Configured
                        | ServicesRegistered
                        | Started
                        | Running,
                    Faulted
                )
        )
    }

    /// Returns `true` while the module holds started resources.
    pub const fn is_active(self) -> bool {
        matches!(self, ModuleState::Started | ModuleState::Running)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Health
// =============================================================================

/// Result of a module health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    /// Returns `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

// =============================================================================
// ModuleContext
// =============================================================================

/// Per-module context handed to every hook.
///
/// Carries the owning plugin's identity and tier, a tracing span, the
/// module's lifecycle state and, once the composite starts, the built
/// service provider.
pub struct ModuleContext {
    plugin: PluginId,
    plugin_name: String,
    tier: Tier,
    module: String,
    span: Span,
    state: Mutex<ModuleState>,
    services: OnceLock<Arc<ServiceProvider>>,
    configs: Arc<ConfigStore>,
}

impl ModuleContext {
    /// Creates a context in state [`ModuleState::Constructed`].
    pub fn new(
        plugin: PluginId,
        plugin_name: impl Into<String>,
        tier: Tier,
        module: impl Into<String>,
        configs: Arc<ConfigStore>,
    ) -> Self {
        let module = module.into();
        let span = tracing::info_span!(
            "module",
            plugin = %plugin,
            module = %module,
            tier = %tier,
        );
        Self {
            plugin,
            plugin_name: plugin_name.into(),
            tier,
            module,
            span,
            state: Mutex::new(ModuleState::Constructed),
            services: OnceLock::new(),
            configs,
        }
    }

    /// Owning plugin identity.
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin
    }

    /// Owning plugin display name.
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Owning plugin tier.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Module display name.
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// Tracing span the engine enters around every hook of this module.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    /// Moves the module to `next`, rejecting illegal transitions with
    /// `invalid-transition`. Returns the previous state.
    pub fn advance(&self, next: ModuleState) -> CompositeResult<ModuleState> {
        let mut state = self.state.lock();
        let previous = *state;
        if !previous.can_advance_to(next) {
            return Err(CompositeError::lifecycle(
                ErrorCode::InvalidTransition,
                format!(
                    "module '{}' of plugin '{}' cannot move from {previous} to {next}",
                    self.module, self.plugin
                ),
                Vec::new(),
            ));
        }
        *state = next;
        trace!(
            plugin = %self.plugin,
            module = %self.module,
            from = %previous,
            to = %next,
            "Module state changed"
        );
        Ok(previous)
    }

    /// Attaches the built provider. Returns `false` if one was already set.
    pub fn attach_services(&self, provider: Arc<ServiceProvider>) -> bool {
        self.services.set(provider).is_ok()
    }

    /// Returns the service provider, available once the composite starts.
    pub fn services(&self) -> CompositeResult<&Arc<ServiceProvider>> {
        self.services.get().ok_or_else(|| {
            CompositeError::lifecycle(
                ErrorCode::NotStarted,
                format!(
                    "services are not available to module '{}' before start",
                    self.module
                ),
                Vec::new(),
            )
        })
    }

    /// Creates a fresh resolution scope over the attached provider.
    pub fn create_scope(&self) -> CompositeResult<ServiceScope> {
        Ok(self.services()?.create_scope())
    }

    /// Returns the unique config of type `T` across the composite.
    pub fn config<T: Send + Sync + 'static>(&self) -> CompositeResult<Arc<T>> {
        self.configs.get::<T>()
    }

    /// Returns this plugin's own config of type `T`.
    pub fn settings<T: Send + Sync + 'static>(&self) -> CompositeResult<Arc<T>> {
        self.configs.for_plugin::<T>(&self.plugin)
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("plugin", &self.plugin)
            .field("tier", &self.tier)
            .field("module", &self.module)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Module
// =============================================================================

/// Strips the module path and generic arguments from a type name.
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A unit of behaviour owned by a plugin.
#[async_trait]
pub trait Module: Any + Send + Sync {
    /// Display name used in logs and fault reports.
    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }

    /// Lists the module's service and known-type slots.
    fn declare<'a>(&'a self, _slots: &mut Slots<'a>) {}

    /// Publishes the service contracts this module implements.
    fn expose(self: Arc<Self>, _exports: &mut Exports) {}

    /// First synchronous hook. Every module is initialized before any is
    /// configured.
    fn initialize(&self, _ctx: &ModuleContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Second synchronous hook.
    fn configure(&self, _ctx: &ModuleContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Registers fallback services. Prefer `try_add_*` here so explicit
    /// registrations win.
    fn register_default_services(
        &self,
        _ctx: &ModuleContext,
        _registry: &mut ServiceRegistry,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Registers services discovered in the visible type catalog.
    fn scan_for_services(
        &self,
        _ctx: &ModuleContext,
        _catalog: &TypeCatalog,
        _registry: &mut ServiceRegistry,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Registers the module's own services.
    fn register_services(
        &self,
        _ctx: &ModuleContext,
        _registry: &mut ServiceRegistry,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Acquires runtime resources. Runs concurrently with the other modules
    /// of the same tier.
    async fn start(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after every tier has started.
    async fn run(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases runtime resources.
    async fn stop(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
        Ok(())
    }

    /// Reports the module's health while the composite is started.
    async fn health_check(&self, _ctx: &ModuleContext) -> HealthStatus {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ModuleContext {
        ModuleContext::new(
            PluginId::new("core"),
            "Core",
            Tier::Core,
            "clock",
            Arc::new(ConfigStore::new()),
        )
    }

    #[test]
    fn test_states_advance_in_order() {
        let ctx = context();
        for next in [
            ModuleState::Initialized,
            ModuleState::Configured,
            ModuleState::ServicesRegistered,
            ModuleState::Started,
            ModuleState::Running,
            ModuleState::Stopped,
        ] {
            ctx.advance(next).unwrap();
        }
        assert_eq!(ctx.state(), ModuleState::Stopped);
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let ctx = context();
        let err = ctx.advance(ModuleState::Configured).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
        assert_eq!(ctx.state(), ModuleState::Constructed);
    }

    #[test]
    fn test_no_reentry_after_stop_or_fault() {
        assert!(!ModuleState::Stopped.can_advance_to(ModuleState::Started));
        assert!(!ModuleState::Stopped.can_advance_to(ModuleState::Faulted));
        assert!(!ModuleState::Faulted.can_advance_to(ModuleState::Initialized));
        assert!(ModuleState::Configured.can_advance_to(ModuleState::Faulted));
        assert!(!ModuleState::Initialized.can_advance_to(ModuleState::Initialized));
    }

    #[test]
    fn test_services_unavailable_before_attach() {
        let ctx = context();
        assert_eq!(ctx.services().unwrap_err().code(), ErrorCode::NotStarted);
        assert!(ctx.attach_services(Arc::new(ServiceRegistry::new().build())));
        assert!(ctx.create_scope().is_ok());
        assert!(!ctx.attach_services(Arc::new(ServiceRegistry::new().build())));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_crate::modules::Clock"), "Clock");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[tokio::test]
    async fn test_default_hooks_succeed() {
        struct Quiet;
        impl Module for Quiet {}

        let ctx = context();
        let scope = Arc::new(ServiceRegistry::new().build()).create_scope();
        let module = Quiet;
        assert_eq!(module.name(), "Quiet");
        assert!(module.start(&ctx, &scope).await.is_ok());
        assert!(module.health_check(&ctx).await.is_healthy());
    }
}
