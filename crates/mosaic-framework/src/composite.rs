//! The composed application and its runtime state machine.
//!
//! A [`Composite`] is produced by `CompositeBuilder::compose` and owns the
//! plugins, their module records and the built service container.
//!
//! ```text
//! NotStarted ──start()──► Starting ──► Started ──stop()──► Stopping ──► Stopped
//!                            │
//!                            └── start/run fault or cancelled start ──► Faulted ──stop()──► Stopped
//! ```
//!
//! Start runs the tiers in order Core → App → Host with the modules of one
//! tier started concurrently, then runs every module's `run` hook. Stop walks
//! the tiers in reverse. Every phase resolves from a fresh `ServiceScope`.
//!
//! # Example
//!
//! ```rust,ignore
//! let composite = CompositeBuilder::new()
//!     .register_plugin(core_plugin()?)
//!     .register_plugin(host_plugin()?)
//!     .compose()?;
//!
//! composite.start().await?;
//! assert!(composite.is_ready());
//! composite.stop().await?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future;
use mosaic_core::{
    CompositeError, CompositeResult, ConfigStore, ErrorCode, ModuleFault, ModuleState, Plugin,
    PluginId, ServiceProvider, ServiceRegistry, ServiceScope, Tier,
};
use parking_lot::{Mutex, RwLock};
use tracing::{Instrument, debug, info, warn};

use crate::health::{HealthReport, ModuleHealth};
use crate::lifecycle::{AsyncPhase, fan_out};
use crate::plugin_set::ModuleRecord;

/// Runtime state of a [`Composite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    NotStarted,
    Starting,
    Started,
    Stopping,
    Stopped,
    /// A start or run hook failed, or `start` was cancelled. `stop` still
    /// releases started modules.
    Faulted,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Introspection view of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub plugin: PluginId,
    pub tier: Tier,
    pub name: &'static str,
    pub state: ModuleState,
}

// =============================================================================
// Current-composite slot
// =============================================================================

static CURRENT: RwLock<Option<Weak<CompositeInner>>> = parking_lot::const_rwlock(None);

fn claim_slot(inner: &Arc<CompositeInner>) -> CompositeResult<()> {
    let mut slot = CURRENT.write();
    if let Some(holder) = slot.as_ref().and_then(Weak::upgrade)
        && !Arc::ptr_eq(&holder, inner)
        && matches!(
            *holder.state.lock(),
            RuntimeState::Starting | RuntimeState::Started | RuntimeState::Faulted
        )
    {
        return Err(CompositeError::lifecycle(
            ErrorCode::CompositeSlotClaimed,
            "another composite is registered as the current composite",
            Vec::new(),
        ));
    }
    *slot = Some(Arc::downgrade(inner));
    debug!("Current composite slot claimed");
    Ok(())
}

fn release_slot(inner: &Arc<CompositeInner>) {
    let mut slot = CURRENT.write();
    if slot
        .as_ref()
        .is_some_and(|held| std::ptr::eq(held.as_ptr(), Arc::as_ptr(inner)))
    {
        *slot = None;
        debug!("Current composite slot released");
    }
}

// =============================================================================
// Composite
// =============================================================================

pub(crate) struct CompositeInner {
    plugins: Vec<Plugin>,
    modules: Vec<ModuleRecord>,
    provider: Arc<ServiceProvider>,
    configs: Arc<ConfigStore>,
    state: Mutex<RuntimeState>,
    ready: AtomicBool,
    claim_current: bool,
}

/// Faults the composite when a `start` future is dropped before it settles.
/// Modules that already started stay active, so `stop` still releases them.
struct StartGuard<'a> {
    composite: &'a Composite,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.composite.mark_faulted();
            warn!("Composite start cancelled before completion");
        }
    }
}

/// A composed application. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Composite {
    inner: Arc<CompositeInner>,
}

/// Injectable handle to the owning composite, registered in the container.
///
/// Holds a weak reference, so resolving it from a module does not keep the
/// composite alive.
#[derive(Clone)]
pub struct CompositeHandle {
    inner: Weak<CompositeInner>,
}

impl CompositeHandle {
    /// Upgrades to the composite, or fails with `composite-unavailable`.
    pub fn composite(&self) -> CompositeResult<Composite> {
        self.inner
            .upgrade()
            .map(|inner| Composite { inner })
            .ok_or_else(|| {
                CompositeError::lifecycle(
                    ErrorCode::CompositeUnavailable,
                    "the composite has been dropped",
                    Vec::new(),
                )
            })
    }

    pub fn is_started(&self) -> bool {
        self.composite().is_ok_and(|c| c.is_started())
    }

    pub fn is_ready(&self) -> bool {
        self.composite().is_ok_and(|c| c.is_ready())
    }
}

impl fmt::Debug for CompositeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Composite {
    /// Finalizes the container and wraps everything in a composite. The
    /// [`CompositeHandle`] is registered last.
    pub(crate) fn assemble(
        plugins: Vec<Plugin>,
        modules: Vec<ModuleRecord>,
        configs: Arc<ConfigStore>,
        mut registry: ServiceRegistry,
        claim_current: bool,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<CompositeInner>| {
            registry.add_singleton(Arc::new(CompositeHandle {
                inner: weak.clone(),
            }));
            let provider = Arc::new(registry.build());
            debug!(services = provider.len(), "Service container built");
            CompositeInner {
                plugins,
                modules,
                provider,
                configs,
                state: Mutex::new(RuntimeState::NotStarted),
                ready: AtomicBool::new(false),
                claim_current,
            }
        });
        Self { inner }
    }

    /// Returns the process-wide current composite.
    ///
    /// Only composites built with `claim_current(true)` register themselves,
    /// on start. Fails with `composite-unavailable` when no such composite is
    /// started.
    pub fn current() -> CompositeResult<Composite> {
        let unavailable = || {
            CompositeError::lifecycle(
                ErrorCode::CompositeUnavailable,
                "no current composite is available",
                Vec::new(),
            )
        };
        let inner = CURRENT
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(unavailable)?;
        if *inner.state.lock() == RuntimeState::Stopped {
            return Err(unavailable());
        }
        Ok(Composite { inner })
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Starts every module, tier by tier, then runs them.
    ///
    /// # Errors
    ///
    /// - `already-started` when starting or started
    /// - `composite-stopped` / `composite-faulted` when the composite cannot
    ///   be restarted
    /// - `composite-slot-claimed` when another composite holds the current slot
    /// - `start-failed` / `run-failed` with every module fault
    pub async fn start(&self) -> CompositeResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                RuntimeState::NotStarted => *state = RuntimeState::Starting,
                RuntimeState::Starting | RuntimeState::Started => {
                    return Err(CompositeError::lifecycle(
                        ErrorCode::AlreadyStarted,
                        "composite is already started",
                        Vec::new(),
                    ));
                }
                RuntimeState::Stopping | RuntimeState::Stopped => {
                    return Err(CompositeError::lifecycle(
                        ErrorCode::CompositeStopped,
                        "composite has been stopped and cannot be restarted",
                        Vec::new(),
                    ));
                }
                RuntimeState::Faulted => {
                    return Err(CompositeError::lifecycle(
                        ErrorCode::CompositeFaulted,
                        "composite failed to start; stop it and compose a new one",
                        Vec::new(),
                    ));
                }
            }
        }

        if self.inner.claim_current
            && let Err(e) = claim_slot(&self.inner)
        {
            *self.inner.state.lock() = RuntimeState::NotStarted;
            return Err(e);
        }
        let guard = StartGuard {
            composite: self,
            armed: true,
        };

        info!(
            plugins = self.inner.plugins.len(),
            modules = self.inner.modules.len(),
            "Starting composite"
        );
        for record in &self.inner.modules {
            record.ctx.attach_services(Arc::clone(&self.inner.provider));
        }

        for tier in Tier::START_ORDER {
            let records = self.tier_records(tier, |_| true);
            if records.is_empty() {
                continue;
            }
            let span = tracing::info_span!("start", tier = %tier, modules = records.len());
            let faults = fan_out(&records, AsyncPhase::Start, self.phase_scope())
                .instrument(span)
                .await;
            if !faults.is_empty() {
                guard.disarm();
                return Err(self.fail(ErrorCode::StartFailed, Some(tier), faults));
            }
            debug!(tier = %tier, "Tier started");
        }

        let span = tracing::info_span!("run", modules = self.inner.modules.len());
        let faults = fan_out(&self.inner.modules, AsyncPhase::Run, self.phase_scope())
            .instrument(span)
            .await;
        if !faults.is_empty() {
            guard.disarm();
            return Err(self.fail(ErrorCode::RunFailed, None, faults));
        }

        guard.disarm();
        *self.inner.state.lock() = RuntimeState::Started;
        self.inner.ready.store(true, Ordering::SeqCst);
        info!("Composite started");
        Ok(())
    }

    /// `tier` is the failing start tier, or `None` for the run phase.
    fn fail(&self, code: ErrorCode, tier: Option<Tier>, faults: Vec<ModuleFault>) -> CompositeError {
        self.mark_faulted();
        warn!(
            code = %code,
            tier = tier.map(tracing::field::display),
            faults = faults.len(),
            "Composite start aborted"
        );
        let message = format!("{} module(s) failed; first: {}", faults.len(), faults[0]);
        CompositeError::lifecycle(code, message, faults)
    }

    fn mark_faulted(&self) {
        *self.inner.state.lock() = RuntimeState::Faulted;
        self.inner.ready.store(false, Ordering::SeqCst);
        if self.inner.claim_current {
            release_slot(&self.inner);
        }
    }

    /// Stops every started module, Host → App → Core.
    ///
    /// A no-op unless the composite is started or faulted. All tiers are
    /// settled before faults are reported as `stop-failed`.
    pub async fn stop(&self) -> CompositeResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                RuntimeState::Started | RuntimeState::Faulted => *state = RuntimeState::Stopping,
                other => {
                    debug!(state = %other, "Stop ignored");
                    return Ok(());
                }
            }
        }

        info!("Stopping composite");
        self.inner.ready.store(false, Ordering::SeqCst);
        let mut faults = Vec::new();
        for tier in Tier::STOP_ORDER {
            let records = self.tier_records(tier, |r| r.ctx.state().is_active());
            if records.is_empty() {
                continue;
            }
            let span = tracing::info_span!("stop", tier = %tier, modules = records.len());
            faults.extend(
                fan_out(&records, AsyncPhase::Stop, self.phase_scope())
                    .instrument(span)
                    .await,
            );
            debug!(tier = %tier, "Tier stopped");
        }

        *self.inner.state.lock() = RuntimeState::Stopped;
        if self.inner.claim_current {
            release_slot(&self.inner);
        }

        if faults.is_empty() {
            info!("Composite stopped");
            Ok(())
        } else {
            warn!(faults = faults.len(), "Composite stopped with faults");
            Err(CompositeError::lifecycle(
                ErrorCode::StopFailed,
                format!("{} module(s) failed to stop", faults.len()),
                faults,
            ))
        }
    }

    fn tier_records(&self, tier: Tier, keep: impl Fn(&ModuleRecord) -> bool) -> Vec<ModuleRecord> {
        self.inner
            .modules
            .iter()
            .filter(|r| r.tier == tier && keep(*r))
            .cloned()
            .collect()
    }

    fn phase_scope(&self) -> Arc<ServiceScope> {
        Arc::new(self.inner.provider.create_scope())
    }

    // ─── Readiness and health ────────────────────────────────────────────────

    /// Flips the readiness flag and returns the new status string.
    pub fn toggle_ready_status(&self) -> &'static str {
        let was_ready = self.inner.ready.fetch_xor(true, Ordering::SeqCst);
        let status = if was_ready { "NOT-READY" } else { "READY" };
        info!(status, "Readiness toggled");
        status
    }

    pub fn is_started(&self) -> bool {
        self.state() == RuntimeState::Started
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RuntimeState {
        *self.inner.state.lock()
    }

    /// Queries every module's health. Reports unhealthy without querying
    /// modules when the composite is not started.
    pub async fn health_check(&self) -> HealthReport {
        if !self.is_started() {
            return HealthReport::not_started();
        }
        let statuses = future::join_all(self.inner.modules.iter().map(|record| {
            record
                .module
                .health_check(&record.ctx)
                .instrument(record.ctx.span().clone())
        }))
        .await;
        let modules = self
            .inner
            .modules
            .iter()
            .zip(statuses)
            .map(|(record, status)| ModuleHealth {
                plugin: record.plugin.clone(),
                module: record.name.to_string(),
                status,
            })
            .collect();
        HealthReport::from_modules(self.is_ready(), modules)
    }

    // ─── Services and configuration ──────────────────────────────────────────

    /// Returns the unique config object of type `T`.
    ///
    /// Fails with `config-not-registered` or `config-ambiguous`.
    pub fn plugin_config<T: Send + Sync + 'static>(&self) -> CompositeResult<Arc<T>> {
        self.inner.configs.get::<T>()
    }

    /// The built service container.
    pub fn services(&self) -> &Arc<ServiceProvider> {
        &self.inner.provider
    }

    /// Creates a resolution scope. Requires a started composite.
    pub fn create_scope(&self) -> CompositeResult<ServiceScope> {
        if !self.is_started() {
            return Err(CompositeError::lifecycle(
                ErrorCode::NotStarted,
                "composite is not started",
                Vec::new(),
            ));
        }
        Ok(self.inner.provider.create_scope())
    }

    /// Returns a handle suitable for storing in long-lived services.
    pub fn handle(&self) -> CompositeHandle {
        CompositeHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    /// Plugins in registration order.
    pub fn plugins(&self) -> &[Plugin] {
        &self.inner.plugins
    }

    pub fn plugin(&self, id: &str) -> Option<&Plugin> {
        self.inner.plugins.iter().find(|p| p.id().as_str() == id)
    }

    /// Modules in start order.
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner
            .modules
            .iter()
            .map(|r| ModuleInfo {
                plugin: r.plugin.clone(),
                tier: r.tier,
                name: r.name,
                state: r.ctx.state(),
            })
            .collect()
    }

    /// Module states keyed by `plugin/module`.
    pub fn module_states(&self) -> Vec<(String, ModuleState)> {
        self.inner
            .modules
            .iter()
            .map(|r| (format!("{}/{}", r.plugin, r.name), r.ctx.state()))
            .collect()
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("state", &self.state())
            .field("ready", &self.is_ready())
            .field("plugins", &self.inner.plugins.len())
            .field("modules", &self.inner.modules.len())
            .finish()
    }
}
