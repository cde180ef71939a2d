//! Shared fixtures for the composition and lifecycle tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mosaic_core::{
    BoxError, Exports, HealthStatus, KnownType, KnownTypes, LifecyclePhase, Module, ModuleContext,
    Plugin, PluginMetadata, ServiceContract, ServiceScope, ServiceSlot, Slots, Tier,
};
use parking_lot::Mutex;

// ─── Contracts ───────────────────────────────────────────────────────────────

pub trait Repository: Send + Sync {
    fn backend(&self) -> &'static str;
}
impl ServiceContract for dyn Repository {}

pub trait Widget: Send + Sync {
    fn label(&self) -> &'static str;
}
impl KnownType for dyn Widget {}

pub struct Button;
impl Widget for Button {
    fn label(&self) -> &'static str {
        "button"
    }
}

pub struct Slider;
impl Widget for Slider {
    fn label(&self) -> &'static str {
        "slider"
    }
}

pub struct Banner;
impl Widget for Banner {
    fn label(&self) -> &'static str {
        "banner"
    }
}

// ─── Journal ─────────────────────────────────────────────────────────────────

/// Records hook invocations with a global sequence number.
#[derive(Default)]
pub struct Journal {
    seq: AtomicUsize,
    events: Mutex<Vec<(usize, String)>>,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: impl Into<String>) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push((seq, event.into()));
    }

    /// Events in recording order.
    pub fn events(&self) -> Vec<String> {
        let mut events = self.events.lock().clone();
        events.sort_by_key(|(seq, _)| *seq);
        events.into_iter().map(|(_, e)| e).collect()
    }

    /// Sequence number of `event`, if recorded.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .find(|(_, e)| e == event)
            .map(|(seq, _)| *seq)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, e)| e.starts_with(prefix))
            .count()
    }
}

// ─── Modules ─────────────────────────────────────────────────────────────────

/// Exposes `dyn Repository`.
pub struct RepoModule {
    pub backend: &'static str,
}

impl Repository for RepoModule {
    fn backend(&self) -> &'static str {
        self.backend
    }
}

impl Module for RepoModule {
    fn expose(self: Arc<Self>, exports: &mut Exports) {
        exports.expose::<dyn Repository>(self);
    }
}

/// Requires `dyn Repository`. The slot is shared so tests can inspect it.
#[derive(Default)]
pub struct ConsumerModule {
    pub repo: Arc<ServiceSlot<dyn Repository>>,
}

impl Module for ConsumerModule {
    fn declare<'a>(&'a self, slots: &mut Slots<'a>) {
        slots.service(self.repo.as_ref());
    }
}

/// Collects every visible `dyn Widget`.
#[derive(Default)]
pub struct GalleryModule {
    pub widgets: Arc<KnownTypes<dyn Widget>>,
}

impl Module for GalleryModule {
    fn declare<'a>(&'a self, slots: &mut Slots<'a>) {
        slots.known_types(self.widgets.as_ref());
    }
}

/// Records every hook into a [`Journal`] as `"<phase>:<label>"` and fails
/// the configured phase.
pub struct Recorder {
    pub label: &'static str,
    pub journal: Arc<Journal>,
    pub fail_on: Option<LifecyclePhase>,
    pub panic_on: Option<LifecyclePhase>,
    pub health: HealthStatus,
}

impl Recorder {
    pub fn new(label: &'static str, journal: &Arc<Journal>) -> Self {
        Self {
            label,
            journal: Arc::clone(journal),
            fail_on: None,
            panic_on: None,
            health: HealthStatus::Healthy,
        }
    }

    pub fn failing(mut self, phase: LifecyclePhase) -> Self {
        self.fail_on = Some(phase);
        self
    }

    pub fn panicking(mut self, phase: LifecyclePhase) -> Self {
        self.panic_on = Some(phase);
        self
    }

    pub fn reporting(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    fn hook(&self, phase: LifecyclePhase) -> Result<(), BoxError> {
        self.journal.record(format!("{phase}:{}", self.label));
        if self.panic_on == Some(phase) {
            panic!("{} panicked during {phase}", self.label);
        }
        if self.fail_on == Some(phase) {
            return Err(format!("{} failed during {phase}", self.label).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Module for Recorder {
    fn name(&self) -> &'static str {
        self.label
    }

    fn initialize(&self, _ctx: &ModuleContext) -> Result<(), BoxError> {
        self.hook(LifecyclePhase::Initialize)
    }

    fn configure(&self, _ctx: &ModuleContext) -> Result<(), BoxError> {
        self.hook(LifecyclePhase::Configure)
    }

    async fn start(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
        tokio::task::yield_now().await;
        self.hook(LifecyclePhase::Start)
    }

    async fn run(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
        self.hook(LifecyclePhase::Run)
    }

    async fn stop(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
        tokio::task::yield_now().await;
        self.hook(LifecyclePhase::Stop)
    }

    async fn health_check(&self, _ctx: &ModuleContext) -> HealthStatus {
        self.health.clone()
    }
}

// ─── Plugin helpers ──────────────────────────────────────────────────────────

/// A plugin with test metadata and no modules.
pub fn bare(id: &str, tier: Tier) -> mosaic_core::PluginBuilder {
    Plugin::builder(id, format!("{id} plugin"), tier)
        .metadata(PluginMetadata::new(format!("{id}-crate"), "0.1.0"))
}

/// A plugin holding a single module.
pub fn with_module<M: Module>(id: &str, tier: Tier, module: M) -> Plugin {
    bare(id, tier).module(module).build().unwrap()
}

pub fn host() -> Plugin {
    bare("host", Tier::Host).build().unwrap()
}
