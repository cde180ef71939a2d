//! # Mosaic Framework
//!
//! Composition engine and lifecycle runtime of the Mosaic plugin framework.
//!
//! This layer provides:
//! - [`CompositeValidator`]: fail-fast pre-flight checks of a plugin set
//! - [`CompositeBuilder`]: dependency resolution, known-type composition,
//!   the initialize/configure barrier and service registration
//! - [`Composite`]: tier-ordered concurrent start/run/stop, readiness,
//!   health and the optional process-wide current composite
//!
//! Plugin-facing contracts live in `mosaic-core` and are re-exported here
//! for convenience.

pub mod builder;
pub mod composite;
pub mod health;
pub mod lifecycle;
pub mod phase;
pub mod plugin_set;
pub mod resolution;
pub mod validator;

pub use builder::CompositeBuilder;
pub use composite::{Composite, CompositeHandle, ModuleInfo, RuntimeState};
pub use health::{HealthReport, ModuleHealth};
pub use phase::PhaseBarrier;
pub use plugin_set::{ModuleRecord, PluginSet};
pub use validator::CompositeValidator;

pub use mosaic_core;
