//! # Mosaic
//!
//! A modular, type-safe plugin composition and lifecycle framework for Rust.
//!
//! ## Overview
//!
//! An application is assembled from plugins in three tiers. Each plugin
//! carries modules; modules declare the services they need, expose the
//! services they provide and collect the known types other plugins export.
//! Mosaic validates the set, wires it, runs a two-phase
//! initialize/configure barrier, builds a service container and then drives
//! the modules through start, run and stop.
//!
//! ```text
//! ┌──────────┐   depends on   ┌──────────┐   depends on   ┌──────────┐
//! │   Host   │───────────────▶│   App    │───────────────▶│   Core   │
//! │ (exactly │                │          │                │          │
//! │   one)   │◀───────────────│          │◀───────────────│          │
//! └──────────┘   discovers    └──────────┘   discovers    └──────────┘
//!
//!   start: Core ─▶ App ─▶ Host (modules of one tier concurrently)
//!   stop:  Host ─▶ App ─▶ Core
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mosaic::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Module for Greeter {
//!     async fn start(&self, ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
//!         tracing::info!(plugin = %ctx.plugin_id(), "hello");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let host = Plugin::builder("app", "Example app", Tier::Host)
//!         .metadata(plugin_metadata!())
//!         .module(Greeter)
//!         .build()?;
//!
//!     MosaicRuntime::builder()
//!         .register_plugin(host)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use mosaic_core as core;
pub use mosaic_framework as framework;
pub use mosaic_runtime as runtime;

pub use mosaic_core::plugin_metadata;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mosaic::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use mosaic_runtime::{MosaicConfig, MosaicRuntime};

    // Composition and lifecycle
    pub use mosaic_framework::{
        Composite, CompositeBuilder, CompositeHandle, HealthReport, RuntimeState,
    };

    // Plugin authoring
    pub use mosaic_core::{
        BoxError, CompositeError, CompositeResult, ErrorCode, Exports, HealthStatus, KnownType,
        KnownTypes, Module, ModuleContext, Plugin, PluginMetadata, ServiceContract,
        ServiceRegistry, ServiceScope, ServiceSlot, Slots, Tier, TypeCatalog, TypeExport,
        async_trait, plugin_metadata,
    };
}
