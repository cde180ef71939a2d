//! # Mosaic Core
//!
//! Contracts of the Mosaic plugin composition framework.
//!
//! This crate defines everything a plugin author touches:
//!
//! - **Plugins**: identity, [`Tier`], metadata and the [`PluginBuilder`]
//! - **Modules**: the [`Module`] hook trait, [`ModuleContext`] and lifecycle states
//! - **Slots**: [`ServiceSlot`] and [`KnownTypes`] declared through [`Slots`]
//! - **Types**: [`KnownType`] / [`ServiceContract`] markers and the [`TypeCatalog`]
//! - **Container**: [`ServiceRegistry`] → [`ServiceProvider`] → [`ServiceScope`]
//! - **Errors**: [`CompositeError`] with stable [`ErrorCode`]s
//!
//! The composition engine itself lives in `mosaic-framework`.
//!
//! ## Tier visibility
//!
//! ```text
//!   Core ──▶ App ──▶ Host        start order
//!   Host ──▶ App ──▶ Core        stop order
//!
//!   service dependencies point down, known-type discovery looks up
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod module;
pub mod plugin;
pub mod resolver;
pub mod slots;
pub mod tier;
pub mod types;

pub use async_trait::async_trait;

pub use config::{ConfigEntry, ConfigStore};
pub use container::{ServiceArc, ServiceProvider, ServiceRegistry, ServiceScope};
pub use error::{BoxError, CompositeError, CompositeResult, ErrorCode, ErrorKind, ModuleFault};
pub use module::{HealthStatus, LifecyclePhase, Module, ModuleContext, ModuleState};
pub use plugin::{ModuleEntry, Plugin, PluginBuilder, PluginId, PluginMetadata};
pub use resolver::{CatalogTypeResolver, PluginDescription, TypeResolver};
pub use slots::{Exports, KnownTypes, ServiceExport, ServiceSlot, Slots};
pub use tier::Tier;
pub use types::{CatalogEntry, ExportedType, KnownType, ServiceContract, TypeCatalog, TypeExport};
