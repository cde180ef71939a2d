//! Mosaic Runtime - host glue for the Mosaic plugin framework.
//!
//! This crate provides:
//! - Layered configuration (`mosaic.toml` / `mosaic.yaml`, `MOSAIC_*` env)
//! - Logging setup on `tracing-subscriber`
//! - [`MosaicRuntime`]: composes the registered plugins with their
//!   configured settings sections and drives the composite until shutdown
//!
//! ```rust,ignore
//! use mosaic_runtime::MosaicRuntime;
//!
//! let runtime = MosaicRuntime::builder()
//!     .profile("production")
//!     .register_plugin(host_plugin()?)
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, MosaicConfig, Profile, RuntimeConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents};
pub use runtime::{MosaicRuntime, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;
