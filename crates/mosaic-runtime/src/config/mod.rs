//! Configuration for the Mosaic runtime.
//!
//! Loads `mosaic.toml` / `mosaic.yaml` plus `MOSAIC_*` environment variables
//! through figment, validates the result and hands the `plugins` sections to
//! the composite builder.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, MosaicConfig, RuntimeConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
