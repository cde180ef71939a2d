//! Host glue: configuration, logging and the run loop around a composite.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mosaic_runtime::MosaicRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = MosaicRuntime::builder()
//!         .config_file("config/mosaic.toml")
//!         .register_plugin(storage::plugin()?)
//!         .register_plugin(host::plugin()?)
//!         .build()?;
//!
//!     // Starts every tier, waits for Ctrl+C or SIGTERM, then stops.
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::Path;

use mosaic_core::Plugin;
use mosaic_framework::{Composite, CompositeBuilder};
use tokio::signal;
use tracing::{debug, info, warn};

use crate::config::{ConfigLoader, MosaicConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging::{self, LoggingError};

/// A composed application together with the configuration it was built from.
pub struct MosaicRuntime {
    config: MosaicConfig,
    composite: Composite,
}

impl MosaicRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, installs logging and composes `plugins`.
    ///
    /// Each `plugins.<id>` section of the configuration becomes the settings
    /// section of the plugin with that identity.
    pub fn from_config(config: MosaicConfig, plugins: Vec<Plugin>) -> RuntimeResult<Self> {
        validate_config(&config)?;
        install_logging(&config)?;

        let composite = CompositeBuilder::new()
            .register_plugins(plugins)
            .plugin_settings(config.plugins.clone())
            .claim_current(config.runtime.claim_current)
            .compose()?;

        info!(
            log_level = %config.logging.level,
            plugins = composite.plugins().len(),
            modules = composite.modules().len(),
            "Runtime initialized"
        );
        Ok(Self { config, composite })
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    pub fn composite(&self) -> &Composite {
        &self.composite
    }

    pub fn is_running(&self) -> bool {
        self.composite.is_started()
    }

    /// Starts the composite. On failure, modules that did start are stopped
    /// again before the start error is returned.
    pub async fn start(&self) -> RuntimeResult<()> {
        if let Err(e) = self.composite.start().await {
            if let Err(stop_error) = self.composite.stop().await {
                warn!(error = %stop_error, "Cleanup after failed start reported faults");
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn stop(&self) -> RuntimeResult<()> {
        self.composite.stop().await?;
        Ok(())
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Mosaic runtime is running. Press Ctrl+C to stop.");

        let signalled = wait_for_shutdown().await;
        let stopped = self.stop().await;
        signalled?;
        stopped
    }

    /// Starts, waits for `shutdown`, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        debug!("Shutdown requested");
        self.stop().await
    }
}

impl std::fmt::Debug for MosaicRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MosaicRuntime")
            .field("composite", &self.composite)
            .finish_non_exhaustive()
    }
}

/// A subscriber installed earlier (by the host or a previous runtime) is
/// kept.
fn install_logging(config: &MosaicConfig) -> Result<(), LoggingError> {
    match logging::init_from_config(&config.logging) {
        Err(LoggingError::Init(e)) => {
            debug!(error = %e, "Global subscriber already installed");
            Ok(())
        }
        other => other,
    }
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`MosaicRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    plugins: Vec<Plugin>,
}

impl RuntimeBuilder {
    /// Searches the current directory for configuration by default.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            plugins: Vec::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: MosaicConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn register_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn register_plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Loads the configuration and composes the registered plugins.
    pub fn build(self) -> RuntimeResult<MosaicRuntime> {
        let config = self.config_loader.load()?;
        MosaicRuntime::from_config(config, self.plugins)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use mosaic_core::{
        BoxError, ErrorCode, Module, ModuleContext, PluginMetadata, ServiceScope, Tier,
    };
    use mosaic_framework::RuntimeState;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    use crate::config::ConfigError;
    use crate::error::RuntimeError;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct GreeterSettings {
        greeting: String,
    }

    struct Greeter {
        log: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
    }

    #[async_trait]
    impl Module for Greeter {
        async fn start(&self, ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
            if self.fail_start {
                return Err("refusing to start".into());
            }
            let settings = ctx.settings::<GreeterSettings>()?;
            self.log.lock().push(format!("start:{}", settings.greeting));
            Ok(())
        }

        async fn stop(&self, _ctx: &ModuleContext, _scope: &ServiceScope) -> Result<(), BoxError> {
            self.log.lock().push("stop".into());
            Ok(())
        }
    }

    fn plugin(id: &str, tier: Tier, module: Greeter) -> Plugin {
        Plugin::builder(id, id, tier)
            .metadata(PluginMetadata::new("mosaic-runtime-tests", "0.0.0"))
            .module(module)
            .settings::<GreeterSettings>()
            .build()
            .unwrap()
    }

    fn quiet_builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
            .without_env()
            .search_path(std::env::temp_dir().join("mosaic-runtime-tests-no-config"))
    }

    #[tokio::test]
    async fn test_run_until_applies_plugin_settings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut config = MosaicConfig::default();
        config
            .plugins
            .insert("greeter".into(), json!({ "greeting": "hello" }));

        let runtime = quiet_builder()
            .merge(config)
            .register_plugin(plugin(
                "greeter",
                Tier::Host,
                Greeter {
                    log: Arc::clone(&log),
                    fail_start: false,
                },
            ))
            .build()
            .unwrap();

        assert_eq!(
            runtime.config().plugins["greeter"]["greeting"],
            json!("hello")
        );
        assert_eq!(
            *runtime
                .composite()
                .plugin_config::<GreeterSettings>()
                .unwrap(),
            GreeterSettings {
                greeting: "hello".into()
            }
        );

        runtime.run_until(async {}).await.unwrap();
        assert_eq!(*log.lock(), ["start:hello", "stop"]);
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_failed_start_releases_started_modules() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = quiet_builder()
            .register_plugin(plugin(
                "base",
                Tier::Core,
                Greeter {
                    log: Arc::clone(&log),
                    fail_start: false,
                },
            ))
            .register_plugin(plugin(
                "host",
                Tier::Host,
                Greeter {
                    log: Arc::clone(&log),
                    fail_start: true,
                },
            ))
            .build()
            .unwrap();

        let err = runtime.start().await.unwrap_err();
        assert_eq!(
            err.as_composite().map(|e| e.code()),
            Some(ErrorCode::StartFailed)
        );
        assert_eq!(*log.lock(), ["start:", "stop"]);
        assert_eq!(runtime.composite().state(), RuntimeState::Stopped);
    }

    #[test]
    fn test_composition_errors_surface() {
        let err = quiet_builder().build().unwrap_err();
        assert_eq!(
            err.as_composite().map(|e| e.code()),
            Some(ErrorCode::MissingHostPlugin)
        );
    }

    #[test]
    fn test_invalid_config_is_rejected_before_composing() {
        let mut config = MosaicConfig::default();
        config.plugins.insert("two words".into(), json!({}));

        let err = quiet_builder().merge(config).build().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::InvalidPluginId(_))
        ));
    }
}
