//! Error taxonomy for composition and lifecycle failures.
//!
//! Every failure raised by the engine is a [`CompositeError`] carrying a
//! stable, machine-readable [`ErrorCode`]. Hosts and tests branch on
//! `error.code()` (or `error.code().as_str()`) rather than on messages.
//!
//! | Kind | Raised by | Recoverable |
//! |------|-----------|-------------|
//! | [`ErrorKind::Validation`] | pre-flight plugin checks, plugin construction | no |
//! | [`ErrorKind::Composition`] | dependency resolution, known-type composition, initialize/configure | no |
//! | [`ErrorKind::Lifecycle`] | start / run / stop, access to a composite that is not running | caller decides |
//! | [`ErrorKind::Configuration`] | plugin config lookup and materialisation | caller decides |

use std::fmt;

use thiserror::Error;

use crate::module::LifecyclePhase;
use crate::plugin::PluginId;

/// Boxed error returned by module hooks and instance factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// ErrorKind / ErrorCode
// =============================================================================

/// Broad category of a [`CompositeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Pre-flight invariant violation.
    Validation,
    /// Failure while wiring plugins together.
    Composition,
    /// Failure while starting, running or stopping the composite.
    Lifecycle,
    /// Plugin configuration missing, ambiguous or malformed.
    Configuration,
}

/// Stable short code identifying exactly which invariant was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ─── Validation ──────────────────────────────────────────────────────────
    /// A plugin has an empty identity.
    MissingIdentity,
    /// Two or more plugins share an identity.
    DuplicateIdentity,
    /// A plugin has an empty name, assembly or version.
    MissingMetadata,
    /// No plugin of tier Host was registered.
    MissingHostPlugin,
    /// More than one plugin of tier Host was registered.
    MultipleHostPlugins,
    /// The same module type was added twice to one plugin.
    DuplicateModule,
    /// The same type was exported twice by one plugin.
    DuplicateExport,

    // ─── Composition ─────────────────────────────────────────────────────────
    /// No module implements a required service contract.
    ServiceNotFound,
    /// Implementers exist, but none in a tier the requester may depend on.
    ServiceNotVisible,
    /// More than one visible module implements a required service contract.
    AmbiguousService,
    /// A known-type factory or scoped service factory failed.
    InstantiationFailed,
    /// A slot was offered a second value.
    SlotAlreadyAssigned,
    /// A module's `initialize` hook failed.
    ModuleInitializeFailed,
    /// A module's `configure` hook failed.
    ModuleConfigureFailed,
    /// A module's service registration hook failed.
    ServiceRegistrationFailed,

    // ─── Lifecycle ───────────────────────────────────────────────────────────
    /// `start` was called on a composite that is starting or started.
    AlreadyStarted,
    /// `start` was called on a composite that has been stopped.
    CompositeStopped,
    /// `start` was called on a composite whose previous start failed.
    CompositeFaulted,
    /// An operation requiring a running composite was invoked while not started.
    NotStarted,
    /// One or more module start hooks failed.
    StartFailed,
    /// One or more module run hooks failed.
    RunFailed,
    /// One or more module stop hooks failed.
    StopFailed,
    /// A module was asked to move to a lifecycle state it cannot reach.
    InvalidTransition,
    /// The process-wide current composite is not available.
    CompositeUnavailable,
    /// Another composite already holds the process-wide slot.
    CompositeSlotClaimed,
    /// No service of the requested type is registered in the container.
    ServiceNotRegistered,

    // ─── Configuration ───────────────────────────────────────────────────────
    /// No plugin registered the requested config type.
    ConfigNotRegistered,
    /// More than one plugin registered the requested config type.
    ConfigAmbiguous,
    /// A config section could not be deserialised.
    ConfigInvalid,
    /// The same config type was added twice to one plugin.
    DuplicateConfig,
}

impl ErrorCode {
    /// Returns the stable kebab-case code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingIdentity => "missing-identity",
            Self::DuplicateIdentity => "duplicate-identity",
            Self::MissingMetadata => "missing-metadata",
            Self::MissingHostPlugin => "missing-host-plugin",
            Self::MultipleHostPlugins => "multiple-host-plugins",
            Self::DuplicateModule => "duplicate-module",
            Self::DuplicateExport => "duplicate-export",
            Self::ServiceNotFound => "service-not-found",
            Self::ServiceNotVisible => "service-not-visible",
            Self::AmbiguousService => "ambiguous-service",
            Self::InstantiationFailed => "instantiation-failed",
            Self::SlotAlreadyAssigned => "slot-already-assigned",
            Self::ModuleInitializeFailed => "module-initialize-failed",
            Self::ModuleConfigureFailed => "module-configure-failed",
            Self::ServiceRegistrationFailed => "service-registration-failed",
            Self::AlreadyStarted => "already-started",
            Self::CompositeStopped => "composite-stopped",
            Self::CompositeFaulted => "composite-faulted",
            Self::NotStarted => "not-started",
            Self::StartFailed => "start-failed",
            Self::RunFailed => "run-failed",
            Self::StopFailed => "stop-failed",
            Self::InvalidTransition => "invalid-transition",
            Self::CompositeUnavailable => "composite-unavailable",
            Self::CompositeSlotClaimed => "composite-slot-claimed",
            Self::ServiceNotRegistered => "service-not-registered",
            Self::ConfigNotRegistered => "config-not-registered",
            Self::ConfigAmbiguous => "config-ambiguous",
            Self::ConfigInvalid => "config-invalid",
            Self::DuplicateConfig => "duplicate-config",
        }
    }

    /// Returns the kind this code belongs to.
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::MissingIdentity
            | Self::DuplicateIdentity
            | Self::MissingMetadata
            | Self::MissingHostPlugin
            | Self::MultipleHostPlugins
            | Self::DuplicateModule
            | Self::DuplicateExport => ErrorKind::Validation,
            Self::ServiceNotFound
            | Self::ServiceNotVisible
            | Self::AmbiguousService
            | Self::InstantiationFailed
            | Self::SlotAlreadyAssigned
            | Self::ModuleInitializeFailed
            | Self::ModuleConfigureFailed
            | Self::ServiceRegistrationFailed => ErrorKind::Composition,
            Self::AlreadyStarted
            | Self::CompositeStopped
            | Self::CompositeFaulted
            | Self::NotStarted
            | Self::StartFailed
            | Self::RunFailed
            | Self::StopFailed
            | Self::InvalidTransition
            | Self::CompositeUnavailable
            | Self::CompositeSlotClaimed
            | Self::ServiceNotRegistered => ErrorKind::Lifecycle,
            Self::ConfigNotRegistered
            | Self::ConfigAmbiguous
            | Self::ConfigInvalid
            | Self::DuplicateConfig => ErrorKind::Configuration,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ModuleFault
// =============================================================================

/// One failed module hook inside a concurrent lifecycle fan-out.
#[derive(Debug, Error)]
#[error("module '{module}' of plugin '{plugin}' failed during {phase}: {error}")]
pub struct ModuleFault {
    /// Owning plugin.
    pub plugin: PluginId,
    /// Module display name.
    pub module: String,
    /// Hook that failed.
    pub phase: LifecyclePhase,
    /// The hook's error, or a description of the task panic.
    #[source]
    pub error: BoxError,
}

// =============================================================================
// CompositeError
// =============================================================================

/// Errors raised by composition and lifecycle operations.
#[derive(Debug, Error)]
pub enum CompositeError {
    /// Pre-flight invariant violation. Raised before any module hook runs.
    #[error("validation failed ({code}): {message}")]
    Validation {
        /// Stable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Offending identifiers.
        details: Vec<String>,
    },

    /// Composition aborted. The builder that produced it is consumed.
    #[error("composition failed ({code}): {message}")]
    Composition {
        /// Stable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Offending contracts, modules or types.
        details: Vec<String>,
        /// Original cause, when the failure came from a hook or factory.
        #[source]
        source: Option<BoxError>,
    },

    /// Start / run / stop failure or access to a composite that is not running.
    #[error("lifecycle error ({code}): {message}")]
    Lifecycle {
        /// Stable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Every module fault collected from the fan-out.
        faults: Vec<ModuleFault>,
    },

    /// Plugin configuration missing, ambiguous or malformed.
    #[error("configuration error ({code}): {message}")]
    Configuration {
        /// Stable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Plugins or types involved.
        details: Vec<String>,
        /// Deserialisation failure, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl CompositeError {
    /// Creates a validation error.
    pub fn validation(code: ErrorCode, message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            details,
        }
    }

    /// Creates a composition error without a cause.
    pub fn composition(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Composition {
            code,
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    /// Creates a lifecycle error carrying module faults.
    pub fn lifecycle(code: ErrorCode, message: impl Into<String>, faults: Vec<ModuleFault>) -> Self {
        Self::Lifecycle {
            code,
            message: message.into(),
            faults,
        }
    }

    /// Creates a configuration error without a cause.
    pub fn configuration(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Configuration {
            code,
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    /// Replaces the detail list. No effect on lifecycle errors.
    pub fn with_details(mut self, items: Vec<String>) -> Self {
        match &mut self {
            Self::Validation { details, .. }
            | Self::Composition { details, .. }
            | Self::Configuration { details, .. } => *details = items,
            Self::Lifecycle { .. } => {}
        }
        self
    }

    /// Attaches the original cause. No effect on validation and lifecycle errors.
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::Composition { source, .. } | Self::Configuration { source, .. } => {
                *source = Some(cause.into());
            }
            Self::Validation { .. } | Self::Lifecycle { .. } => {}
        }
        self
    }

    /// Returns the stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. }
            | Self::Composition { code, .. }
            | Self::Lifecycle { code, .. }
            | Self::Configuration { code, .. } => *code,
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Composition { .. } => ErrorKind::Composition,
            Self::Lifecycle { .. } => ErrorKind::Lifecycle,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns the human-readable message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Composition { message, .. }
            | Self::Lifecycle { message, .. }
            | Self::Configuration { message, .. } => message,
        }
    }

    /// Returns the structured detail list (empty for lifecycle errors).
    pub fn details(&self) -> &[String] {
        match self {
            Self::Validation { details, .. }
            | Self::Composition { details, .. }
            | Self::Configuration { details, .. } => details,
            Self::Lifecycle { .. } => &[],
        }
    }

    /// Returns the aggregated module faults (empty unless lifecycle).
    pub fn faults(&self) -> &[ModuleFault] {
        match self {
            Self::Lifecycle { faults, .. } => faults,
            _ => &[],
        }
    }
}

/// Result type for composition and lifecycle operations.
pub type CompositeResult<T> = Result<T, CompositeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings_are_stable() {
        assert_eq!(ErrorCode::MissingHostPlugin.as_str(), "missing-host-plugin");
        assert_eq!(ErrorCode::AmbiguousService.to_string(), "ambiguous-service");
        assert_eq!(ErrorCode::AlreadyStarted.as_str(), "already-started");
    }

    #[test]
    fn test_code_kind_matches_variant() {
        let err = CompositeError::validation(
            ErrorCode::DuplicateIdentity,
            "duplicate",
            vec!["a".into()],
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code().kind(), err.kind());
        assert_eq!(err.details(), ["a".to_string()]);
    }

    #[test]
    fn test_composition_error_keeps_source() {
        use std::error::Error as _;

        let err = CompositeError::composition(ErrorCode::ModuleInitializeFailed, "init failed")
            .with_source("disk full");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
        assert!(err.to_string().contains("module-initialize-failed"));
    }

    #[test]
    fn test_lifecycle_error_enumerates_faults() {
        let faults = vec![
            ModuleFault {
                plugin: PluginId::new("core"),
                module: "a".into(),
                phase: LifecyclePhase::Start,
                error: "boom".into(),
            },
            ModuleFault {
                plugin: PluginId::new("core"),
                module: "b".into(),
                phase: LifecyclePhase::Start,
                error: "bang".into(),
            },
        ];
        let err = CompositeError::lifecycle(ErrorCode::StartFailed, "2 modules failed", faults);
        assert_eq!(err.faults().len(), 2);
        assert!(err.details().is_empty());
        assert!(err.faults()[1].to_string().contains("bang"));
    }
}
