//! Pre-flight validation of a plugin set.
//!
//! Checks run fail-fast in a fixed order so the reported code is stable for a
//! given input:
//!
//! 1. every identity is non-empty (`missing-identity`)
//! 2. identities are unique (`duplicate-identity`)
//! 3. every plugin has a name and assembly metadata (`missing-metadata`)
//! 4. exactly one Host plugin (`missing-host-plugin` / `multiple-host-plugins`)

use std::collections::HashMap;

use mosaic_core::{CompositeError, CompositeResult, ErrorCode, Plugin, Tier, TypeResolver};
use tracing::debug;

/// Validates plugin sets before composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeValidator;

impl CompositeValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates `plugins`, using `resolver` to read each plugin's crate
    /// description.
    pub fn validate(&self, plugins: &[Plugin], resolver: &dyn TypeResolver) -> CompositeResult<()> {
        Self::check_identities(plugins)?;
        Self::check_unique(plugins)?;
        Self::check_metadata(plugins, resolver)?;
        Self::check_host(plugins)?;
        debug!(plugins = plugins.len(), "Plugin set validated");
        Ok(())
    }

    fn check_identities(plugins: &[Plugin]) -> CompositeResult<()> {
        let anonymous: Vec<String> = plugins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.id().is_empty())
            .map(|(index, p)| format!("#{index} ({})", p.name()))
            .collect();
        if anonymous.is_empty() {
            return Ok(());
        }
        Err(CompositeError::validation(
            ErrorCode::MissingIdentity,
            format!("{} plugin(s) have no identity", anonymous.len()),
            anonymous,
        ))
    }

    fn check_unique(plugins: &[Plugin]) -> CompositeResult<()> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for plugin in plugins {
            *seen.entry(plugin.id().as_str()).or_default() += 1;
        }
        let mut duplicates: Vec<String> = seen
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(id, _)| id.to_string())
            .collect();
        if duplicates.is_empty() {
            return Ok(());
        }
        duplicates.sort();
        Err(CompositeError::validation(
            ErrorCode::DuplicateIdentity,
            format!("duplicate plugin identities: {}", duplicates.join(", ")),
            duplicates,
        ))
    }

    fn check_metadata(plugins: &[Plugin], resolver: &dyn TypeResolver) -> CompositeResult<()> {
        let incomplete: Vec<String> = plugins
            .iter()
            .filter(|p| {
                let description = resolver.describe_plugin(p);
                p.name().trim().is_empty()
                    || description.assembly.trim().is_empty()
                    || description.version.trim().is_empty()
            })
            .map(|p| p.id().to_string())
            .collect();
        if incomplete.is_empty() {
            return Ok(());
        }
        Err(CompositeError::validation(
            ErrorCode::MissingMetadata,
            format!(
                "plugins without name, assembly or version: {}",
                incomplete.join(", ")
            ),
            incomplete,
        ))
    }

    fn check_host(plugins: &[Plugin]) -> CompositeResult<()> {
        let hosts: Vec<String> = plugins
            .iter()
            .filter(|p| p.tier() == Tier::Host)
            .map(|p| p.id().to_string())
            .collect();
        match hosts.len() {
            1 => Ok(()),
            0 => Err(CompositeError::validation(
                ErrorCode::MissingHostPlugin,
                "no host plugin registered; exactly one is required",
                Vec::new(),
            )),
            n => Err(CompositeError::validation(
                ErrorCode::MultipleHostPlugins,
                format!("{n} host plugins registered; exactly one is required"),
                hosts,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{CatalogTypeResolver, PluginMetadata};

    fn plugin(id: &str, tier: Tier) -> Plugin {
        Plugin::builder(id, format!("{id} plugin"), tier)
            .build()
            .unwrap()
    }

    fn validate(plugins: &[Plugin]) -> CompositeResult<()> {
        CompositeValidator::new().validate(plugins, &CatalogTypeResolver)
    }

    #[test]
    fn test_valid_set_passes() {
        let plugins = [plugin("core", Tier::Core), plugin("host", Tier::Host)];
        assert!(validate(&plugins).is_ok());
    }

    #[test]
    fn test_missing_identity() {
        let plugins = [plugin("", Tier::Core), plugin("host", Tier::Host)];
        assert_eq!(validate(&plugins).unwrap_err().code(), ErrorCode::MissingIdentity);
    }

    #[test]
    fn test_duplicate_identity_lists_offender() {
        let plugins = [
            plugin("core", Tier::Core),
            plugin("core", Tier::App),
            plugin("host", Tier::Host),
        ];
        let err = validate(&plugins).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateIdentity);
        assert_eq!(err.details(), ["core".to_string()]);
    }

    #[test]
    fn test_missing_metadata() {
        let nameless = Plugin::builder("core", "", Tier::Core).build().unwrap();
        let no_assembly = Plugin::builder("app", "App", Tier::App)
            .metadata(PluginMetadata::new("", "1.0.0"))
            .build()
            .unwrap();
        let no_version = Plugin::builder("host", "Host", Tier::Host)
            .metadata(PluginMetadata::new("host-crate", " "))
            .build()
            .unwrap();
        let plugins = [nameless, no_assembly, no_version];
        let err = validate(&plugins).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingMetadata);
        assert_eq!(
            err.details(),
            ["core".to_string(), "app".to_string(), "host".to_string()]
        );
    }

    #[test]
    fn test_host_cardinality() {
        let none = [plugin("core", Tier::Core)];
        assert_eq!(validate(&none).unwrap_err().code(), ErrorCode::MissingHostPlugin);

        let two = [plugin("h1", Tier::Host), plugin("h2", Tier::Host)];
        let err = validate(&two).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MultipleHostPlugins);
        assert_eq!(err.details().len(), 2);
    }

    #[test]
    fn test_checks_are_ordered() {
        // Both a duplicate identity and a missing host: the identity check wins.
        let plugins = [plugin("core", Tier::Core), plugin("core", Tier::Core)];
        assert_eq!(validate(&plugins).unwrap_err().code(), ErrorCode::DuplicateIdentity);
    }
}
