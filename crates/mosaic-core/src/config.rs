//! Plugin configuration objects.
//!
//! A plugin declares its config types on the builder, either as a literal
//! value (`PluginBuilder::config`) or as a section deserialized from the
//! host's `plugins.<plugin-id>` settings (`PluginBuilder::settings`). The
//! composition engine materializes every declaration into a [`ConfigStore`],
//! which enforces global uniqueness of each config type on lookup.
//!
//! ```rust,ignore
//! #[derive(Default, serde::Deserialize)]
//! #[serde(default)]
//! struct GreeterConfig { greeting: String }
//!
//! let plugin = Plugin::builder("greeter", "Greeter", Tier::App)
//!     .settings::<GreeterConfig>()
//!     .build()?;
//! // in a hook:
//! let cfg = ctx.config::<GreeterConfig>()?;
//! ```

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::container::ServiceArc;
use crate::error::{CompositeError, CompositeResult, ErrorCode};
use crate::plugin::PluginId;

type SectionFn = fn(Option<&Value>) -> Result<ServiceArc, serde_json::Error>;

enum ConfigSource {
    Value(ServiceArc),
    Section(SectionFn),
}

fn from_section<T>(section: Option<&Value>) -> Result<ServiceArc, serde_json::Error>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    let config = match section {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::deserialize(value)?,
    };
    Ok(Arc::new(Arc::new(config)))
}

/// One config declaration of a plugin.
pub struct ConfigEntry {
    type_id: TypeId,
    type_name: &'static str,
    source: ConfigSource,
}

impl ConfigEntry {
    pub(crate) fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            source: ConfigSource::Value(Arc::new(Arc::new(value))),
        }
    }

    pub(crate) fn section<T>() -> Self
    where
        T: DeserializeOwned + Default + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            source: ConfigSource::Section(from_section::<T>),
        }
    }

    /// `TypeId` of the config type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Config type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Produces the erased `Arc<T>`, deserializing from `section` when the
    /// entry was declared through `settings`.
    pub fn materialize(&self, plugin: &PluginId, section: Option<&Value>) -> CompositeResult<ServiceArc> {
        match &self.source {
            ConfigSource::Value(value) => Ok(Arc::clone(value)),
            ConfigSource::Section(build) => build(section).map_err(|e| {
                CompositeError::configuration(
                    ErrorCode::ConfigInvalid,
                    format!(
                        "settings of plugin '{plugin}' do not match '{}'",
                        self.type_name
                    ),
                )
                .with_details(vec![plugin.to_string(), self.type_name.to_string()])
                .with_source(e)
            }),
        }
    }
}

impl fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            ConfigSource::Value(_) => "value",
            ConfigSource::Section(_) => "section",
        };
        f.debug_struct("ConfigEntry")
            .field("type", &self.type_name)
            .field("source", &source)
            .finish()
    }
}

// =============================================================================
// ConfigStore
// =============================================================================

struct StoredConfig {
    plugin: PluginId,
    type_name: &'static str,
    value: ServiceArc,
}

/// Materialized configs of every plugin in a composite.
#[derive(Default)]
pub struct ConfigStore {
    entries: HashMap<TypeId, Vec<StoredConfig>>,
}

impl ConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` (an erased `Arc<T>`) as provided by `plugin`.
    pub fn insert(&mut self, plugin: PluginId, type_id: TypeId, type_name: &'static str, value: ServiceArc) {
        self.entries.entry(type_id).or_default().push(StoredConfig {
            plugin,
            type_name,
            value,
        });
    }

    /// Returns the unique config of type `T`.
    ///
    /// Fails with `config-not-registered` when no plugin provides `T` and
    /// `config-ambiguous` when several do.
    pub fn get<T: Send + Sync + 'static>(&self) -> CompositeResult<Arc<T>> {
        let providers = self
            .entries
            .get(&TypeId::of::<T>())
            .map(Vec::as_slice)
            .unwrap_or_default();
        match providers {
            [] => Err(CompositeError::configuration(
                ErrorCode::ConfigNotRegistered,
                format!("no plugin registered config '{}'", type_name::<T>()),
            )
            .with_details(vec![type_name::<T>().to_string()])),
            [single] => downcast::<T>(single),
            many => Err(CompositeError::configuration(
                ErrorCode::ConfigAmbiguous,
                format!(
                    "config '{}' is registered by {} plugins",
                    type_name::<T>(),
                    many.len()
                ),
            )
            .with_details(many.iter().map(|c| c.plugin.to_string()).collect())),
        }
    }

    /// Returns the config of type `T` provided by `plugin`.
    pub fn for_plugin<T: Send + Sync + 'static>(&self, plugin: &PluginId) -> CompositeResult<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|all| all.iter().find(|c| &c.plugin == plugin))
            .ok_or_else(|| {
                CompositeError::configuration(
                    ErrorCode::ConfigNotRegistered,
                    format!("plugin '{plugin}' has no config '{}'", type_name::<T>()),
                )
                .with_details(vec![plugin.to_string(), type_name::<T>().to_string()])
            })
            .and_then(downcast::<T>)
    }

    /// Config types registered by exactly one plugin, as `(type, name, value)`.
    pub fn unique(&self) -> impl Iterator<Item = (TypeId, &'static str, &ServiceArc)> {
        self.entries.iter().filter_map(|(type_id, all)| match all.as_slice() {
            [single] => Some((*type_id, single.type_name, &single.value)),
            _ => None,
        })
    }

    /// Number of materialized configs.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if no config was materialized.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn downcast<T: Send + Sync + 'static>(stored: &StoredConfig) -> CompositeResult<Arc<T>> {
    stored
        .value
        .downcast_ref::<Arc<T>>()
        .map(Arc::clone)
        .ok_or_else(|| {
            CompositeError::configuration(
                ErrorCode::ConfigInvalid,
                format!("stored config does not match '{}'", type_name::<T>()),
            )
        })
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("configs", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Greeting {
        text: String,
        repeat: u32,
    }

    fn store_with(entries: &[(&str, ConfigEntry, Option<Value>)]) -> CompositeResult<ConfigStore> {
        let mut store = ConfigStore::new();
        for (plugin, entry, section) in entries {
            let id = PluginId::new(*plugin);
            let value = entry.materialize(&id, section.as_ref())?;
            store.insert(id, entry.type_id(), entry.type_name(), value);
        }
        Ok(store)
    }

    #[test]
    fn test_section_is_deserialized() {
        let store = store_with(&[(
            "greeter",
            ConfigEntry::section::<Greeting>(),
            Some(json!({ "text": "hi", "repeat": 2 })),
        )])
        .unwrap();
        let cfg = store.get::<Greeting>().unwrap();
        assert_eq!(cfg.text, "hi");
        assert_eq!(cfg.repeat, 2);
    }

    #[test]
    fn test_absent_section_uses_default() {
        let store = store_with(&[("greeter", ConfigEntry::section::<Greeting>(), None)]).unwrap();
        assert_eq!(*store.get::<Greeting>().unwrap(), Greeting::default());
    }

    #[test]
    fn test_malformed_section_is_config_invalid() {
        let err = store_with(&[(
            "greeter",
            ConfigEntry::section::<Greeting>(),
            Some(json!({ "repeat": "twice" })),
        )])
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
        assert_eq!(err.details()[0], "greeter");
    }

    #[test]
    fn test_lookup_enforces_global_uniqueness() {
        let store = store_with(&[
            ("a", ConfigEntry::value(Greeting::default()), None),
            ("b", ConfigEntry::value(Greeting::default()), None),
        ])
        .unwrap();
        let err = store.get::<Greeting>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigAmbiguous);
        assert_eq!(err.details(), ["a".to_string(), "b".to_string()]);
        assert!(store.for_plugin::<Greeting>(&PluginId::new("b")).is_ok());
        assert_eq!(store.unique().count(), 0);

        let err = store.get::<u64>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigNotRegistered);
    }
}
