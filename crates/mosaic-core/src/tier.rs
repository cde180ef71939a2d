//! Plugin category tiers and the visibility rules between them.
//!
//! Tiers are ordered `Core < App < Host`. Two independent relations are
//! defined over them:
//!
//! - **Service dependencies** point *down* the stack: a module may depend on
//!   modules of its own tier or any lower tier ([`Tier::can_depend_on`]).
//! - **Known-type discovery** looks *up* the stack: a module receives
//!   implementations contributed by its own tier or any higher tier
//!   ([`Tier::can_discover`]). Core modules therefore see every plugin's
//!   types, while the Host sees only its own.
//!
//! ```text
//!            depend_on            discover
//!   Host  ── Core App Host        Host
//!   App   ── Core App             App Host
//!   Core  ── Core                 Core App Host
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a plugin. Determines lifecycle ordering and visibility scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Foundational plugins started first and stopped last.
    Core,
    /// Application plugins.
    App,
    /// The single hosting plugin, started last and stopped first.
    Host,
}

impl Tier {
    /// Tiers in start order.
    pub const START_ORDER: [Tier; 3] = [Tier::Core, Tier::App, Tier::Host];

    /// Tiers in stop order (exact reverse of [`START_ORDER`](Self::START_ORDER)).
    pub const STOP_ORDER: [Tier; 3] = [Tier::Host, Tier::App, Tier::Core];

    const fn rank(self) -> u8 {
        match self {
            Tier::Core => 0,
            Tier::App => 1,
            Tier::Host => 2,
        }
    }

    /// Returns `true` if a module in `self` may resolve a service dependency
    /// against a module in `target`.
    pub const fn can_depend_on(self, target: Tier) -> bool {
        target.rank() <= self.rank()
    }

    /// Returns `true` if a module in `self` receives known-type instances
    /// built from types contributed by `target`.
    pub const fn can_discover(self, target: Tier) -> bool {
        target.rank() >= self.rank()
    }

    /// Returns the tier name as used in logs and config.
    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::App => "app",
            Tier::Host => "host",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_visibility_points_down() {
        assert!(Tier::Core.can_depend_on(Tier::Core));
        assert!(!Tier::Core.can_depend_on(Tier::App));
        assert!(!Tier::Core.can_depend_on(Tier::Host));

        assert!(Tier::App.can_depend_on(Tier::Core));
        assert!(Tier::App.can_depend_on(Tier::App));
        assert!(!Tier::App.can_depend_on(Tier::Host));

        for target in Tier::START_ORDER {
            assert!(Tier::Host.can_depend_on(target));
        }
    }

    #[test]
    fn test_discovery_visibility_points_up() {
        for target in Tier::START_ORDER {
            assert!(Tier::Core.can_discover(target));
        }

        assert!(!Tier::App.can_discover(Tier::Core));
        assert!(Tier::App.can_discover(Tier::App));
        assert!(Tier::App.can_discover(Tier::Host));

        assert!(!Tier::Host.can_discover(Tier::Core));
        assert!(!Tier::Host.can_discover(Tier::App));
        assert!(Tier::Host.can_discover(Tier::Host));
    }

    #[test]
    fn test_stop_order_reverses_start_order() {
        let mut reversed = Tier::START_ORDER;
        reversed.reverse();
        assert_eq!(reversed, Tier::STOP_ORDER);
    }

    #[test]
    fn test_tier_deserializes_lowercase() {
        let tier: Tier = serde_json::from_str("\"host\"").unwrap();
        assert_eq!(tier, Tier::Host);
        assert_eq!(Tier::App.to_string(), "app");
    }
}
