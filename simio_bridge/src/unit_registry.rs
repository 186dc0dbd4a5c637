//! Typed registry of device-unit constructors.
//!
//! Maps the `kind` string of a unit configuration to a constructor. The
//! `Bridge` checks a whole configuration against the registry before it
//! builds any unit, so a typo in `kind` is reported with the list of kinds
//! that would have been accepted.

use simio_common::config::ConfigError;
use simio_common::unit::config::BridgeConfig;
use simio_common::unit::driver::{DeviceUnit, UnitError, UnitFactory};
use std::collections::HashMap;
use tracing::debug;

use crate::units::register_builtin_units;

/// Registry of available device-unit kinds.
pub struct UnitRegistry {
    factories: HashMap<&'static str, UnitFactory>,
}

impl UnitRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in simulation units.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        register_builtin_units(&mut registry);
        registry
    }

    /// Register a unit constructor.
    ///
    /// # Panics
    /// Panics if a unit with the same kind is already registered.
    pub fn register(&mut self, kind: &'static str, factory: UnitFactory) {
        if self.factories.contains_key(kind) {
            panic!("Unit kind '{kind}' is already registered");
        }
        self.factories.insert(kind, factory);
    }

    /// Get a constructor by kind.
    pub fn get_factory(&self, kind: &str) -> Option<UnitFactory> {
        self.factories.get(kind).copied()
    }

    /// Construct a unit by kind.
    ///
    /// # Errors
    /// Returns `UnitError::KindNotFound` if no constructor is registered.
    pub fn create(&self, kind: &str) -> Result<Box<dyn DeviceUnit>, UnitError> {
        let factory = self
            .get_factory(kind)
            .ok_or_else(|| UnitError::KindNotFound(kind.to_string()))?;
        let unit = factory();
        debug!("Constructed '{}' unit for kind '{kind}'", unit.kind());
        Ok(unit)
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Check that every unit in `config` names a registered kind.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` naming the first unknown kind and the
    /// registered alternatives.
    pub fn check_kinds(&self, config: &BridgeConfig) -> Result<(), ConfigError> {
        match config
            .units
            .iter()
            .find(|unit| !self.factories.contains_key(unit.kind.as_str()))
        {
            Some(unit) => Err(ConfigError::ValidationError(format!(
                "unit '{}': unknown kind '{}' (registered: {})",
                unit.name,
                unit.kind,
                self.kinds().join(", ")
            ))),
            None => Ok(()),
        }
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simio_common::unit::driver::{UnitIo, UnitSetup};

    struct NullUnit;

    impl DeviceUnit for NullUnit {
        fn kind(&self) -> &'static str {
            "null"
        }

        fn configure(&mut self, _setup: &UnitSetup<'_>) -> Result<(), UnitError> {
            Ok(())
        }

        fn update(&mut self, _io: &mut UnitIo<'_>) -> Result<(), UnitError> {
            Ok(())
        }
    }

    fn create_null_unit() -> Box<dyn DeviceUnit> {
        Box::new(NullUnit)
    }

    #[test]
    fn register_and_create() {
        let mut reg = UnitRegistry::new();
        reg.register("null", create_null_unit);

        let unit = reg.create("null").expect("should create");
        assert_eq!(unit.kind(), "null");
    }

    #[test]
    fn unknown_kind() {
        let reg = UnitRegistry::new();
        assert!(matches!(
            reg.create("pump"),
            Err(UnitError::KindNotFound(kind)) if kind == "pump"
        ));
    }

    #[test]
    fn builtin_kinds_present() {
        assert_eq!(UnitRegistry::with_builtin().kinds(), vec!["heartbeat", "loopback"]);
    }

    #[test]
    fn check_kinds_lists_registered_alternatives() {
        use simio_common::unit::config::UnitConfig;

        let registry = UnitRegistry::with_builtin();
        let mut config = BridgeConfig::default();
        config.units.push(UnitConfig::new("belt", "loopback", 10));
        assert!(registry.check_kinds(&config).is_ok());

        config.units.push(UnitConfig::new("press", "loopbak", 10));
        let Err(ConfigError::ValidationError(msg)) = registry.check_kinds(&config) else {
            panic!("unknown kind accepted");
        };
        assert_eq!(
            msg,
            "unit 'press': unknown kind 'loopbak' (registered: heartbeat, loopback)"
        );
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_panics() {
        let mut reg = UnitRegistry::new();
        reg.register("dup", create_null_unit);
        reg.register("dup", create_null_unit);
    }
}
