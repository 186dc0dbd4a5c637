//! Built-in simulated device units.
//!
//! - [`loopback`] - mirrors the input block into the output block
//! - [`heartbeat`] - counts cycles and accumulates scaled simulation time
//!
//! # Adding New Units
//!
//! 1. Create a new submodule under `units/`
//! 2. Implement the `DeviceUnit` trait from `simio_common::unit::driver`
//! 3. Register its constructor in [`register_builtin_units`]

pub mod heartbeat;
pub mod loopback;

use crate::unit_registry::UnitRegistry;

pub use heartbeat::HeartbeatUnit;
pub use loopback::LoopbackUnit;

/// Register every built-in unit kind.
pub fn register_builtin_units(registry: &mut UnitRegistry) {
    registry.register(loopback::KIND, loopback::create_unit);
    registry.register(heartbeat::KIND, heartbeat::create_unit);
}
