//! Loopback unit: every cycle, the output block becomes a copy of the
//! input block (common prefix; the remainder of a longer output is zeroed).
//!
//! Useful for wiring checks against a simulation peer: whatever the peer
//! sends on a channel comes back one period later.

use simio_common::unit::driver::{DeviceUnit, UnitError, UnitIo, UnitSetup};
use tracing::debug;

/// Registry kind.
pub const KIND: &str = "loopback";

/// Constructor stored in the unit registry.
pub fn create_unit() -> Box<dyn DeviceUnit> {
    Box::new(LoopbackUnit::default())
}

/// Mirrors inputs to outputs.
#[derive(Debug, Default)]
pub struct LoopbackUnit {
    mirrored: usize,
}

impl DeviceUnit for LoopbackUnit {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn configure(&mut self, setup: &UnitSetup<'_>) -> Result<(), UnitError> {
        self.mirrored = setup.inputs.byte_len().min(setup.outputs.byte_len());
        if setup.inputs.byte_len() != setup.outputs.byte_len() {
            debug!(
                "Loopback '{}': input {} bytes, output {} bytes, mirroring {}",
                setup.config.name,
                setup.inputs.byte_len(),
                setup.outputs.byte_len(),
                self.mirrored
            );
        }
        Ok(())
    }

    fn update(&mut self, io: &mut UnitIo<'_>) -> Result<(), UnitError> {
        let n = self.mirrored.min(io.inputs.len()).min(io.outputs.len());
        io.outputs[..n].copy_from_slice(&io.inputs[..n]);
        io.outputs[n..].fill(0);
        Ok(())
    }
}
