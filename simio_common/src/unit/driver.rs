//! Device-unit trait and error types.
//!
//! This module defines:
//! - `DeviceUnit` trait - Interface implemented by every simulated device
//! - `UnitError` enum - Error types for unit operations
//! - `UnitFactory` type alias - Constructor stored in the unit registry
//! - `UnitSetup` / `UnitIo` - What the configure and update steps see

use crate::layout::IoLayout;
use crate::unit::config::UnitConfig;
use crate::unit::state::{IoMode, UnitState};
use std::time::Duration;
use thiserror::Error;

/// Error types for device-unit operations.
#[derive(Debug, Clone, Error)]
pub enum UnitError {
    /// No constructor registered under this kind
    #[error("Unit kind not found: {0}")]
    KindNotFound(String),

    /// Configuration step rejected the setup
    #[error("Configuration failed: {0}")]
    Config(String),

    /// One-time start step failed
    #[error("Start failed: {0}")]
    StartFailed(String),

    /// Update step failed for one cycle
    #[error("Update failed: {0}")]
    Update(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Unit '{unit}' cannot {operation} while {state}")]
    InvalidState {
        /// Unit name
        unit: String,
        /// Attempted operation
        operation: &'static str,
        /// Current state
        state: UnitState,
    },

    /// Unit instance lost (cycle thread panicked)
    #[error("Unit '{0}' is unavailable")]
    Unavailable(String),

    /// Cycle thread could not be spawned
    #[error("Failed to spawn cycle thread: {0}")]
    Spawn(String),
}

/// Constructor function stored in the unit registry.
pub type UnitFactory = fn() -> Box<dyn DeviceUnit>;

/// Everything the configuration step may inspect.
///
/// Layouts are rebuilt for every configuration pass.
#[derive(Debug)]
pub struct UnitSetup<'a> {
    /// Unit configuration, including free-form `params`.
    pub config: &'a UnitConfig,
    /// Resolved I/O mode.
    pub mode: IoMode,
    /// Input block layout (empty in `IoMode::None`).
    pub inputs: &'a IoLayout,
    /// Output block layout (empty in `IoMode::None`).
    pub outputs: &'a IoLayout,
}

/// Per-cycle view handed to the update step.
#[derive(Debug)]
pub struct UnitIo<'a> {
    /// Latest input buffer pulled from the channel registry.
    pub inputs: &'a [u8],
    /// Output buffer pushed to the channel registry after the update.
    pub outputs: &'a mut [u8],
    /// Zero-based cycle index since start.
    pub cycle: u64,
    /// Wall-clock time since the previous cycle.
    pub dt: Duration,
    /// Simulation time-scale factor from the control plane.
    pub time_scale: f64,
}

impl UnitIo<'_> {
    /// `dt` multiplied by the time-scale factor.
    pub fn scaled_dt(&self) -> Duration {
        self.dt.mul_f64(self.time_scale)
    }
}

/// A simulated field device driven by the cycle loop.
///
/// # Lifecycle
///
/// 1. `configure()` - on every start, before channels are bound
/// 2. `on_start()` - once after a successful configure
/// 3. `update()` - every period on the unit's cycle thread
/// 4. `on_stop()` - after the cycle loop exited
///
/// # Timing Contracts
///
/// | Operation | Thread | RT Constraint |
/// |-----------|--------|---------------|
/// | `configure()` | caller of `start()` | None |
/// | `on_start()` | caller of `start()` | None |
/// | `update()` | cycle thread | must finish within `period_ms` |
/// | `on_stop()` | caller of `stop()` | None |
///
/// A failing `configure()` or `on_start()` aborts the start. A failing
/// `update()` is logged and the loop continues with the next period.
pub trait DeviceUnit: Send {
    /// Registry kind of this unit (e.g. `"loopback"`).
    fn kind(&self) -> &'static str;

    /// Validate the setup and prepare internal state.
    ///
    /// # Errors
    /// Return `UnitError::Config` to abort the start.
    fn configure(&mut self, setup: &UnitSetup<'_>) -> Result<(), UnitError>;

    /// One-time start step, after `configure()`.
    fn on_start(&mut self) -> Result<(), UnitError> {
        Ok(())
    }

    /// Execute one cycle: read `io.inputs`, write `io.outputs`.
    fn update(&mut self, io: &mut UnitIo<'_>) -> Result<(), UnitError>;

    /// Release resources after the loop exited.
    fn on_stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_error_display() {
        let err = UnitError::KindNotFound("pump".to_string());
        assert!(err.to_string().contains("pump"));

        let err = UnitError::InvalidState {
            unit: "press".to_string(),
            operation: "start",
            state: UnitState::Running,
        };
        assert_eq!(err.to_string(), "Unit 'press' cannot start while running");
    }

    #[test]
    fn scaled_dt_applies_factor() {
        let mut out = [0u8; 0];
        let io = UnitIo {
            inputs: &[],
            outputs: &mut out,
            cycle: 0,
            dt: Duration::from_millis(10),
            time_scale: 2.5,
        };
        assert_eq!(io.scaled_dt(), Duration::from_millis(25));
    }
}
