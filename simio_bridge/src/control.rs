//! Control-plane events and the shared simulation time scale.
//!
//! The control plane itself (its transport and framing) lives outside the
//! bridge. It hands decoded events to [`crate::bridge::Bridge::apply`]:
//! a configuration reload or a new time-scale factor.

use simio_common::unit::config::BridgeConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Event delivered by the control plane.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Replace the unit configuration: stop all units, rebuild, auto-start.
    Reload(BridgeConfig),
    /// New simulation time-scale factor (> 0, finite).
    TimeScale(f64),
}

/// Time-scale factor shared by every cycle loop.
///
/// Stored as `f64` bits in an atomic; readers on the cycle threads never
/// block.
#[derive(Debug, Clone)]
pub struct TimeScale(Arc<AtomicU64>);

impl TimeScale {
    /// Real time (factor 1.0).
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1.0f64.to_bits())))
    }

    /// Current factor.
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set a new factor. Non-finite or non-positive values are ignored.
    ///
    /// Returns `true` if the value was accepted.
    pub fn set(&self, factor: f64) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            warn!("Ignoring invalid time scale {}", factor);
            return false;
        }
        self.0.store(factor.to_bits(), Ordering::Relaxed);
        true
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_real_time() {
        assert_eq!(TimeScale::new().get(), 1.0);
    }

    #[test]
    fn clones_share_the_value() {
        let scale = TimeScale::new();
        let reader = scale.clone();
        assert!(scale.set(2.5));
        assert_eq!(reader.get(), 2.5);
    }

    #[test]
    fn rejects_invalid_factors() {
        let scale = TimeScale::new();
        assert!(!scale.set(0.0));
        assert!(!scale.set(-1.0));
        assert!(!scale.set(f64::NAN));
        assert!(!scale.set(f64::INFINITY));
        assert_eq!(scale.get(), 1.0);
    }
}
