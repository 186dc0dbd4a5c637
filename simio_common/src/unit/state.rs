//! Device-unit lifecycle states and notifications.
//!
//! ```text
//! Idle ──start──► Starting ──configured──► Running ──stop──► Stopping ──► Stopped
//!                    │                                                    │
//!                    └──────────── configure/start failed ───────────────►│
//!                                                                         │
//!                    ◄───────────────────────── start ────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a device unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitState {
    /// Never started: no buffers bound, no thread.
    #[default]
    Idle,
    /// Configuration step in progress.
    Starting,
    /// Channels bound, cycle loop running.
    Running,
    /// Cancellation requested, waiting for the loop to exit.
    Stopping,
    /// Loop exited and channels released.
    Stopped,
}

impl UnitState {
    /// `start()` is only accepted from `Idle` or `Stopped`.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }

    /// `true` while a cycle thread exists.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How a unit's I/O buffers are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoMode {
    /// No process data exchanged.
    None,
    /// Byte ranges given by an address count.
    AddressMapped,
    /// Buffers sized by an `IoLayout`.
    Structured,
}

impl IoMode {
    /// Whether the cycle loop copies buffers to and from the registry.
    pub const fn exchanges_data(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Lifecycle transition, fired at most once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Entered `Starting`.
    Starting,
    /// Entered `Running`.
    Started,
    /// Entered `Stopping`.
    Stopping,
    /// Entered `Stopped` (after a stop or an aborted start).
    Stopped,
}

/// Lifecycle event tagged with the unit's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleNotice {
    /// Unit (channel) name.
    pub unit: String,
    /// Transition.
    pub event: LifecycleEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_accepted_only_from_idle_or_stopped() {
        assert!(UnitState::Idle.can_start());
        assert!(UnitState::Stopped.can_start());
        assert!(!UnitState::Starting.can_start());
        assert!(!UnitState::Running.can_start());
        assert!(!UnitState::Stopping.can_start());
    }

    #[test]
    fn only_none_mode_skips_exchange() {
        assert!(!IoMode::None.exchanges_data());
        assert!(IoMode::AddressMapped.exchanges_data());
        assert!(IoMode::Structured.exchanges_data());
    }

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(UnitState::Running.to_string(), "running");
        assert_eq!(UnitState::default(), UnitState::Idle);
    }
}
