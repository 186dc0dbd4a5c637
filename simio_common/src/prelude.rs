//! Prelude module for common re-exports.
//!
//! ```rust
//! use simio_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, Validate};
pub use crate::unit::config::{BridgeConfig, FieldConfig, UnitConfig, UnitIoConfig};

// ─── Wire constants ─────────────────────────────────────────────────
pub use crate::consts::{RECORD_CHANNEL, RECORD_FALLBACK_STATUS, RECORD_OK_STATUS};

// ─── I/O layout ─────────────────────────────────────────────────────
pub use crate::layout::{FieldKind, IoLayout, LayoutField};

// ─── Device units ───────────────────────────────────────────────────
pub use crate::unit::driver::{DeviceUnit, UnitError, UnitFactory, UnitIo, UnitSetup};
pub use crate::unit::state::{IoMode, LifecycleEvent, LifecycleNotice, UnitState};

// ─── Record data ────────────────────────────────────────────────────
pub use crate::record::{RecordDataRequest, RecordEvent, SubscriptionKey};
