//! Bridge and device-unit configuration.
//!
//! - `BridgeConfig` - top-level document (`bridge.toml`)
//! - `UnitConfig` - one scheduled device unit
//! - `UnitIoConfig` - how the unit's I/O buffers are sized

use crate::config::{ConfigError, SharedConfig, Validate};
use crate::consts::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_FRAME_LEN, DEFAULT_PERIOD_MS,
    RECORD_CHANNEL,
};
use crate::layout::IoLayout;
use crate::unit::state::IoMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_max_frame_len() -> u32 {
    DEFAULT_MAX_FRAME_LEN
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_period_ms() -> u64 {
    DEFAULT_PERIOD_MS
}

/// Main configuration loaded from `bridge.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Common service settings.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Transport endpoint, `host:port`.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upper bound for a channel-name or payload length prefix.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,

    /// Capacity of the record-data completion broadcast.
    #[serde(default = "default_event_capacity")]
    pub record_event_capacity: usize,

    /// Device units, started in declaration order.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            listen: default_listen(),
            max_frame_len: default_max_frame_len(),
            record_event_capacity: default_event_capacity(),
            units: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e| {
            ConfigError::ValidationError(format!("invalid listen address '{}': {e}", self.listen))
        })
    }

    /// Find a unit by channel name.
    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.name == name)
    }
}

impl Validate for BridgeConfig {
    /// # Validation Rules
    /// 1. `shared` is valid
    /// 2. `listen` parses as a socket address
    /// 3. `max_frame_len` > 0, `record_event_capacity` > 0
    /// 4. every unit is valid, names are unique
    /// 5. no unit block is larger than `max_frame_len`
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.listen_addr()?;

        if self.max_frame_len == 0 {
            return Err(ConfigError::ValidationError(
                "max_frame_len must be greater than 0".to_string(),
            ));
        }
        if self.record_event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "record_event_capacity must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for unit in &self.units {
            unit.validate()?;
            unit.check_block_sizes(self.max_frame_len)?;
            if !names.insert(unit.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate unit name: {}",
                    unit.name
                )));
            }
        }
        Ok(())
    }
}

/// One device unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Symbolic name; keys both the input and the output channel.
    pub name: String,

    /// Constructor key in the unit registry (e.g. `"loopback"`).
    pub kind: String,

    /// Cycle period in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Start together with the bridge.
    #[serde(default)]
    pub auto_start: bool,

    /// Delay before the first cycle after a start.
    #[serde(default)]
    pub start_delay_ms: u64,

    /// CPU core the cycle thread is pinned to (`rt` feature).
    #[serde(default)]
    pub cpu_core: Option<usize>,

    /// SCHED_FIFO priority of the cycle thread (`rt` feature).
    #[serde(default)]
    pub rt_priority: Option<i32>,

    /// I/O buffer shape.
    #[serde(default)]
    pub io: UnitIoConfig,

    /// Unit-specific parameters, interpreted by the unit's configure step.
    #[serde(default)]
    pub params: toml::Table,
}

impl UnitConfig {
    /// Minimal config for a unit without I/O.
    pub fn new(name: &str, kind: &str, period_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            period_ms,
            auto_start: false,
            start_delay_ms: 0,
            cpu_core: None,
            rt_priority: None,
            io: UnitIoConfig::None,
            params: toml::Table::new(),
        }
    }

    /// Builder-style I/O shape.
    pub fn with_io(mut self, io: UnitIoConfig) -> Self {
        self.io = io;
        self
    }

    /// Reject input or output blocks that could not cross the transport
    /// in one frame of at most `max_len` bytes.
    pub fn check_block_sizes(&self, max_len: u32) -> Result<(), ConfigError> {
        let (inputs, outputs) = self.io.build_layouts();
        for (direction, layout) in [("input", &inputs), ("output", &outputs)] {
            let len = layout.byte_len();
            if len as u64 > u64::from(max_len) {
                return Err(ConfigError::ValidationError(format!(
                    "unit '{}': {direction} block of {len} bytes exceeds max_frame_len {max_len}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl Validate for UnitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "unit name cannot be empty".to_string(),
            ));
        }
        if self.name == RECORD_CHANNEL {
            return Err(ConfigError::ValidationError(format!(
                "unit name '{RECORD_CHANNEL}' is reserved for record data"
            )));
        }
        if self.kind.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "unit '{}' has no kind",
                self.name
            )));
        }
        if self.period_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "unit '{}': period_ms must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// Declared field of a structured block. The kind stays a string so an
/// unknown kind reaches `IoLayout` and is ignored there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Field name.
    pub name: String,
    /// Kind name (see `FieldKind::from_name`).
    pub kind: String,
    /// Element count, 0 for a scalar.
    #[serde(default)]
    pub array_len: u32,
}

impl FieldConfig {
    /// Scalar field.
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            array_len: 0,
        }
    }
}

/// I/O buffer shape of a unit, tagged by `mode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UnitIoConfig {
    /// No process data.
    #[default]
    None,
    /// Plain byte ranges of the given sizes.
    AddressMapped {
        /// Input byte count.
        input_bytes: u32,
        /// Output byte count.
        output_bytes: u32,
    },
    /// Field lists laid out by `IoLayout`.
    Structured {
        /// Input block fields.
        #[serde(default)]
        inputs: Vec<FieldConfig>,
        /// Output block fields.
        #[serde(default)]
        outputs: Vec<FieldConfig>,
    },
}

impl UnitIoConfig {
    /// Mode discriminant.
    pub const fn mode(&self) -> IoMode {
        match self {
            Self::None => IoMode::None,
            Self::AddressMapped { .. } => IoMode::AddressMapped,
            Self::Structured { .. } => IoMode::Structured,
        }
    }

    /// Build fresh `(inputs, outputs)` layouts for one configuration pass.
    ///
    /// Address-mapped blocks become a single `u8` array field named `data`
    /// so every mode resolves to a layout.
    pub fn build_layouts(&self) -> (IoLayout, IoLayout) {
        match self {
            Self::None => (IoLayout::new(), IoLayout::new()),
            Self::AddressMapped {
                input_bytes,
                output_bytes,
            } => (byte_block(*input_bytes), byte_block(*output_bytes)),
            Self::Structured { inputs, outputs } => (layout_of(inputs), layout_of(outputs)),
        }
    }
}

fn byte_block(len: u32) -> IoLayout {
    let mut layout = IoLayout::new();
    if len > 0 {
        layout.add_field("data", crate::layout::FieldKind::U8, len);
    }
    layout
}

fn layout_of(fields: &[FieldConfig]) -> IoLayout {
    let mut layout = IoLayout::new();
    for f in fields {
        layout.add_field_named(&f.name, &f.kind, f.array_len);
    }
    layout
}
