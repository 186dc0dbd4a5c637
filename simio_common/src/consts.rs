//! System-wide constants for the simulation I/O bridge.
//!
//! Single source of truth for wire constants, limits and default paths.

/// Reserved channel name carrying the record-data sub-protocol.
pub const RECORD_CHANNEL: &str = "/R";

/// Single-byte record-data reply meaning "failed or nothing pending".
pub const RECORD_FALLBACK_STATUS: u8 = 0x00;

/// First byte of a structured record-data reply.
pub const RECORD_OK_STATUS: u8 = 0x01;

/// Default device unit period in milliseconds.
pub const DEFAULT_PERIOD_MS: u64 = 10;

/// Default transport endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:50000";

/// Default upper bound for a channel-name or payload length prefix (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Default capacity of the lifecycle and record-event broadcast channels.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/simio/bridge.toml";

/// Canonical service name (logging).
pub const SERVICE_NAME: &str = "simio_bridge";
