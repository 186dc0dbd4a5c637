//! Simulation I/O bridge common library.
//!
//! Shared types for the bridge service and for tools that talk to it.
//!
//! # Module Structure
//!
//! - [`config`] - TOML configuration loading (`ConfigLoader`, `SharedConfig`)
//! - [`consts`] - Wire constants, limits and defaults
//! - [`layout`] - `IoLayout`: byte size and field offsets of structured blocks
//! - [`unit`] - Device-unit configuration, trait and lifecycle types
//! - [`record`] - Record-data requests, subscription keys, completion events
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use simio_common::prelude::*;
//!
//! let mut layout = IoLayout::new();
//! layout.add_field("run", FieldKind::Bool, 0);
//! layout.add_field("speed", FieldKind::U16, 0);
//! assert_eq!(layout.byte_len(), 3);
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod consts;
pub mod layout;
pub mod prelude;
pub mod record;
pub mod unit;
