//! # Simulation I/O Bridge
//!
//! Runs simulated field devices ("device units") at fixed periods and
//! exchanges their process data and record data with a simulation peer
//! over one TCP endpoint.
//!
//! # Module Structure
//!
//! - [`bridge`] - `Bridge` orchestrator (units, registry, correlator)
//! - [`registry`] - `ChannelRegistry`: named input/output buffers
//! - [`runner`] - `UnitRunner`: lifecycle state machine and cycle thread
//! - [`cycle`] - Drift-free pacing, cycle statistics, RT thread setup
//! - [`unit_registry`] - Typed registry of unit constructors
//! - [`units`] - Built-in device units
//! - [`transport`] - Frame codec, TCP server, peer client
//! - [`record`] - Record-data sub-protocol and correlator
//! - [`control`] - Control-plane events and the shared time scale
//! - [`error`] - Service-level error type
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  frames   ┌─────────────────┐
//!  │  Simulation  │◄─────────►│ TransportServer │
//!  │     peer     │   TCP     └───┬─────────┬───┘
//!  └──────────────┘               │ "/R"    │ channel
//!                                 ▼         ▼
//!                  ┌──────────────────┐ ┌─────────────────┐
//!                  │ RecordCorrelator │ │ ChannelRegistry │
//!                  └──────────────────┘ └────────┬────────┘
//!                                                │ per period
//!                                       ┌────────┴────────┐
//!                                       │  UnitRunner ×N  │
//!                                       │  (cycle thread) │
//!                                       └─────────────────┘
//! ```

#![deny(missing_docs)]

pub mod bridge;
pub mod control;
pub mod cycle;
pub mod error;
pub mod record;
pub mod registry;
pub mod runner;
pub mod transport;
pub mod unit_registry;
pub mod units;
