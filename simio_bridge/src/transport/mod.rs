//! Network transport between the bridge and simulation peers.
//!
//! - `frame` - length-prefixed request/response codec
//! - `server` - accept loop and frame dispatch
//! - `client` - peer-side counterpart

pub mod client;
pub mod frame;
pub mod server;

pub use client::PeerClient;
pub use frame::{FrameError, FrameLimits, RequestFrame};
pub use server::{Exchange, ServerStats, TransportServer};
