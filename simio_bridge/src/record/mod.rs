//! Record-data (acyclic parameter) sub-protocol carried on the `/R` channel.

pub mod correlator;
pub mod wire;

pub use correlator::RecordCorrelator;
pub use wire::{RecordCommand, RecordMessage, RecordReply, RecordWireError};
