//! Device-unit configuration, trait and lifecycle types.

pub mod config;
pub mod driver;
pub mod state;
