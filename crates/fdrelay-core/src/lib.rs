//! `fdrelay` Core Library
//!
//! Shared functionality for the descriptor relay:
//! - Channel table and `<src>:<dst>` specification parsing
//! - Reference-counted descriptor registry with close-once semantics
//! - Configuration validation
//! - Tracing setup

pub mod channel;
pub mod config;
pub mod error;
pub mod registry;
pub mod tracing_init;

pub use channel::{Channel, ChannelSpec, ChannelTable, MAX_CHANNELS};
pub use error::ConfigError;
pub use registry::DescriptorRegistry;
