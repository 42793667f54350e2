//! Error types for the `fdrelay` core library.

use std::os::fd::RawFd;

use thiserror::Error;

use crate::channel::MAX_CHANNELS;

/// Configuration errors. All of these are fatal at startup: the relay
/// refuses to run with a partially valid channel set.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A channel argument that is not of the form `<src>:<dst>`.
    #[error("invalid channel '{spec}': {reason}")]
    MalformedSpec { spec: String, reason: String },

    /// Two channels declare the same source descriptor.
    #[error("more than one channel is reading from file descriptor {fd}")]
    DuplicateReader { fd: RawFd },

    /// More channels than the relay supports.
    #[error("too many channels ({count}, max {})", MAX_CHANNELS)]
    TooManyChannels { count: usize },

    /// An empty channel list.
    #[error("at least one channel is required")]
    NoChannels,
}
