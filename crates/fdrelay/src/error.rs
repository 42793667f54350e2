//! Fatal runtime errors.

use std::os::fd::RawFd;

use nix::errno::Errno;
use thiserror::Error;

/// Errors that abort the relay: they indicate the execution environment
/// itself is broken. Channel-level I/O failures never surface here; they
/// retire individual channels instead.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to change blocking mode on fd {fd}")]
    SetMode {
        fd: RawFd,
        #[source]
        source: Errno,
    },

    #[error("readiness wait failed")]
    Wait {
        #[source]
        source: Errno,
    },
}
