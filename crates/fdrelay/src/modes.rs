//! Descriptor blocking-mode control.
//!
//! Sources run non-blocking (a read that would stall must never block the
//! loop thread); destinations run blocking (writes are retried to
//! completion without busy-polling).

use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};

/// Toggle `O_NONBLOCK` on `fd`, preserving its other status flags.
pub fn set_blocking(fd: BorrowedFd<'_>, blocking: bool) -> Result<(), Errno> {
    let bits = fcntl(fd, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(bits);
    flags.set(OFlag::O_NONBLOCK, !blocking);
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}
