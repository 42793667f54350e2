//! Per-channel relay step.
//!
//! One dispatch performs at most one bounded read and, when data arrived,
//! one full write. End of stream retires the channel; an unrecoverable
//! write failure retires the channel and every other channel feeding the
//! same destination.

use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::unistd;
use tracing::{debug, trace};

use fdrelay_core::channel::ChannelTable;
use fdrelay_core::registry::DescriptorRegistry;

/// Size of one relay read.
pub const BLOCK_SIZE: usize = 16 * 1024;

enum ReadOutcome {
    Data(usize),
    EndOfStream,
}

/// The relay buffer plus the read/write/cascade logic around it.
pub struct CopyEngine {
    buf: Box<[u8]>,
}

impl CopyEngine {
    pub fn new() -> Self {
        Self {
            buf: vec![0; BLOCK_SIZE].into_boxed_slice(),
        }
    }

    /// One relay attempt for channel `id`. Never fails the process:
    /// every I/O outcome is resolved by leaving the channel enabled or
    /// closing it (possibly cascading to destination peers).
    pub fn step(&mut self, table: &mut ChannelTable, registry: &mut DescriptorRegistry, id: usize) {
        let Some(channel) = table.get(id) else {
            return;
        };
        if !channel.is_enabled() {
            return;
        }
        let (source, dest) = (channel.source, channel.dest);
        trace!(channel = id, source, dest, "Relay step");

        let outcome = match registry.borrowed(source) {
            Some(fd) => read_chunk(fd, &mut self.buf),
            None => ReadOutcome::EndOfStream,
        };
        let len = match outcome {
            ReadOutcome::EndOfStream => {
                debug!(channel = id, source, "End of stream");
                table.close_channel(registry, id);
                return;
            }
            ReadOutcome::Data(len) => len,
        };

        let flushed = match registry.borrowed(dest) {
            Some(fd) => write_all(fd, &self.buf[..len]),
            None => Err(Errno::EBADF),
        };
        if let Err(errno) = flushed {
            if errno == Errno::EPIPE {
                debug!(channel = id, dest, "Destination hung up");
            } else {
                debug!(channel = id, dest, error = %errno, "Write failed");
            }
            table.close_channel(registry, id);

            // The destination is unusable for every remaining writer.
            let peers: Vec<usize> = table
                .iter()
                .filter(|ch| ch.is_enabled() && ch.dest == dest)
                .map(|ch| ch.id)
                .collect();
            for peer in peers {
                debug!(channel = peer, dest, "Cascading closure");
                table.close_channel(registry, peer);
            }
        }
    }
}

impl Default for CopyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read up to one block. `EINTR` retries transparently. Zero bytes,
/// `EAGAIN` (the source was reported ready but has nothing for us), and
/// `EIO` (pty peer gone) all count as end of stream; other read errors
/// are logged and retire the channel the same way.
fn read_chunk(fd: BorrowedFd<'_>, buf: &mut [u8]) -> ReadOutcome {
    loop {
        match unistd::read(fd, buf) {
            Ok(0) => return ReadOutcome::EndOfStream,
            Ok(len) => return ReadOutcome::Data(len),
            Err(Errno::EINTR) => {}
            Err(Errno::EAGAIN | Errno::EIO) => return ReadOutcome::EndOfStream,
            Err(errno) => {
                debug!(fd = fd.as_raw_fd(), error = %errno, "Read failed");
                return ReadOutcome::EndOfStream;
            }
        }
    }
}

/// Write the whole chunk. Destinations are kept in blocking mode, so
/// `EINTR`/`EAGAIN` just retry. A dead reader arrives as `Errno::EPIPE`
/// because the runtime leaves `SIGPIPE` ignored.
fn write_all(fd: BorrowedFd<'_>, chunk: &[u8]) -> Result<(), Errno> {
    let mut pos = 0;
    while pos < chunk.len() {
        match unistd::write(fd, &chunk[pos..]) {
            Ok(len) => pos += len,
            Err(Errno::EINTR | Errno::EAGAIN) => {}
            Err(errno) => return Err(errno),
        }
    }
    Ok(())
}
