//! Readiness-driven scheduling core.
//!
//! The loop blocks on `poll(2)` over every descriptor that still has an
//! enabled reading channel, then gives each ready channel exactly one
//! relay attempt per iteration. It terminates once no descriptor has an
//! enabled reader left.

use std::os::fd::RawFd;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::debug;

use fdrelay_core::channel::ChannelTable;
use fdrelay_core::registry::DescriptorRegistry;

use crate::engine::CopyEngine;
use crate::error::RelayError;
use crate::modes::set_blocking;

/// Outcome of a single scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Continue,
    Terminated,
}

/// Owns the channel table, the descriptor registry, and the copy engine
/// for the lifetime of the relay.
pub struct EventLoop {
    table: ChannelTable,
    registry: DescriptorRegistry,
    engine: CopyEngine,
}

impl EventLoop {
    pub fn new(table: ChannelTable, registry: DescriptorRegistry) -> Self {
        Self {
            table,
            registry,
            engine: CopyEngine::new(),
        }
    }

    pub const fn table(&self) -> &ChannelTable {
        &self.table
    }

    pub const fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    /// Switch every source to non-blocking and every destination to
    /// blocking, in channel order. The readiness wait multiplexes reads
    /// only; destination writes are retried to completion on a blocking
    /// descriptor instead.
    pub fn prepare(&mut self) -> Result<(), RelayError> {
        for channel in self.table.iter() {
            for (fd, blocking) in [(channel.source, false), (channel.dest, true)] {
                let borrowed = self
                    .registry
                    .borrowed(fd)
                    .ok_or(RelayError::SetMode {
                        fd,
                        source: Errno::EBADF,
                    })?;
                set_blocking(borrowed, blocking)
                    .map_err(|errno| RelayError::SetMode { fd, source: errno })?;
            }
        }
        self.log_state("start");
        Ok(())
    }

    /// One scheduling step: wait for readiness, then give every enabled
    /// channel with a ready source exactly one relay attempt. One attempt
    /// per iteration keeps dispatch round-robin fair; a busy channel can
    /// not starve the others by being drained to empty.
    pub fn turn(&mut self) -> Result<LoopState, RelayError> {
        let ready = {
            let watched = self.registry.watched_readers();
            if watched.is_empty() {
                return Ok(LoopState::Terminated);
            }

            let mut poll_fds: Vec<PollFd<'_>> = watched
                .iter()
                .map(|&(_, fd)| PollFd::new(fd, PollFlags::POLLIN))
                .collect();
            loop {
                match poll(&mut poll_fds, PollTimeout::NONE) {
                    Ok(_) => break,
                    Err(Errno::EINTR) => {}
                    Err(errno) => return Err(RelayError::Wait { source: errno }),
                }
            }

            watched
                .iter()
                .zip(&poll_fds)
                .filter(|(_, poll_fd)| is_ready(poll_fd.revents()))
                .map(|(&(fd, _), _)| fd)
                .collect::<Vec<RawFd>>()
        };
        if ready.is_empty() {
            return Ok(LoopState::Continue);
        }

        self.log_state("before dispatch");
        for id in 0..self.table.len() {
            let should_dispatch = self
                .table
                .get(id)
                .is_some_and(|ch| ch.is_enabled() && ready.contains(&ch.source));
            if should_dispatch {
                self.engine.step(&mut self.table, &mut self.registry, id);
            }
        }
        self.log_state("after dispatch");

        Ok(LoopState::Continue)
    }

    /// Drive the relay until no descriptor has an enabled reader left.
    /// Reaching that point is the loop's success condition.
    pub fn run(&mut self) -> Result<(), RelayError> {
        self.prepare()?;
        while self.turn()? == LoopState::Continue {}
        Ok(())
    }

    fn log_state(&self, stage: &str) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        debug!(stage, "Relay state");
        self.registry.log_state();
        self.table.log_state();
    }
}

/// Hangup and error conditions are folded into "readable": the following
/// read observes EOF (or the error) and retires the channel.
fn is_ready(revents: Option<PollFlags>) -> bool {
    revents.unwrap_or_else(PollFlags::empty).intersects(
        PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL,
    )
}
