//! Reference-counted descriptor registry.
//!
//! One entry per distinct descriptor value referenced by any channel. An
//! entry counts how many enabled channels currently read from the
//! descriptor and how many write to it; the descriptor is physically
//! closed exactly when both counts reach zero. Entries are created lazily
//! and never removed, so the registry stays bounded by twice the channel
//! count plus one.

use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::debug;

/// Per-descriptor bookkeeping.
///
/// The entry owns the descriptor through `handle`; the closing transition
/// consumes the `OwnedFd`, so a second physical close cannot happen. Once
/// both counts are zero the entry is inert.
#[derive(Debug)]
pub struct DescriptorEntry {
    handle: Option<OwnedFd>,
    read_refs: u32,
    write_refs: u32,
}

impl DescriptorEntry {
    /// Count of enabled channels reading from this descriptor.
    pub const fn read_refs(&self) -> u32 {
        self.read_refs
    }

    /// Count of enabled channels writing to this descriptor.
    pub const fn write_refs(&self) -> u32 {
        self.write_refs
    }

    /// Whether the underlying descriptor is still owned (not yet closed).
    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn maybe_close(&mut self) {
        if self.read_refs == 0 && self.write_refs == 0 {
            if let Some(handle) = self.handle.take() {
                debug!(fd = handle.as_raw_fd(), "Closing descriptor");
                drop(handle);
            }
        }
    }
}

/// Registry of every descriptor referenced by the channel table, keyed by
/// descriptor value.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    entries: HashMap<RawFd, DescriptorEntry>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up the entry for `fd`, creating a zero-initialised one (and
    /// adopting the descriptor) if it is not yet known.
    pub fn get_or_create(&mut self, fd: RawFd) -> &mut DescriptorEntry {
        self.entries.entry(fd).or_insert_with(|| DescriptorEntry {
            handle: Some(adopt(fd)),
            read_refs: 0,
            write_refs: 0,
        })
    }

    /// Record one more reader of `fd` and return the new reader count.
    pub fn acquire_read(&mut self, fd: RawFd) -> u32 {
        let entry = self.get_or_create(fd);
        entry.read_refs += 1;
        entry.read_refs
    }

    /// Record one more writer of `fd` and return the new writer count.
    pub fn acquire_write(&mut self, fd: RawFd) -> u32 {
        let entry = self.get_or_create(fd);
        entry.write_refs += 1;
        entry.write_refs
    }

    /// Drop one reader of `fd`, closing the descriptor if it was the last
    /// reference in either role.
    pub fn release_read(&mut self, fd: RawFd) {
        if let Some(entry) = self.entries.get_mut(&fd) {
            entry.read_refs = entry.read_refs.saturating_sub(1);
            entry.maybe_close();
        }
    }

    /// Drop one writer of `fd`, closing the descriptor if it was the last
    /// reference in either role.
    pub fn release_write(&mut self, fd: RawFd) {
        if let Some(entry) = self.entries.get_mut(&fd) {
            entry.write_refs = entry.write_refs.saturating_sub(1);
            entry.maybe_close();
        }
    }

    /// Borrow the still-open descriptor for `fd`, if any.
    pub fn borrowed(&self, fd: RawFd) -> Option<BorrowedFd<'_>> {
        self.entries
            .get(&fd)
            .and_then(|entry| entry.handle.as_ref())
            .map(AsFd::as_fd)
    }

    /// Descriptors with at least one enabled reader, sorted by value.
    /// This is the readiness-wait set for the event loop.
    pub fn watched_readers(&self) -> Vec<(RawFd, BorrowedFd<'_>)> {
        let mut readers: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.read_refs > 0)
            .filter_map(|(&fd, entry)| entry.handle.as_ref().map(|handle| (fd, handle.as_fd())))
            .collect();
        readers.sort_unstable_by_key(|&(fd, _)| fd);
        readers
    }

    /// Whether any descriptor still has an enabled reader.
    pub fn has_active_readers(&self) -> bool {
        self.entries.values().any(|entry| entry.read_refs > 0)
    }

    pub fn read_refs(&self, fd: RawFd) -> u32 {
        self.entries.get(&fd).map_or(0, DescriptorEntry::read_refs)
    }

    pub fn write_refs(&self, fd: RawFd) -> u32 {
        self.entries.get(&fd).map_or(0, DescriptorEntry::write_refs)
    }

    /// Whether `fd` is known and its descriptor has already been closed.
    pub fn is_closed(&self, fd: RawFd) -> bool {
        self.entries.get(&fd).is_some_and(|entry| entry.handle.is_none())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emit one debug line per entry, sorted by descriptor value.
    pub fn log_state(&self) {
        let mut fds: Vec<_> = self.entries.keys().copied().collect();
        fds.sort_unstable();
        for fd in fds {
            if let Some(entry) = self.entries.get(&fd) {
                debug!(
                    fd,
                    read_refs = entry.read_refs,
                    write_refs = entry.write_refs,
                    open = entry.handle.is_some(),
                    "descriptor"
                );
            }
        }
    }
}

/// Take ownership of an inherited descriptor.
///
/// The registry becomes the sole owner: the handle is dropped (closed) at
/// most once, on the transition where both reference counts hit zero.
#[allow(unsafe_code)]
fn adopt(fd: RawFd) -> OwnedFd {
    unsafe { OwnedFd::from_raw_fd(fd) }
}
