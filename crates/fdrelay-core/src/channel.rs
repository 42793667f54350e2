//! Relay channels and the bounded channel table.

use std::os::fd::RawFd;
use std::str::FromStr;

use tracing::debug;

use crate::error::ConfigError;
use crate::registry::DescriptorRegistry;

/// Upper bound on configured channels.
pub const MAX_CHANNELS: usize = 4;

/// A parsed `<src>:<dst>` argument, before validation against the rest of
/// the channel set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub source: RawFd,
    pub dest: RawFd,
}

impl FromStr for ChannelSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((source, dest)) = s.split_once(':') else {
            return Err(ConfigError::MalformedSpec {
                spec: s.to_owned(),
                reason: "missing ':' separator".to_owned(),
            });
        };
        Ok(Self {
            source: parse_fd(s, source)?,
            dest: parse_fd(s, dest)?,
        })
    }
}

fn parse_fd(spec: &str, value: &str) -> Result<RawFd, ConfigError> {
    let fd: RawFd = value.parse().map_err(|_| ConfigError::MalformedSpec {
        spec: spec.to_owned(),
        reason: format!("'{value}' is not a descriptor number"),
    })?;
    if fd < 0 {
        return Err(ConfigError::MalformedSpec {
            spec: spec.to_owned(),
            reason: "descriptor numbers cannot be negative".to_owned(),
        });
    }
    Ok(fd)
}

/// One configured relay direction. `enabled` goes `true -> false` at most
/// once; channels are only ever deactivated, never removed.
#[derive(Debug)]
pub struct Channel {
    pub id: usize,
    pub source: RawFd,
    pub dest: RawFd,
    enabled: bool,
}

impl Channel {
    pub(crate) const fn new(id: usize, source: RawFd, dest: RawFd) -> Self {
        Self {
            id,
            source,
            dest,
            enabled: true,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// The fixed set of configured channels, indexed by configuration order.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: Vec<Channel>,
}

impl ChannelTable {
    pub(crate) fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn enabled_count(&self) -> usize {
        self.channels.iter().filter(|ch| ch.enabled).count()
    }

    /// Disable channel `id` and release its descriptor references, which
    /// may physically close one or both descriptors as a side effect.
    /// A channel that is already disabled is left untouched.
    pub fn close_channel(&mut self, registry: &mut DescriptorRegistry, id: usize) {
        let Some(channel) = self.channels.get_mut(id) else {
            return;
        };
        if !channel.enabled {
            return;
        }
        channel.enabled = false;
        let (source, dest) = (channel.source, channel.dest);
        debug!(channel = id, source, dest, "Closing channel");
        registry.release_read(source);
        registry.release_write(dest);
    }

    /// Emit one debug line per channel.
    pub fn log_state(&self) {
        for channel in &self.channels {
            debug!(
                channel = channel.id,
                enabled = channel.enabled,
                source = channel.source,
                dest = channel.dest,
                "channel"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::os::fd::IntoRawFd;

    use super::*;

    fn pipe_fds() -> (RawFd, RawFd) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (read_end.into_raw_fd(), write_end.into_raw_fd())
    }

    #[test]
    fn parses_a_plain_pair() {
        let spec: ChannelSpec = "3:4".parse().unwrap();
        assert_eq!(
            spec,
            ChannelSpec {
                source: 3,
                dest: 4
            }
        );
    }

    #[test]
    fn parses_zero_descriptors() {
        let spec: ChannelSpec = "0:1".parse().unwrap();
        assert_eq!(spec.source, 0);
        assert_eq!(spec.dest, 1);
    }

    #[test]
    fn rejects_malformed_specs() {
        for bad in ["", "3", "3:", ":4", "a:b", "3:b", "-1:2", "2:-1", "3:4:5", " 3:4"] {
            let parsed = bad.parse::<ChannelSpec>();
            assert!(
                matches!(parsed, Err(ConfigError::MalformedSpec { .. })),
                "'{bad}' should be rejected, got {parsed:?}"
            );
        }
    }

    #[test]
    fn close_channel_releases_both_roles_once() {
        let (r, w) = pipe_fds();
        let mut registry = DescriptorRegistry::new();
        registry.acquire_read(r);
        registry.acquire_write(w);
        let mut table = ChannelTable::new(vec![Channel::new(0, r, w)]);

        table.close_channel(&mut registry, 0);
        assert!(!table.get(0).unwrap().is_enabled());
        assert_eq!(registry.read_refs(r), 0);
        assert_eq!(registry.write_refs(w), 0);
        assert!(registry.is_closed(r));
        assert!(registry.is_closed(w));
    }

    #[test]
    fn closing_a_disabled_channel_is_a_no_op() {
        let (r, w) = pipe_fds();
        let (r2, _w2) = pipe_fds();
        let mut registry = DescriptorRegistry::new();
        registry.acquire_read(r);
        registry.acquire_write(w);
        // A second channel keeps w open so a double release would be visible.
        registry.acquire_read(r2);
        registry.acquire_write(w);
        let mut table = ChannelTable::new(vec![Channel::new(0, r, w), Channel::new(1, r2, w)]);

        table.close_channel(&mut registry, 0);
        assert_eq!(registry.write_refs(w), 1);

        // Second closure of the same channel must not decrement again.
        table.close_channel(&mut registry, 0);
        assert_eq!(registry.write_refs(w), 1);
        assert!(!registry.is_closed(w));
        assert_eq!(table.enabled_count(), 1);
    }

    #[test]
    fn close_channel_ignores_unknown_ids() {
        let (r, w) = pipe_fds();
        let mut registry = DescriptorRegistry::new();
        registry.acquire_read(r);
        registry.acquire_write(w);
        let mut table = ChannelTable::new(vec![Channel::new(0, r, w)]);

        table.close_channel(&mut registry, 7);
        assert_eq!(table.enabled_count(), 1);
        assert_eq!(registry.read_refs(r), 1);
    }

    #[test]
    fn shared_source_of_disabled_channel_keeps_descriptor_for_writer() {
        // fd used as source of one channel and dest of another: closing the
        // reader must leave the descriptor open for the remaining writer.
        let (r, w) = pipe_fds();
        let (r2, _w2) = pipe_fds();
        let mut registry = DescriptorRegistry::new();
        registry.acquire_read(r);
        registry.acquire_write(w);
        registry.acquire_read(r2);
        registry.acquire_write(r); // r is also a destination
        let mut table = ChannelTable::new(vec![Channel::new(0, r, w), Channel::new(1, r2, r)]);

        table.close_channel(&mut registry, 0);
        assert!(!registry.is_closed(r), "still a destination for channel 1");

        table.close_channel(&mut registry, 1);
        assert!(registry.is_closed(r));
        assert!(registry.is_closed(r2));
        assert!(registry.is_closed(w));
    }
}
