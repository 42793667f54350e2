//! Configuration validation: from parsed channel specs to a populated
//! channel table and seeded descriptor registry.

use crate::channel::{Channel, ChannelSpec, ChannelTable, MAX_CHANNELS};
use crate::error::ConfigError;
use crate::registry::DescriptorRegistry;

/// Validate `specs` and build the channel table plus the seeded registry.
///
/// The count bound is checked before any descriptor is adopted, so a
/// failed build takes ownership of nothing the caller still relies on
/// beyond the descriptors named by the specs that were already seeded.
pub fn build_tables(
    specs: &[ChannelSpec],
) -> Result<(ChannelTable, DescriptorRegistry), ConfigError> {
    if specs.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    if specs.len() > MAX_CHANNELS {
        return Err(ConfigError::TooManyChannels { count: specs.len() });
    }

    let mut registry = DescriptorRegistry::new();
    let mut channels = Vec::with_capacity(specs.len());
    for (id, spec) in specs.iter().enumerate() {
        // Only one reader per descriptor; any number of writers.
        if registry.acquire_read(spec.source) != 1 {
            return Err(ConfigError::DuplicateReader { fd: spec.source });
        }
        registry.acquire_write(spec.dest);
        channels.push(Channel::new(id, spec.source, spec.dest));
    }

    Ok((ChannelTable::new(channels), registry))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::os::fd::{IntoRawFd, RawFd};

    use super::*;

    /// Fresh descriptors whose ownership passes to the registry.
    fn pipe_fds() -> (RawFd, RawFd) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (read_end.into_raw_fd(), write_end.into_raw_fd())
    }

    #[test]
    fn builds_table_and_seeds_registry() {
        let (r1, w1) = pipe_fds();
        let (r2, w2) = pipe_fds();
        let specs = vec![
            ChannelSpec { source: r1, dest: w1 },
            ChannelSpec { source: r2, dest: w2 },
        ];

        let (table, registry) = build_tables(&specs).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.enabled_count(), 2);
        assert_eq!(table.get(0).unwrap().source, r1);
        assert_eq!(table.get(1).unwrap().dest, w2);

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.read_refs(r1), 1);
        assert_eq!(registry.write_refs(w1), 1);
        assert_eq!(registry.read_refs(w1), 0);
    }

    #[test]
    fn fan_in_to_one_destination_is_legal() {
        let (r1, _w1) = pipe_fds();
        let (r2, _w2) = pipe_fds();
        let (_rd, wd) = pipe_fds();
        let specs = vec![
            ChannelSpec { source: r1, dest: wd },
            ChannelSpec { source: r2, dest: wd },
        ];

        let (table, registry) = build_tables(&specs).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(registry.write_refs(wd), 2);
    }

    #[test]
    fn rejects_duplicate_readers() {
        let (r, _w) = pipe_fds();
        let (_r2, w2) = pipe_fds();
        let (_r3, w3) = pipe_fds();
        let specs = vec![
            ChannelSpec { source: r, dest: w2 },
            ChannelSpec { source: r, dest: w3 },
        ];

        let err = build_tables(&specs).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateReader { fd } if fd == r));
    }

    #[test]
    fn rejects_too_many_channels() {
        let specs: Vec<ChannelSpec> = (0..=MAX_CHANNELS)
            .map(|_| {
                let (r, w) = pipe_fds();
                ChannelSpec { source: r, dest: w }
            })
            .collect();

        let err = build_tables(&specs).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TooManyChannels { count } if count == MAX_CHANNELS + 1
        ));
    }

    #[test]
    fn rejects_an_empty_channel_list() {
        assert!(matches!(build_tables(&[]), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn distinct_descriptor_count_stays_bounded() {
        // Worst case: every channel uses two fresh descriptors.
        let specs: Vec<ChannelSpec> = (0..MAX_CHANNELS)
            .map(|_| {
                let (r, w) = pipe_fds();
                ChannelSpec { source: r, dest: w }
            })
            .collect();

        let (_table, registry) = build_tables(&specs).unwrap();
        assert!(registry.len() <= 2 * MAX_CHANNELS + 1);
    }
}
