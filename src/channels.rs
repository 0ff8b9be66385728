use crate::types::{ChannelVolume, Level, SurroundChannel};
use std::collections::BTreeMap;

/// Outcome of a registry mutation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelChange {
    /// The channel had not been seen before
    pub created: bool,
    /// The level differs from the previous one
    pub level_changed: bool,
}

/// Lazily populated per-channel volume state
///
/// Entries are created on first reference and never removed.
#[derive(Debug, Default, Clone)]
pub struct ChannelRegistry {
    channels: BTreeMap<SurroundChannel, ChannelVolume>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for `channel`, creating it at level 0 if needed
    ///
    /// The flag is true only on the call that created the entry.
    pub(crate) fn get_or_create(&mut self, channel: SurroundChannel) -> (ChannelVolume, bool) {
        let mut created = false;
        let entry = self.channels.entry(channel).or_insert_with(|| {
            created = true;
            ChannelVolume::new(channel)
        });
        (*entry, created)
    }

    pub(crate) fn set_level(&mut self, channel: SurroundChannel, level: Level) -> ChannelChange {
        let (_, created) = self.get_or_create(channel);
        let mut change = ChannelChange {
            created,
            level_changed: false,
        };
        if let Some(entry) = self.channels.get_mut(&channel) {
            if entry.level != level {
                entry.level = level;
                change.level_changed = true;
            }
        }
        change
    }

    /// Zero every known channel, returning the entries that changed
    pub(crate) fn reset_levels(&mut self) -> Vec<ChannelVolume> {
        self.channels
            .values_mut()
            .filter(|entry| entry.level != 0)
            .map(|entry| {
                entry.level = 0;
                *entry
            })
            .collect()
    }

    pub fn get(&self, channel: SurroundChannel) -> Option<ChannelVolume> {
        self.channels.get(&channel).copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Point-in-time copy of the registry
    pub fn snapshot(&self) -> BTreeMap<SurroundChannel, ChannelVolume> {
        self.channels.clone()
    }
}
