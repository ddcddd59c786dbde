//! The source-routing database: per-group map of active
//! sources, their ingress interface, last-seen kernel packet count, and
//! refresh-or-evict bookkeeping. A direct structural port of a
//! `simple_routing_data`-style class, generalized from a single
//! hardcoded kernel socket to an injected packet count read by the
//! caller.

use std::collections::BTreeMap;
use std::fmt;

use crate::time::Instant;
use crate::wire::{Address, InterfaceId};

/// One (group, source) sighting: which interface it arrived on, and the
/// kernel's cumulative packet counter the last time it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRecord {
    ingress: InterfaceId,
    last_packet_count: u64,
    last_refresh: Instant,
}

impl SourceRecord {
    pub fn ingress(&self) -> InterfaceId {
        self.ingress
    }

    pub fn last_packet_count(&self) -> u64 {
        self.last_packet_count
    }

    pub fn last_refresh(&self) -> Instant {
        self.last_refresh
    }
}

/// Outcome of [`RoutingDatabase::refresh_or_evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Evicted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GroupEntry {
    sources: BTreeMap<Address, SourceRecord>,
}

impl GroupEntry {
    fn interface_map(&self) -> BTreeMap<Address, InterfaceId> {
        self.sources.iter().map(|(addr, rec)| (*addr, rec.ingress)).collect()
    }
}

/// Per-group `source → Source Record` map, keyed by group address.
/// Unknown-group queries return empty views rather than
/// errors — callers never need to special-case a group they haven't seen
/// traffic for yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDatabase {
    groups: BTreeMap<Address, GroupEntry>,
}

impl RoutingDatabase {
    pub fn new() -> RoutingDatabase {
        RoutingDatabase { groups: BTreeMap::new() }
    }

    /// Insert or refresh a sighting of `source` in `group` arriving on
    /// `ingress`, observed at `now` with the kernel's current cumulative
    /// packet count `packet_count`.
    ///
    /// If the source is already known under a *different* ingress, the
    /// stored entry wins and the caller should log the conflict — by RPF,
    /// a multicast source must arrive on exactly one interface, so a
    /// second ingress for the same (G,S) is a stale or spoofed sighting,
    /// not a legitimate update.
    ///
    /// Returns `false` when an existing record's ingress conflicts and the
    /// sighting was ignored, `true` otherwise (inserted or refreshed).
    pub fn set_source(&mut self, ingress: InterfaceId, group: Address, source: Address, packet_count: u64, now: Instant) -> bool {
        let entry = self.groups.entry(group).or_default();
        if let Some(existing) = entry.sources.get(&source) {
            if existing.ingress != ingress {
                return false;
            }
        }
        entry.sources.insert(
            source,
            SourceRecord {
                ingress,
                last_packet_count: packet_count,
                last_refresh: now,
            },
        );
        true
    }

    pub fn del_source(&mut self, group: Address, source: Address) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.sources.remove(&source);
            if entry.sources.is_empty() {
                self.groups.remove(&group);
            }
        }
    }

    /// Compare `packet_count` against the stored record's last observed
    /// count. If it advanced, the source is still live: update
    /// `last_refresh` and return [`RefreshOutcome::Refreshed`]. Otherwise
    /// the source went silent over a full lifetime: delete the record and
    /// return [`RefreshOutcome::Evicted`].
    ///
    /// A (group, source) absent from the database (already evicted, or
    /// never recorded) is treated as evicted — the caller's maintenance
    /// timer is a no-op in that case.
    pub fn refresh_or_evict(&mut self, group: Address, source: Address, packet_count: u64, now: Instant) -> RefreshOutcome {
        let Some(entry) = self.groups.get_mut(&group) else {
            return RefreshOutcome::Evicted;
        };
        let Some(record) = entry.sources.get_mut(&source) else {
            return RefreshOutcome::Evicted;
        };

        if packet_count > record.last_packet_count {
            record.last_packet_count = packet_count;
            record.last_refresh = now;
            RefreshOutcome::Refreshed
        } else {
            entry.sources.remove(&source);
            if entry.sources.is_empty() {
                self.groups.remove(&group);
            }
            RefreshOutcome::Evicted
        }
    }

    /// All sources currently known for `group`, empty if the group is
    /// unknown.
    pub fn available_sources(&self, group: Address) -> Vec<Address> {
        match self.groups.get(&group) {
            Some(entry) => entry.sources.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    /// `source → ingress interface` for every source known under `group`.
    pub fn interface_map(&self, group: Address) -> BTreeMap<Address, InterfaceId> {
        match self.groups.get(&group) {
            Some(entry) => entry.interface_map(),
            None => BTreeMap::new(),
        }
    }

    pub fn record(&self, group: Address, source: Address) -> Option<&SourceRecord> {
        self.groups.get(&group)?.sources.get(&source)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Address> {
        self.groups.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl fmt::Display for RoutingDatabase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (group, entry) in &self.groups {
            writeln!(f, "{}:", group)?;
            for (source, record) in &entry.sources {
                writeln!(f, "  {} via {} (count={})", source, record.ingress, record.last_packet_count)?;
            }
        }
        Ok(())
    }
}
