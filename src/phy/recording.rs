//! In-memory test doubles for the `phy` traits, the same loopback role
//! an in-memory `Device` plays in transport-layer tests: no real kernel
//! or network access, just enough state to assert against.

use std::collections::BTreeMap;

use super::{MrouteSocket, QuerierView, UpstreamSender};
use crate::error::Error;
use crate::wire::{Address, FilterState, InterfaceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledEntry {
    pub ingress: InterfaceId,
    pub outputs: Vec<InterfaceId>,
}

/// A kernel mroute socket double: entries are kept in a map instead of
/// being installed into the kernel, and packet counts are whatever the
/// test sets with [`RecordingMrouteSocket::advance_packet_count`].
#[derive(Debug, Clone, Default)]
pub struct RecordingMrouteSocket {
    entries: BTreeMap<(Address, Address), InstalledEntry>,
    counters: BTreeMap<(InterfaceId, Address, Address), u64>,
    fail_add_remaining: u32,
    fail_del_remaining: u32,
}

impl RecordingMrouteSocket {
    pub fn new() -> RecordingMrouteSocket {
        RecordingMrouteSocket::default()
    }

    pub fn entry(&self, group: Address, source: Address) -> Option<&InstalledEntry> {
        self.entries.get(&(group, source))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn advance_packet_count(&mut self, ingress: InterfaceId, group: Address, source: Address, count: u64) {
        self.counters.insert((ingress, group, source), count);
    }

    /// Queue one failure for the next `add_entry` call. Calling this twice
    /// before the engine reacts queues two consecutive failures, exercising
    /// the retry-then-degrade path instead of the retry-then-recover one.
    pub fn fail_next_add(&mut self) {
        self.fail_add_remaining += 1;
    }

    pub fn fail_next_del(&mut self) {
        self.fail_del_remaining += 1;
    }
}

impl MrouteSocket for RecordingMrouteSocket {
    fn add_entry(&mut self, ingress: InterfaceId, group: Address, source: Address, outputs: &[InterfaceId]) -> Result<(), Error> {
        if self.fail_add_remaining > 0 {
            self.fail_add_remaining -= 1;
            return Err(Error::KernelProgramFailure(format!("add_entry({}, {}) failed", group, source)));
        }
        self.entries.insert(
            (group, source),
            InstalledEntry {
                ingress,
                outputs: outputs.to_vec(),
            },
        );
        Ok(())
    }

    fn del_entry(&mut self, group: Address, source: Address) -> Result<(), Error> {
        if self.fail_del_remaining > 0 {
            self.fail_del_remaining -= 1;
            return Err(Error::KernelProgramFailure(format!("del_entry({}, {}) failed", group, source)));
        }
        self.entries.remove(&(group, source));
        Ok(())
    }

    fn packet_count(&self, ingress: InterfaceId, group: Address, source: Address) -> u64 {
        self.counters.get(&(ingress, group, source)).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub upstream: InterfaceId,
    pub group: Address,
    pub new_state: FilterState,
    pub old_state: FilterState,
}

/// An upstream report emitter double: every accepted `send_record` call
/// is appended to a log a test can inspect, instead of producing real
/// IGMPv3/MLDv2 wire records.
#[derive(Debug, Clone, Default)]
pub struct RecordingUpstreamSender {
    sent: Vec<SentRecord>,
    fail_next: bool,
}

impl RecordingUpstreamSender {
    pub fn new() -> RecordingUpstreamSender {
        RecordingUpstreamSender::default()
    }

    pub fn sent(&self) -> &[SentRecord] {
        &self.sent
    }

    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }
}

impl UpstreamSender for RecordingUpstreamSender {
    fn send_record(&mut self, upstream: InterfaceId, group: Address, new_state: &FilterState, old_state: &FilterState) -> Result<(), Error> {
        if self.fail_next {
            self.fail_next = false;
            return Err(Error::SendFailure(format!("send_record({}, {}) failed", upstream, group)));
        }
        self.sent.push(SentRecord {
            upstream,
            group,
            new_state: new_state.clone(),
            old_state: old_state.clone(),
        });
        Ok(())
    }
}

/// A downstream querier view double: membership is whatever the test
/// wires up with [`StaticQuerierView::set`], with no protocol state
/// machine behind it.
#[derive(Debug, Clone, Default)]
pub struct StaticQuerierView {
    memberships: BTreeMap<(InterfaceId, Address), FilterState>,
}

impl StaticQuerierView {
    pub fn new() -> StaticQuerierView {
        StaticQuerierView::default()
    }

    pub fn set(&mut self, downstream: InterfaceId, group: Address, state: FilterState) {
        self.memberships.insert((downstream, group), state);
    }
}

impl QuerierView for StaticQuerierView {
    fn group_membership_infos(&self, downstream: InterfaceId, group: Address) -> FilterState {
        self.memberships
            .get(&(downstream, group))
            .cloned()
            .unwrap_or_else(FilterState::empty_include)
    }
}
