//! The routing-management engine: owns the routing
//! database, the timer handles, and the last-advertised FilterState per
//! (upstream, group); dispatches events to completion, one at a time,
//! with no locking.
//!
//! A direct structural port of `simple_routing_management`'s method set
//! onto one Rust type, generic
//! over the `phy` traits and the `timer::Scheduler` the way an
//! `Interface<D: Device>` is generic over its transport.

use std::collections::BTreeMap;

use crate::aggregate;
use crate::config::{AdminConfig, Direction, RuleMatchingPolicy};
use crate::db::{RefreshOutcome, RoutingDatabase};
use crate::error::Error;
use crate::phy::{MrouteSocket, QuerierView, UpstreamSender};
use crate::time::Instant;
use crate::timer::{Scheduler, TimerHandle};
use crate::wire::{Address, FilterState, InterfaceId};

/// A message carried by the engine's timer queue. The only payload today
/// is source-liveness maintenance; kept as an enum so a
/// future timer kind doesn't require a second scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMessage {
    SourceLiveness { group: Address, source: Address },
}

/// An event the engine consumes, in enqueue order, to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NewSource { ingress: InterfaceId, group: Address, source: Address },
    QuerierStateChange { downstream: InterfaceId, group: Address },
    Timer { handle: TimerHandle, message: TimerMessage },
}

struct SourceTimer {
    handle: TimerHandle,
}

pub struct Engine<S, U, Q, T> {
    config: AdminConfig,
    database: RoutingDatabase,
    socket: S,
    sender: U,
    queriers: Q,
    scheduler: T,
    advertised: BTreeMap<(InterfaceId, Address), FilterState>,
    source_timers: BTreeMap<(Address, Address), SourceTimer>,
    groups_seen: std::collections::BTreeSet<Address>,
}

impl<S, U, Q, T> Engine<S, U, Q, T>
where
    S: MrouteSocket,
    U: UpstreamSender,
    Q: QuerierView,
    T: Scheduler<TimerMessage>,
{
    pub fn new(config: AdminConfig, socket: S, sender: U, queriers: Q, scheduler: T) -> Engine<S, U, Q, T> {
        Engine {
            config,
            database: RoutingDatabase::new(),
            socket,
            sender,
            queriers,
            scheduler,
            advertised: BTreeMap::new(),
            source_timers: BTreeMap::new(),
            groups_seen: std::collections::BTreeSet::new(),
        }
    }

    pub fn database(&self) -> &RoutingDatabase {
        &self.database
    }

    pub fn advertised(&self, upstream: InterfaceId, group: Address) -> Option<&FilterState> {
        self.advertised.get(&(upstream, group))
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn sender(&self) -> &U {
        &self.sender
    }

    pub fn queriers_mut(&mut self) -> &mut Q {
        &mut self.queriers
    }

    /// Pop and handle every timer message due at `now`, then dispatch
    /// `event`. Events are processed in enqueue order — the caller is the
    /// one enqueuing event order; this just runs both kinds to completion,
    /// never reordering relative to the kernel writes each one performs.
    pub fn dispatch(&mut self, event: Event, now: Instant) {
        match event {
            Event::NewSource { ingress, group, source } => self.handle_new_source(ingress, group, source, now),
            Event::QuerierStateChange { downstream, group } => self.handle_querier_state_change(downstream, group, now),
            Event::Timer { handle, message } => self.handle_timer(handle, message, now),
        }
    }

    /// Drain every timer message the scheduler has ready at `now`,
    /// dispatching each as an [`Event::Timer`]. A host loop calls this
    /// between receiving real events.
    pub fn run_due_timers(&mut self, now: Instant) {
        let due = self.scheduler.pop_due(now);
        for (handle, message) in due {
            self.dispatch(Event::Timer { handle, message }, now);
        }
    }

    fn handle_new_source(&mut self, ingress: InterfaceId, group: Address, source: Address, now: Instant) {
        if self.config.role(ingress).is_none() {
            mr_warn!("{}", Error::UnknownInterface(ingress));
            return;
        }

        let packet_count = self.socket.packet_count(ingress, group, source);
        if !self.database.set_source(ingress, group, source, packet_count, now) {
            let recorded = self.database.record(group, source).map(|r| r.ingress()).unwrap_or(ingress);
            mr_warn!("{}", Error::UnexpectedIngress { group, source, recorded, observed: ingress });
            return;
        }
        self.groups_seen.insert(group);

        let outputs = self.interested_downstreams(group, source);
        self.add_entry_with_retry(ingress, group, source, &outputs);

        self.schedule_source_liveness(group, source, now);
        self.recompute_and_emit_upstreams(group, now);
    }

    fn handle_querier_state_change(&mut self, downstream: InterfaceId, group: Address, now: Instant) {
        if self.config.role(downstream).is_none() {
            mr_warn!("{}", Error::UnknownInterface(downstream));
            return;
        }

        self.groups_seen.insert(group);
        self.recompute_and_emit_upstreams(group, now);
        self.reprogram_sources_for_group(group);
    }

    /// Install a kernel entry, retrying once immediately on failure. A
    /// second consecutive failure is logged and the degradation left
    /// standing; the database and timers proceed regardless, matching
    /// the next maintenance cycle's own reprogramming pass.
    fn add_entry_with_retry(&mut self, ingress: InterfaceId, group: Address, source: Address, outputs: &[InterfaceId]) {
        if let Err(e) = self.socket.add_entry(ingress, group, source, outputs) {
            mr_warn!("add_entry({}, {}) failed, retrying once: {}", group, source, e);
            if let Err(e) = self.socket.add_entry(ingress, group, source, outputs) {
                mr_error!("add_entry({}, {}) failed again, giving up: {}", group, source, e);
            }
        }
    }

    /// Remove a kernel entry, retrying once immediately on failure, with
    /// the same degrade-on-second-failure semantics as
    /// [`Engine::add_entry_with_retry`].
    fn del_entry_with_retry(&mut self, group: Address, source: Address) {
        if let Err(e) = self.socket.del_entry(group, source) {
            mr_warn!("del_entry({}, {}) failed, retrying once: {}", group, source, e);
            if let Err(e) = self.socket.del_entry(group, source) {
                mr_error!("del_entry({}, {}) failed again, giving up: {}", group, source, e);
            }
        }
    }

    fn handle_timer(&mut self, handle: TimerHandle, message: TimerMessage, now: Instant) {
        let TimerMessage::SourceLiveness { group, source } = message;

        match self.source_timers.get(&(group, source)) {
            Some(timer) if timer.handle == handle => {}
            _ => return, // stale or cancelled: ignore on arrival.
        }

        let packet_count = self.database.record(group, source).map(|r| r.ingress()).map(|ingress| self.socket.packet_count(ingress, group, source));

        let Some(packet_count) = packet_count else {
            self.source_timers.remove(&(group, source));
            return;
        };

        match self.database.refresh_or_evict(group, source, packet_count, now) {
            RefreshOutcome::Refreshed => {
                self.schedule_source_liveness(group, source, now);
            }
            RefreshOutcome::Evicted => {
                self.source_timers.remove(&(group, source));
                self.del_entry_with_retry(group, source);
                self.recompute_and_emit_upstreams(group, now);
            }
        }
    }

    fn schedule_source_liveness(&mut self, group: Address, source: Address, now: Instant) {
        if let Some(existing) = self.source_timers.remove(&(group, source)) {
            self.scheduler.cancel(existing.handle);
        }
        let at = now + self.config.source_lifetime();
        let handle = self.scheduler.schedule(at, TimerMessage::SourceLiveness { group, source });
        self.source_timers.insert((group, source), SourceTimer { handle });
    }

    /// Downstream interfaces, after their `out` admin filter, that accept
    /// `source` in `group`.
    fn interested_downstreams(&self, group: Address, source: Address) -> Vec<InterfaceId> {
        self.config
            .downstreams()
            .into_iter()
            .filter(|&downstream| {
                let membership = self.queriers.group_membership_infos(downstream, group);
                let out_filter = self.config.filter_for(downstream, Direction::Out, group);
                let filtered = crate::wire::filter_merge(&membership, &out_filter);
                filtered.accepts(&source)
            })
            .collect()
    }

    fn downstream_memberships_for(&self, group: Address) -> Vec<(InterfaceId, FilterState)> {
        self.config
            .downstreams()
            .into_iter()
            .map(|downstream| {
                let membership = self.queriers.group_membership_infos(downstream, group);
                let out_filter = self.config.filter_for(downstream, Direction::Out, group);
                (downstream, crate::wire::filter_merge(&membership, &out_filter))
            })
            .collect()
    }

    fn in_filters_for_upstreams(&self, group: Address) -> BTreeMap<InterfaceId, crate::wire::AdminFilter> {
        self.config
            .upstreams()
            .into_iter()
            .map(|upstream| (upstream, self.config.filter_for(upstream, Direction::In, group)))
            .collect()
    }

    /// Recompute `advertised[U,G]` for every upstream U and emit a report
    /// on each one whose advertised state changed (`querier-state-change`
    /// step 1 and `new-source` indirectly through the upstream set). On a
    /// failed send the cache is left untouched so the next relevant event
    /// retries it.
    fn recompute_and_emit_upstreams(&mut self, group: Address, _now: Instant) {
        let upstreams = self.config.upstreams();
        let downstream_memberships = self.downstream_memberships_for(group);
        let in_filters = self.in_filters_for_upstreams(group);

        let next = match self.config.policy() {
            RuleMatchingPolicy::First => aggregate::first(&upstreams, &downstream_memberships, &in_filters),
            RuleMatchingPolicy::Mutex => aggregate::mutex(&upstreams, &downstream_memberships, &in_filters, group, &self.database),
        };

        for upstream in upstreams {
            let new_state = next.get(&upstream).cloned().unwrap_or_else(FilterState::empty_include);
            let old_state = self.advertised.get(&(upstream, group)).cloned().unwrap_or_else(FilterState::empty_include);
            if new_state == old_state {
                continue;
            }
            match self.sender.send_record(upstream, group, &new_state, &old_state) {
                Ok(()) => {
                    self.advertised.insert((upstream, group), new_state);
                }
                Err(e) => {
                    mr_error!("send_record({}, {}) failed, advertised state not updated: {}", upstream, group, e);
                }
            }
        }
    }

    /// For every source currently forwarded for `group`, recompute the
    /// downstream output set. If it is empty, no downstream wants the
    /// source any longer: evict it from the database and remove its
    /// kernel entry. Otherwise reprogram the entry with the new output
    /// set (`querier-state-change` step 2).
    fn reprogram_sources_for_group(&mut self, group: Address) {
        let sources = self.database.available_sources(group);
        let interface_map = self.database.interface_map(group);

        for source in sources {
            let Some(&ingress) = interface_map.get(&source) else { continue };
            let outputs = self.interested_downstreams(group, source);

            if outputs.is_empty() {
                self.database.del_source(group, source);
                if let Some(timer) = self.source_timers.remove(&(group, source)) {
                    self.scheduler.cancel(timer.handle);
                }
                self.del_entry_with_retry(group, source);
            } else {
                self.add_entry_with_retry(ingress, group, source, &outputs);
            }
        }
    }

    /// Remove every source and stop advertising every group; schedule no
    /// further timers. Called on shutdown: pending timers are cancelled
    /// and the kernel entries programmed by this engine are removed.
    pub fn shutdown(&mut self) {
        let groups: Vec<Address> = self.groups_seen.iter().copied().collect();
        for group in groups {
            for source in self.database.available_sources(group) {
                for timer in self.source_timers.get(&(group, source)) {
                    self.scheduler.cancel(timer.handle);
                }
                self.source_timers.remove(&(group, source));
                let _ = self.socket.del_entry(group, source);
                self.database.del_source(group, source);
            }
        }
        self.advertised.clear();
    }

    /// A textual dump of database state and per-(upstream, group)
    /// advertised filter state, for diagnostics only. The format is for
    /// humans, not wire-compatibility.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str("routing database:\n");
        out.push_str(&self.database.to_string());
        out.push_str("advertised state:\n");
        for ((upstream, group), state) in &self.advertised {
            out.push_str(&format!("  {} / {}: {}\n", upstream, group, state));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawConfig, RuleMatchingPolicy as Policy};
    use crate::phy::recording::{RecordingMrouteSocket, RecordingUpstreamSender, StaticQuerierView};
    use crate::timer::WheelScheduler;
    use crate::wire::SourceSet;
    use std::net::Ipv4Addr;

    fn ifid(n: u32) -> InterfaceId {
        InterfaceId::new(n).unwrap()
    }

    fn group() -> Address {
        Address::v4(Ipv4Addr::new(239, 1, 1, 1))
    }

    fn source() -> Address {
        Address::v4(Ipv4Addr::new(10, 0, 0, 5))
    }

    fn config_first(toml: &str, map: &'static [(&'static str, u32)]) -> AdminConfig {
        let raw = RawConfig::parse(toml).unwrap();
        AdminConfig::try_from_raw(raw, move |name: &str| map.iter().find(|(n, _)| *n == name).and_then(|(_, idx)| InterfaceId::new(*idx))).unwrap()
    }

    type TestEngine = Engine<RecordingMrouteSocket, RecordingUpstreamSender, StaticQuerierView, WheelScheduler<TimerMessage>>;

    fn build_engine(toml: &str, map: &'static [(&'static str, u32)]) -> TestEngine {
        let config = config_first(toml, map);
        Engine::new(config, RecordingMrouteSocket::new(), RecordingUpstreamSender::new(), StaticQuerierView::new(), WheelScheduler::new())
    }

    const SCENARIO_A_TOML: &str = r#"
rule_matching_policy = "first"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"
"#;

    #[test]
    fn scenario_a_first_single_upstream_single_downstream_no_filters() {
        let mut engine = build_engine(SCENARIO_A_TOML, &[("u0", 1), ("d0", 2)]);
        engine.queriers.set(ifid(2), group(), FilterState::Include(SourceSet::singleton(source())));

        engine.dispatch(Event::QuerierStateChange { downstream: ifid(2), group: group() }, Instant::from_secs(0));
        assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(source())));

        engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: source() }, Instant::from_secs(1));
        let entry = engine.socket.entry(group(), source()).unwrap();
        assert_eq!(entry.outputs, vec![ifid(2)]);
    }

    const SCENARIO_B_TOML: &str = r#"
rule_matching_policy = "first"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "u1"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"

[[rule]]
interface = "u0"
direction = "in"
kind = "blacklist"
group = "*"
source = "10.0.0.5"
"#;

    #[test]
    fn scenario_b_first_with_blacklist_on_first_upstream() {
        let mut engine = build_engine(SCENARIO_B_TOML, &[("u0", 1), ("u1", 2), ("d0", 3)]);
        let other_source = Address::v4(Ipv4Addr::new(10, 0, 0, 6));
        let mut membership = SourceSet::new();
        membership.insert(source());
        membership.insert(other_source);
        engine.queriers.set(ifid(3), group(), FilterState::Include(membership));

        engine.dispatch(Event::QuerierStateChange { downstream: ifid(3), group: group() }, Instant::from_secs(0));

        assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(other_source)));
        assert_eq!(engine.advertised(ifid(2), group()).unwrap(), &FilterState::Include(SourceSet::singleton(source())));
    }

    const SCENARIO_C_TOML: &str = r#"
rule_matching_policy = "mutex"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "u1"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"
"#;

    #[test]
    fn scenario_c_mutex_with_two_upstreams_same_candidate_source() {
        let mut engine = build_engine(SCENARIO_C_TOML, &[("u0", 1), ("u1", 2), ("d0", 3)]);
        engine.queriers.set(ifid(3), group(), FilterState::Include(SourceSet::singleton(source())));
        engine.database.set_source(ifid(1), group(), source(), 1, Instant::from_secs(0));

        engine.dispatch(Event::QuerierStateChange { downstream: ifid(3), group: group() }, Instant::from_secs(0));

        assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(source())));
        assert_eq!(engine.advertised(ifid(2), group()).unwrap(), &FilterState::empty_include());
    }

    #[test]
    fn scenario_d_source_eviction_after_counter_stalls() {
        let mut engine = build_engine(SCENARIO_A_TOML, &[("u0", 1), ("d0", 2)]);
        engine.socket.advance_packet_count(ifid(1), group(), source(), 1);
        engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: source() }, Instant::from_secs(0));

        let timer1 = engine.source_timers[&(group(), source())].handle;
        engine.socket.advance_packet_count(ifid(1), group(), source(), 2);
        engine.dispatch(Event::Timer { handle: timer1, message: TimerMessage::SourceLiveness { group: group(), source: source() } }, Instant::from_secs(125));
        assert!(engine.database.record(group(), source()).is_some());

        let timer2 = engine.source_timers[&(group(), source())].handle;
        engine.socket.advance_packet_count(ifid(1), group(), source(), 3);
        engine.dispatch(Event::Timer { handle: timer2, message: TimerMessage::SourceLiveness { group: group(), source: source() } }, Instant::from_secs(250));
        assert!(engine.database.record(group(), source()).is_some());

        let timer3 = engine.source_timers[&(group(), source())].handle;
        // counter does not advance this time.
        engine.dispatch(Event::Timer { handle: timer3, message: TimerMessage::SourceLiveness { group: group(), source: source() } }, Instant::from_secs(375));
        assert!(engine.database.record(group(), source()).is_none());
        assert!(engine.socket.entry(group(), source()).is_none());
    }

    #[test]
    fn add_entry_failure_recovers_after_one_retry() {
        let mut engine = build_engine(SCENARIO_A_TOML, &[("u0", 1), ("d0", 2)]);
        engine.socket.fail_next_add();

        engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: source() }, Instant::from_secs(0));

        assert!(engine.socket.entry(group(), source()).is_some());
    }

    #[test]
    fn add_entry_failing_twice_in_a_row_degrades_without_escalating() {
        let mut engine = build_engine(SCENARIO_A_TOML, &[("u0", 1), ("d0", 2)]);
        engine.socket.fail_next_add();
        engine.socket.fail_next_add();

        engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: source() }, Instant::from_secs(0));

        // no kernel entry got installed, but the database bookkeeping
        // proceeded regardless: the event was not escalated.
        assert!(engine.socket.entry(group(), source()).is_none());
        assert!(engine.database.record(group(), source()).is_some());
    }

    #[test]
    fn stale_timer_handle_is_ignored_on_arrival() {
        let mut engine = build_engine(SCENARIO_A_TOML, &[("u0", 1), ("d0", 2)]);
        engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: source() }, Instant::from_secs(0));

        let real_handle = engine.source_timers[&(group(), source())].handle;
        // Refresh reschedules, invalidating the old handle's association.
        engine.socket.advance_packet_count(ifid(1), group(), source(), 99);
        engine.dispatch(Event::Timer { handle: real_handle, message: TimerMessage::SourceLiveness { group: group(), source: source() } }, Instant::from_secs(1));

        let stale_handle = real_handle;
        engine.dispatch(Event::Timer { handle: stale_handle, message: TimerMessage::SourceLiveness { group: group(), source: source() } }, Instant::from_secs(2));
        // the stale handle must not have evicted the freshly-scheduled record.
        assert!(engine.database.record(group(), source()).is_some());
    }
}
