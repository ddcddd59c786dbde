//! End-to-end scenarios A-F, each driving a full `Engine`
//! against the `phy::recording` test doubles and a `WheelScheduler`.

use std::net::Ipv4Addr;

use mroute_core::config::{AdminConfig, RawConfig};
use mroute_core::engine::{Engine, Event, TimerMessage};
use mroute_core::phy::recording::{RecordingMrouteSocket, RecordingUpstreamSender, StaticQuerierView};
use mroute_core::time::Instant;
use mroute_core::timer::WheelScheduler;
use mroute_core::wire::{Address, FilterState, InterfaceId, SourceSet};

type TestEngine = Engine<RecordingMrouteSocket, RecordingUpstreamSender, StaticQuerierView, WheelScheduler<TimerMessage>>;

fn ifid(n: u32) -> InterfaceId {
    InterfaceId::new(n).unwrap()
}

fn group() -> Address {
    Address::v4(Ipv4Addr::new(239, 1, 1, 1))
}

fn src(n: u8) -> Address {
    Address::v4(Ipv4Addr::new(10, 0, 0, n))
}

fn build(toml: &str, map: &'static [(&'static str, u32)]) -> TestEngine {
    let _ = env_logger::try_init();
    let raw = RawConfig::parse(toml).unwrap();
    let config = AdminConfig::try_from_raw(raw, move |name: &str| map.iter().find(|(n, _)| *n == name).and_then(|(_, idx)| InterfaceId::new(*idx))).unwrap();
    Engine::new(config, RecordingMrouteSocket::new(), RecordingUpstreamSender::new(), StaticQuerierView::new(), WheelScheduler::new())
}

#[test]
fn scenario_a_first_single_upstream_single_downstream_no_filters() {
    const TOML: &str = r#"
rule_matching_policy = "first"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"
"#;
    let mut engine = build(TOML, &[("u0", 1), ("d0", 2)]);
    engine.queriers_mut().set(ifid(2), group(), FilterState::Include(SourceSet::singleton(src(5))));

    engine.dispatch(Event::QuerierStateChange { downstream: ifid(2), group: group() }, Instant::from_secs(0));
    assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(src(5))));

    // RPF-shifted: the kernel resolves the real ingress to u0 regardless
    // of which interface first noticed the packet.
    engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: src(5) }, Instant::from_secs(1));
    let entry = engine.socket().entry(group(), src(5)).unwrap();
    assert_eq!(entry.outputs, vec![ifid(2)]);
}

#[test]
fn scenario_b_first_with_blacklist_on_first_upstream() {
    const TOML: &str = r#"
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
    let mut engine = build(TOML, &[("u0", 1), ("u1", 2), ("d0", 3)]);
    let mut membership = SourceSet::new();
    membership.insert(src(5));
    membership.insert(src(6));
    engine.queriers_mut().set(ifid(3), group(), FilterState::Include(membership));

    engine.dispatch(Event::QuerierStateChange { downstream: ifid(3), group: group() }, Instant::from_secs(0));

    assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(src(6))));
    assert_eq!(engine.advertised(ifid(2), group()).unwrap(), &FilterState::Include(SourceSet::singleton(src(5))));
}

#[test]
fn scenario_c_mutex_with_two_upstreams_same_candidate_source() {
    const TOML: &str = r#"
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
    let mut engine = build(TOML, &[("u0", 1), ("u1", 2), ("d0", 3)]);
    engine.queriers_mut().set(ifid(3), group(), FilterState::Include(SourceSet::singleton(src(5))));

    // new-source first so the source's ingress (u0) is on record before
    // the aggregator runs, the way MUTEX expects it to be.
    engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: src(5) }, Instant::from_secs(0));
    engine.dispatch(Event::QuerierStateChange { downstream: ifid(3), group: group() }, Instant::from_secs(0));

    assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(src(5))));
    assert_eq!(engine.advertised(ifid(2), group()).unwrap(), &FilterState::empty_include());
}

#[test]
fn scenario_d_source_eviction_after_counter_stalls() {
    const TOML: &str = r#"
rule_matching_policy = "first"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"
"#;
    let mut engine = build(TOML, &[("u0", 1), ("d0", 2)]);

    engine.dispatch(Event::NewSource { ingress: ifid(1), group: group(), source: src(5) }, Instant::from_secs(0));
    assert!(engine.database().record(group(), src(5)).is_some());

    // Two maintenance cycles with an advancing counter: both refresh.
    engine.socket_mut().advance_packet_count(ifid(1), group(), src(5), 1);
    engine.run_due_timers(Instant::from_secs(125));
    assert!(engine.database().record(group(), src(5)).is_some());

    engine.socket_mut().advance_packet_count(ifid(1), group(), src(5), 2);
    engine.run_due_timers(Instant::from_secs(250));
    assert!(engine.database().record(group(), src(5)).is_some());

    // Counter stalls: the third cycle evicts and removes the kernel entry.
    engine.run_due_timers(Instant::from_secs(375));
    assert!(engine.database().record(group(), src(5)).is_none());
    assert!(engine.socket().entry(group(), src(5)).is_none());
}

#[test]
fn scenario_e_exclude_downstream_plus_whitelist_admin() {
    const TOML: &str = r#"
rule_matching_policy = "first"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"

[[rule]]
interface = "u0"
direction = "in"
kind = "whitelist"
group = "*"
source = "10.0.0.5"

[[rule]]
interface = "u0"
direction = "in"
kind = "whitelist"
group = "*"
source = "10.0.0.6"
"#;
    let mut engine = build(TOML, &[("u0", 1), ("d0", 2)]);
    engine.queriers_mut().set(ifid(2), group(), FilterState::Exclude(SourceSet::singleton(src(5))));

    engine.dispatch(Event::QuerierStateChange { downstream: ifid(2), group: group() }, Instant::from_secs(0));

    assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::Include(SourceSet::singleton(src(6))));
}

#[test]
fn scenario_f_wildcard_elimination() {
    const TOML: &str = r#"
rule_matching_policy = "first"
group_membership_interval_secs = 125

[[interface]]
name = "u0"
role = "upstream"

[[interface]]
name = "d0"
role = "downstream"

[[rule]]
interface = "u0"
direction = "in"
kind = "blacklist"
group = "*"
source = "*"
"#;
    let mut engine = build(TOML, &[("u0", 1), ("d0", 2)]);
    engine.queriers_mut().set(ifid(2), group(), FilterState::Include(SourceSet::singleton(src(5))));

    engine.dispatch(Event::QuerierStateChange { downstream: ifid(2), group: group() }, Instant::from_secs(0));

    assert_eq!(engine.advertised(ifid(1), group()).unwrap(), &FilterState::empty_include());
}
