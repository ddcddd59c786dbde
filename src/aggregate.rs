//! The membership aggregator: a pure function from
//! downstream memberships, admin rules, and (for MUTEX) the routing
//! database, to one advertised `FilterState` per upstream interface.
//!
//! FIRST claims a prefix of the pooled membership per upstream in order
//! and carries the rejected remainder forward; MUTEX partitions by
//! current routing-database ingress so no two upstreams ever claim the
//! same source simultaneously.

use std::collections::BTreeMap;

use crate::db::RoutingDatabase;
use crate::wire::{filter_merge, filter_remainder, merge, AdminFilter, Address, FilterState, InterfaceId};

/// Union every downstream's membership into a single starting FilterState.
/// An upstream interface list with no downstreams starts
/// from `INCLUDE{}`, i.e. nothing to advertise.
fn union_downstream_memberships(downstream_memberships: &[(InterfaceId, FilterState)]) -> FilterState {
    downstream_memberships
        .iter()
        .fold(FilterState::empty_include(), |acc, (_, state)| merge(&acc, state))
}

fn inbound_filter_for(upstream: InterfaceId, admin_rules: &BTreeMap<InterfaceId, AdminFilter>) -> AdminFilter {
    admin_rules.get(&upstream).cloned().unwrap_or_else(AdminFilter::accept_all)
}

/// Policy FIRST: upstreams are tried in the given order;
/// each one claims the portion of the pooled membership its inbound
/// filter accepts, and passes the rejected remainder on to the next
/// upstream. Any remainder left after the last upstream is dropped.
pub fn first(
    upstreams_in_order: &[InterfaceId],
    downstream_memberships: &[(InterfaceId, FilterState)],
    admin_rules: &BTreeMap<InterfaceId, AdminFilter>,
) -> BTreeMap<InterfaceId, FilterState> {
    let mut remaining = union_downstream_memberships(downstream_memberships);
    let mut advertised = BTreeMap::new();

    for &upstream in upstreams_in_order {
        let inbound = inbound_filter_for(upstream, admin_rules);
        let claimed = filter_merge(&remaining, &inbound);
        let remainder = filter_remainder(&remaining, &inbound);
        advertised.insert(upstream, claimed);
        remaining = remainder;
    }

    advertised
}

/// Policy MUTEX: each upstream only ever advertises
/// sources whose current routing-database ingress is either unknown or
/// that same upstream — a source already routed in via one upstream can
/// never simultaneously be claimed by another.
pub fn mutex(
    upstreams_in_order: &[InterfaceId],
    downstream_memberships: &[(InterfaceId, FilterState)],
    admin_rules: &BTreeMap<InterfaceId, AdminFilter>,
    group: Address,
    database: &RoutingDatabase,
) -> BTreeMap<InterfaceId, FilterState> {
    let pooled = union_downstream_memberships(downstream_memberships);
    let ingress_map = database.interface_map(group);
    let mut advertised = BTreeMap::new();

    for &upstream in upstreams_in_order {
        let restricted = restrict_to_unclaimed_or_own(&pooled, upstream, &ingress_map);
        let inbound = inbound_filter_for(upstream, admin_rules);
        advertised.insert(upstream, filter_merge(&restricted, &inbound));
    }

    advertised
}

/// Remove from `state` any source whose database ingress is a *different*
/// upstream than `upstream`. Sources with no recorded ingress (not yet
/// seen as traffic, or only ever seen on a downstream) are left alone —
/// MUTEX only arbitrates between upstreams that have already claimed a
/// source as their ingress.
fn restrict_to_unclaimed_or_own(
    state: &FilterState,
    upstream: InterfaceId,
    ingress_map: &BTreeMap<Address, InterfaceId>,
) -> FilterState {
    let claimed_elsewhere = ingress_map
        .iter()
        .filter(|(_, ingress)| **ingress != upstream)
        .map(|(source, _)| *source)
        .collect();

    filter_merge(state, &AdminFilter::blacklist(claimed_elsewhere))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Instant;
    use crate::wire::SourceSet;
    use std::net::Ipv4Addr;

    fn ifid(n: u32) -> InterfaceId {
        InterfaceId::new(n).unwrap()
    }

    fn addr(n: u8) -> Address {
        Address::v4(Ipv4Addr::new(10, 0, 0, n))
    }

    fn group() -> Address {
        Address::v4(Ipv4Addr::new(239, 1, 1, 1))
    }

    fn include(addrs: &[u8]) -> FilterState {
        FilterState::Include(addrs.iter().map(|n| addr(*n)).collect::<SourceSet>())
    }

    #[test]
    fn first_policy_carries_remainder_to_next_upstream() {
        let upstreams = vec![ifid(1), ifid(2)];
        let downstream = vec![(ifid(10), include(&[1, 2, 3]))];

        let mut rules = BTreeMap::new();
        rules.insert(ifid(1), AdminFilter::whitelist([addr(1)].into_iter().collect()));
        // upstream 2 has no rule: accept-all, so it should get the remainder {2, 3}.

        let advertised = first(&upstreams, &downstream, &rules);
        assert_eq!(advertised[&ifid(1)], include(&[1]));
        assert_eq!(advertised[&ifid(2)], include(&[2, 3]));
    }

    #[test]
    fn first_policy_drops_remainder_after_last_upstream() {
        let upstreams = vec![ifid(1)];
        let downstream = vec![(ifid(10), include(&[1, 2]))];
        let mut rules = BTreeMap::new();
        rules.insert(ifid(1), AdminFilter::whitelist([addr(1)].into_iter().collect()));

        let advertised = first(&upstreams, &downstream, &rules);
        assert_eq!(advertised.len(), 1);
        assert_eq!(advertised[&ifid(1)], include(&[1]));
    }

    #[test]
    fn mutex_policy_excludes_sources_routed_via_another_upstream() {
        let upstreams = vec![ifid(1), ifid(2)];
        let downstream = vec![(ifid(10), include(&[1, 2]))];
        let rules = BTreeMap::new();

        let mut db = RoutingDatabase::new();
        db.set_source(ifid(1), group(), addr(1), 1, Instant::from_secs(0));

        let advertised = mutex(&upstreams, &downstream, &rules, group(), &db);
        // source 1 is already routed via upstream 1: upstream 2 must not claim it.
        assert!(!advertised[&ifid(2)].accepts(&addr(1)));
        assert!(advertised[&ifid(1)].accepts(&addr(1)));
    }

    #[test]
    fn mutex_policy_leaves_unrouted_sources_available_to_every_upstream() {
        let upstreams = vec![ifid(1), ifid(2)];
        let downstream = vec![(ifid(10), include(&[3]))];
        let rules = BTreeMap::new();
        let db = RoutingDatabase::new();

        let advertised = mutex(&upstreams, &downstream, &rules, group(), &db);
        assert!(advertised[&ifid(1)].accepts(&addr(3)));
        assert!(advertised[&ifid(2)].accepts(&addr(3)));
    }

    #[test]
    fn aggregator_is_deterministic_across_repeated_runs() {
        let upstreams = vec![ifid(1), ifid(2)];
        let downstream = vec![(ifid(10), include(&[1, 2, 3])), (ifid(11), include(&[3, 4]))];
        let mut rules = BTreeMap::new();
        rules.insert(ifid(1), AdminFilter::whitelist([addr(1), addr(3)].into_iter().collect()));

        let run1 = first(&upstreams, &downstream, &rules);
        let run2 = first(&upstreams, &downstream, &rules);
        assert_eq!(run1, run2);
    }
}
