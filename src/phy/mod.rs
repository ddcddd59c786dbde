//! External-interface contracts the engine consumes but does not own,
//! plus in-memory recording test doubles.
//!
//! The shape follows a `Device`-style trait boundary: an owner holds no
//! concrete transport, only a `&mut dyn Trait`, so the same logic drives
//! a real kernel facility or an in-memory recording double in tests.
//! `MrouteSocket`/`UpstreamSender`/`QuerierView` play that role here for
//! the kernel routing socket, the upstream report emitter, and a
//! downstream querier's membership view respectively.

pub mod recording;

use crate::wire::{Address, FilterState, InterfaceId};

/// The kernel multicast-routing socket. `add_entry`/`del_entry` install or remove a forwarding
/// entry; `packet_count` reads the kernel's monotonic per-entry counter
/// that drives source-liveness refresh.
pub trait MrouteSocket {
    fn add_entry(&mut self, ingress: InterfaceId, group: Address, source: Address, outputs: &[InterfaceId]) -> Result<(), crate::error::Error>;
    fn del_entry(&mut self, group: Address, source: Address) -> Result<(), crate::error::Error>;
    fn packet_count(&self, ingress: InterfaceId, group: Address, source: Address) -> u64;
}

/// The upstream report emitter. Translates a FilterState transition into the state-change or
/// current-state records IGMPv3/MLDv2 define; this crate only needs to
/// know the transition happened and whether it was sent successfully.
pub trait UpstreamSender {
    fn send_record(&mut self, upstream: InterfaceId, group: Address, new_state: &FilterState, old_state: &FilterState) -> Result<(), crate::error::Error>;
}

/// A downstream interface's current querier-reported membership. A pure
/// getter: the engine polls it rather than being pushed to, matching a
/// `collect_interested_interfaces`-style sweep.
pub trait QuerierView {
    fn group_membership_infos(&self, downstream: InterfaceId, group: Address) -> FilterState;
}
