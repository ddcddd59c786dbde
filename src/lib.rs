//! Routing-management core of a userspace IP multicast proxy.
//!
//! Three pieces compose into one single-threaded engine: a
//! [`db::RoutingDatabase`] tracking observed (group, source) sightings
//! and their ingress interface; a pure [`aggregate`] module reducing
//! per-downstream membership and admin rules into a per-upstream
//! [`wire::FilterState`] under either the FIRST or MUTEX rule-matching
//! policy; and [`engine::Engine`], which dispatches new-source,
//! querier-state-change, and timer events to completion against those
//! two and a kernel routing socket.
//!
//! Kernel and network access are consumed through the traits in [`phy`]
//! rather than owned directly, so the engine runs unchanged against a
//! real OS socket or an in-memory test double.

#[macro_use]
mod macros;

pub mod aggregate;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod phy;
pub mod time;
pub mod timer;
pub mod wire;

pub use config::{AdminConfig, RawConfig};
pub use db::RoutingDatabase;
pub use engine::{Engine, Event, TimerMessage};
pub use error::Error;
