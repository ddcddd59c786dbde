//! Basic value types shared by the database, aggregator, and engine:
//! addresses, interface handles, source sets, and filter state, kept
//! separate from the stateful engine logic that consumes them.

mod address;
mod filter;
mod ifindex;
mod set;

pub use address::{Address, Family};
pub use filter::{filter_merge, filter_remainder, merge, AdminFilter, AdminFilterKind, FilterState, SourceMatch};
pub use ifindex::InterfaceId;
pub use set::SourceSet;
