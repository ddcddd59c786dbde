//! Error kinds the core recognises. Modelled as a plain enum
//! with a manual `Display`/`std::error::Error` impl — no `thiserror`,
//! matching the rest of this crate's error types.

use std::fmt;

use crate::wire::{Address, InterfaceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An event named an interface that configuration never declared.
    /// The event is dropped with a warning, never propagated as a fault.
    UnknownInterface(InterfaceId),

    /// A new-source event arrived on an interface different from the one
    /// already recorded for (G,S). The kept record wins; this event is
    /// dropped.
    UnexpectedIngress { group: Address, source: Address, recorded: InterfaceId, observed: InterfaceId },

    /// A kernel routing-socket write failed. Retried once immediately by
    /// the caller; a second consecutive failure degrades non-fatally.
    KernelProgramFailure(String),

    /// An upstream report failed to send. Retriable on the next relevant
    /// event for that (upstream, group).
    SendFailure(String),

    /// A rule-matching policy value, or another piece of startup
    /// configuration, was out of range. Always fatal at startup, never at
    /// runtime.
    PolicyError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownInterface(id) => write!(f, "unknown interface {}", id),
            Error::UnexpectedIngress { group, source, recorded, observed } => write!(
                f,
                "source {} of group {} arrived on {} but is recorded with ingress {}",
                source, group, observed, recorded
            ),
            Error::KernelProgramFailure(msg) => write!(f, "kernel routing-socket program failure: {}", msg),
            Error::SendFailure(msg) => write!(f, "upstream report send failure: {}", msg),
            Error::PolicyError(msg) => write!(f, "configuration policy error: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
