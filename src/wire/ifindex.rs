use std::fmt;
use std::num::NonZeroU32;

/// An opaque, OS-assigned interface index: an opaque non-zero
/// unsigned integer. Kept as a newtype over `NonZeroU32` rather than a
/// bare integer so a stray `0` (never a valid interface on Linux) cannot
/// silently round-trip through the routing database or the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(NonZeroU32);

impl InterfaceId {
    pub fn new(index: u32) -> Option<InterfaceId> {
        NonZeroU32::new(index).map(InterfaceId)
    }

    pub const fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "if#{}", self.0)
    }
}

impl TryFrom<u32> for InterfaceId {
    type Error = &'static str;

    fn try_from(index: u32) -> Result<InterfaceId, &'static str> {
        InterfaceId::new(index).ok_or("interface index must be non-zero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(InterfaceId::new(0).is_none());
    }

    #[test]
    fn round_trips_the_index() {
        let id = InterfaceId::new(7).unwrap();
        assert_eq!(id.get(), 7);
    }
}
