use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address family tag, carried alongside every [`Address`] so equality and
/// ordering never compare a v4 and a v6 address as if they shared a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    V4,
    V6,
}

/// A family-tagged IP address with an optional port. Ordering is family-first, then
/// bytewise, then by port — `std::net::IpAddr`'s derived `Ord` already
/// orders `V4` before `V6` and compares octets bytewise within a family, so
/// this type composes with it rather than hand-rolling comparisons.
///
/// The port field exists for parity with a `sockaddr_in`/`sockaddr_in6`-style
/// address storage, which always carries a port; nothing in the
/// routing-management core reads it, it is carried for `Display` fidelity
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    ip: IpAddr,
    port: u16,
}

impl Address {
    pub const fn new(ip: IpAddr, port: u16) -> Address {
        Address { ip, port }
    }

    pub fn v4(addr: Ipv4Addr) -> Address {
        Address::new(IpAddr::V4(addr), 0)
    }

    pub fn v6(addr: Ipv6Addr) -> Address {
        Address::new(IpAddr::V6(addr), 0)
    }

    /// The wildcard (all-zeros) source address in the given family. This
    /// never occurs in a database `SourceRecord`; it is
    /// only meaningful as an admin-rule "match all" marker (see
    /// `wire::filter::SourceMatch::Wildcard`, which models that marker
    /// without ever materializing this value into a `SourceSet`).
    pub fn wildcard(family: Family) -> Address {
        match family {
            Family::V4 => Address::v4(Ipv4Addr::UNSPECIFIED),
            Family::V6 => Address::v6(Ipv6Addr::UNSPECIFIED),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn family(&self) -> Family {
        match self.ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.ip.is_unspecified()
    }

    pub fn with_port(self, port: u16) -> Address {
        Address { port, ..self }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Address {
        Address::v4(addr)
    }
}

impl From<Ipv6Addr> for Address {
    fn from(addr: Ipv6Addr) -> Address {
        Address::v6(addr)
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Address {
        Address::new(ip, 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.port == 0 {
            write!(f, "{}", self.ip)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}
