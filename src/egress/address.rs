//! Address classification for SSRF protection
//!
//! Decides whether a resolved IP address belongs to a range that outbound
//! requests must never reach when private-address blocking is enabled.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Blocked address ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    Loopback,
    Private,
    LinkLocal,
    Metadata,
    Unspecified,
    Broadcast,
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressClass::Loopback => "loopback",
            AddressClass::Private => "private",
            AddressClass::LinkLocal => "link-local",
            AddressClass::Metadata => "metadata service",
            AddressClass::Unspecified => "unspecified",
            AddressClass::Broadcast => "broadcast",
        };
        f.write_str(s)
    }
}

/// Cloud metadata endpoints reachable from most instances
const METADATA_V4: &[Ipv4Addr] = &[
    Ipv4Addr::new(169, 254, 169, 254),
    Ipv4Addr::new(169, 254, 170, 2),
    Ipv4Addr::new(100, 100, 100, 200),
];

const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Classify an address, returning `None` for publicly routable ones
pub fn classify(addr: IpAddr) -> Option<AddressClass> {
    match addr {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(addr: Ipv4Addr) -> Option<AddressClass> {
    let octets = addr.octets();

    if METADATA_V4.contains(&addr) {
        return Some(AddressClass::Metadata);
    }
    if addr.is_loopback() {
        return Some(AddressClass::Loopback);
    }
    if addr.is_unspecified() || octets[0] == 0 {
        return Some(AddressClass::Unspecified);
    }
    if addr.is_broadcast() {
        return Some(AddressClass::Broadcast);
    }
    if addr.is_link_local() {
        return Some(AddressClass::LinkLocal);
    }
    // 100.64.0.0/10 shared address space
    let cgnat = octets[0] == 100 && (octets[1] & 0b1100_0000) == 64;
    if addr.is_private() || cgnat {
        return Some(AddressClass::Private);
    }
    None
}

fn classify_v6(addr: Ipv6Addr) -> Option<AddressClass> {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return classify_v4(v4);
    }
    if addr == METADATA_V6 {
        return Some(AddressClass::Metadata);
    }
    if addr.is_loopback() {
        return Some(AddressClass::Loopback);
    }
    if addr.is_unspecified() {
        return Some(AddressClass::Unspecified);
    }

    let first = addr.segments()[0];
    // fe80::/10 link-local
    if first & 0xffc0 == 0xfe80 {
        return Some(AddressClass::LinkLocal);
    }
    // fc00::/7 unique local, fec0::/10 deprecated site-local
    if first & 0xfe00 == 0xfc00 || first & 0xffc0 == 0xfec0 {
        return Some(AddressClass::Private);
    }
    None
}
