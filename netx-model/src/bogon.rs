use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns `true` if `addr` MUST NOT appear in a public DNS answer for a public hostname (§6
/// "Bogon set", §9 open question: `0.0.0.0` counts as a bogon).
pub fn is_bogon(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_bogon_v4(v4),
        IpAddr::V6(v6) => is_bogon_v6(v6),
    }
}

fn is_bogon_v4(addr: Ipv4Addr) -> bool {
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_multicast()
        || addr.is_broadcast()
        || addr.is_unspecified()
        || addr.is_documentation()
        || is_reserved_v4(addr)
}

/// IANA-reserved ranges not already covered by [`Ipv4Addr`]'s own helpers.
fn is_reserved_v4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();

    matches!(octets,
        // 0.0.0.0/8 ("this" network), excluding unspecified which is handled separately.
        [0, ..]
        // 100.64.0.0/10, carrier-grade NAT (RFC 6598).
        | [100, 64..=127, ..]
        // 192.0.0.0/24, IETF protocol assignments.
        | [192, 0, 0, ..]
        // 192.88.99.0/24, former 6to4 relay anycast.
        | [192, 88, 99, ..]
        // 198.18.0.0/15, benchmarking (RFC 2544).
        | [198, 18..=19, ..]
        // 240.0.0.0/4, reserved for future use.
        | [240..=255, ..]
    )
}

fn is_bogon_v6(addr: Ipv6Addr) -> bool {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_bogon_v4(v4);
    }

    addr.is_loopback()
        || addr.is_unspecified()
        || addr.is_multicast()
        || is_unique_local(addr)
        || is_link_local_v6(addr)
        || is_documentation_v6(addr)
}

fn is_unique_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

fn is_link_local_v6(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

fn is_documentation_v6(addr: Ipv6Addr) -> bool {
    // 2001:db8::/32
    addr.segments()[0] == 0x2001 && addr.segments()[1] == 0x0db8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_v4_is_not_bogon() {
        assert!(!is_bogon(IpAddr::from([8, 8, 8, 8])));
        assert!(!is_bogon(IpAddr::from([1, 1, 1, 1])));
    }

    #[test]
    fn private_v4_ranges_are_bogon() {
        assert!(is_bogon(IpAddr::from([10, 10, 11, 10])));
        assert!(is_bogon(IpAddr::from([192, 168, 1, 1])));
        assert!(is_bogon(IpAddr::from([172, 16, 0, 1])));
    }

    #[test]
    fn loopback_link_local_and_unspecified_are_bogon() {
        assert!(is_bogon(IpAddr::from([127, 0, 0, 1])));
        assert!(is_bogon(IpAddr::from([169, 254, 1, 1])));
        assert!(is_bogon(IpAddr::from([0, 0, 0, 0])));
    }

    #[test]
    fn broadcast_and_cgnat_are_bogon() {
        assert!(is_bogon(IpAddr::from([255, 255, 255, 255])));
        assert!(is_bogon(IpAddr::from([100, 64, 0, 1])));
    }

    #[test]
    fn public_v6_is_not_bogon() {
        assert!(!is_bogon("2606:4700:4700::1111".parse().unwrap()));
    }

    #[test]
    fn v6_loopback_and_unique_local_are_bogon() {
        assert!(is_bogon(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_bogon("fd00::1".parse().unwrap()));
        assert!(is_bogon("fe80::1".parse().unwrap()));
    }

    #[test]
    fn v4_mapped_v6_defers_to_v4_rules() {
        assert!(is_bogon("::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_bogon("::ffff:8.8.8.8".parse().unwrap()));
    }
}
