//! Client address validation ahead of a lookup.

use ipnet::Ipv4Net;
use once_cell::sync::Lazy;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Why an address was not looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No address was supplied
    Empty,
    /// Not an IPv4 (or IPv4-mapped IPv6) address
    NotIpv4,
    /// RFC 1918 private range
    Private,
    /// Loopback, multicast, link-local, reserved, or otherwise not routable
    NotGlobalUnicast,
}

impl Rejection {
    /// Message returned to the client.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::Empty => "no address found",
            Rejection::NotIpv4 => "only ipv4 address is supported",
            Rejection::Private => "you asked a private address",
            Rejection::NotGlobalUnicast => "non-public address is not allowed",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Special-purpose IPv4 ranges that are not globally routable.
///
/// Addresses in [`GLOBAL_EXCEPTIONS`] are carved back out.
static NON_GLOBAL_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "0.0.0.0/8",       // "This" network
        "100.64.0.0/10",   // Shared address space
        "127.0.0.0/8",     // Loopback
        "169.254.0.0/16",  // Link-local
        "192.0.0.0/24",    // IETF protocol assignments
        "192.0.2.0/24",    // TEST-NET-1
        "198.18.0.0/15",   // Benchmarking
        "198.51.100.0/24", // TEST-NET-2
        "203.0.113.0/24",  // TEST-NET-3
        "224.0.0.0/4",     // Multicast
        "240.0.0.0/4",     // Reserved, includes broadcast
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
});

/// Globally reachable assignments inside 192.0.0.0/24 (PCP and TURN anycast).
const GLOBAL_EXCEPTIONS: [Ipv4Addr; 2] = [Ipv4Addr::new(192, 0, 0, 9), Ipv4Addr::new(192, 0, 0, 10)];

/// Parse and check a raw client address.
///
/// Returns the IPv4 address when it is public and globally routable.
pub fn classify(raw: &str) -> Result<Ipv4Addr, Rejection> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Rejection::Empty);
    }

    let ip = match raw.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4,
        Ok(IpAddr::V6(v6)) => v6.to_ipv4_mapped().ok_or(Rejection::NotIpv4)?,
        Err(_) => return Err(Rejection::NotIpv4),
    };

    if ip.is_private() {
        return Err(Rejection::Private);
    }
    if !GLOBAL_EXCEPTIONS.contains(&ip) && NON_GLOBAL_V4.iter().any(|net| net.contains(&ip)) {
        return Err(Rejection::NotGlobalUnicast);
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_addresses() {
        assert_eq!(classify("8.8.8.8"), Ok(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(classify(" 1.1.1.1 "), Ok(Ipv4Addr::new(1, 1, 1, 1)));
        assert_eq!(classify("::ffff:8.8.4.4"), Ok(Ipv4Addr::new(8, 8, 4, 4)));
    }

    #[test]
    fn test_empty() {
        assert_eq!(classify(""), Err(Rejection::Empty));
        assert_eq!(classify("   "), Err(Rejection::Empty));
    }

    #[test]
    fn test_not_ipv4() {
        assert_eq!(classify("2001:4860:4860::8888"), Err(Rejection::NotIpv4));
        assert_eq!(classify("example.com"), Err(Rejection::NotIpv4));
        assert_eq!(classify("256.1.1.1"), Err(Rejection::NotIpv4));
        assert_eq!(classify("favicon.ico"), Err(Rejection::NotIpv4));
    }

    #[test]
    fn test_private() {
        for ip in ["10.1.2.3", "172.16.0.1", "172.31.255.255", "192.168.1.1", "::ffff:10.0.0.1"] {
            assert_eq!(classify(ip), Err(Rejection::Private), "{ip}");
        }
        assert!(classify("172.32.0.1").is_ok());
    }

    #[test]
    fn test_not_global_unicast() {
        for ip in [
            "0.0.0.0",
            "127.0.0.1",
            "169.254.10.10",
            "224.0.0.1",
            "239.255.255.250",
            "255.255.255.255",
            "100.64.0.1",
            "192.0.2.55",
            "198.18.0.1",
            "203.0.113.9",
        ] {
            assert_eq!(classify(ip), Err(Rejection::NotGlobalUnicast), "{ip}");
        }
    }

    #[test]
    fn test_global_anycast_in_protocol_block() {
        assert_eq!(classify("192.0.0.9"), Ok(Ipv4Addr::new(192, 0, 0, 9)));
        assert_eq!(classify("192.0.0.10"), Ok(Ipv4Addr::new(192, 0, 0, 10)));
        assert_eq!(classify("192.0.0.8"), Err(Rejection::NotGlobalUnicast));
        assert_eq!(classify("192.0.0.170"), Err(Rejection::NotGlobalUnicast));
    }

    #[test]
    fn test_messages() {
        assert_eq!(Rejection::Empty.to_string(), "no address found");
        assert_eq!(Rejection::Private.message(), "you asked a private address");
    }
}
