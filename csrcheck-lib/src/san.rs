//! Subject Alternative Name classification.
//!
//! Splits the requested SAN entries into DNS names and IP literals, reduces
//! DNS names to their registrable domain (the last two labels) and provides
//! the predicates the SAN checks are built on: duplicate detection, reserved
//! address ranges, CN correspondence and wildcard detection.

use crate::fields::SanEntry;
use crate::CsrCheckError;
use serde::Serialize;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Reserved and special-purpose IPv4 networks (RFC 6890 and friends).
const RESERVED_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// Reserved and special-purpose IPv6 networks. IPv4-mapped addresses
/// (`::ffff:0:0/96`) are checked against [`RESERVED_V4`] instead.
const RESERVED_V6: &[(Ipv6Addr, u8)] = &[
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 128),
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 128),
    (Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0), 96),
    (Ipv6Addr::new(0x100, 0, 0, 0, 0, 0, 0, 0), 64),
    (Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0), 32),
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    (Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8),
];

/// The classified SAN set of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanClassification {
    /// All entries in request order, tagged after classification.
    pub entries: Vec<SanEntry>,
    pub dns_names: Vec<String>,
    pub ip_literals: Vec<String>,
    /// Registrable domains in first-seen order, adjacent duplicates collapsed.
    pub domains: Vec<String>,
    pub wildcard_present: bool,
}

/// Classify the SAN entries of a request.
///
/// Returns `NoSan` when there are no entries at all.
pub fn classify_san(entries: &[SanEntry]) -> Result<SanClassification, CsrCheckError> {
    if entries.is_empty() {
        return Err(CsrCheckError::NoSan("request carries no DNS or IP entries".into()));
    }

    let mut classified = Vec::with_capacity(entries.len());
    let mut dns_names = Vec::new();
    let mut ip_literals = Vec::new();

    for entry in entries {
        let raw = entry.raw().trim().to_ascii_lowercase();
        let is_dns = matches!(entry, SanEntry::Dns(_)) && looks_like_dns(&raw);
        if is_dns {
            dns_names.push(raw.clone());
            classified.push(SanEntry::Dns(raw));
        } else {
            ip_literals.push(raw.clone());
            classified.push(SanEntry::Ip(raw));
        }
    }

    let domains = canonical_domains(dns_names.iter().map(String::as_str));
    let wildcard_present = dns_names.iter().any(|n| is_wildcard(n));

    Ok(SanClassification {
        entries: classified,
        dns_names,
        ip_literals,
        domains,
        wildcard_present,
    })
}

impl SanClassification {
    /// Total number of SAN entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose raw value occurs more than once, each reported once.
    pub fn duplicate_entries(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();
        for entry in &self.entries {
            let raw = entry.raw();
            if !seen.insert(raw) && reported.insert(raw) {
                duplicates.push(raw.to_string());
            }
        }
        duplicates
    }

    /// Whether some entry equals the common name exactly. Entries are
    /// lowercased, so a mixed-case CN never matches.
    pub fn matches_common_name(&self, common_name: &str) -> bool {
        self.entries.iter().any(|e| e.raw() == common_name)
    }

    /// IP literals that parse as IPv4 and lie in a reserved range.
    pub fn reserved_ipv4(&self) -> Vec<String> {
        self.ip_literals
            .iter()
            .filter(|raw| raw.parse::<Ipv4Addr>().is_ok_and(is_reserved_ipv4))
            .cloned()
            .collect()
    }

    /// IP literals that parse as IPv6 and lie in a reserved range.
    pub fn reserved_ipv6(&self) -> Vec<String> {
        self.ip_literals
            .iter()
            .filter(|raw| raw.parse::<Ipv6Addr>().is_ok_and(is_reserved_ipv6))
            .cloned()
            .collect()
    }

    /// Number of distinct registrable domains.
    pub fn distinct_domain_count(&self) -> usize {
        self.domains.iter().collect::<HashSet<_>>().len()
    }
}

/// Whether a name is a DNS name: its last two labels are both non-numeric.
///
/// A name that parses as an IP address is never a DNS name.
pub fn looks_like_dns(name: &str) -> bool {
    if name.parse::<IpAddr>().is_ok() {
        return false;
    }
    name.trim_end_matches('.')
        .rsplit('.')
        .take(2)
        .all(|label| !is_numeric_label(label))
}

fn is_numeric_label(label: &str) -> bool {
    !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit())
}

fn is_wildcard(name: &str) -> bool {
    name.split('.').any(|label| label.contains('*'))
}

/// Reduce a DNS name to its registrable domain: the last two labels.
///
/// A single-label name is its own registrable domain.
pub fn registrable_domain(name: &str) -> String {
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    let mut labels = name.rsplit('.');
    match (labels.next(), labels.next()) {
        (Some(tld), Some(label)) => format!("{}.{}", label, tld),
        _ => name,
    }
}

/// Registrable domains of `names` in order, with consecutive duplicates
/// collapsed. Non-adjacent repeats are kept.
pub fn canonical_domains<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut domains: Vec<String> = names.into_iter().map(registrable_domain).collect();
    domains.dedup();
    domains
}

/// Whether an IPv4 address lies in a reserved or special-purpose range.
pub fn is_reserved_ipv4(ip: Ipv4Addr) -> bool {
    RESERVED_V4
        .iter()
        .any(|&(network, prefix)| ip4_in_network(ip, network, prefix))
}

/// Whether an IPv6 address lies in a reserved or special-purpose range.
pub fn is_reserved_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_reserved_ipv4(v4);
    }
    RESERVED_V6
        .iter()
        .any(|&(network, prefix)| ip6_in_network(ip, network, prefix))
}

/// Whether an address of either family is reserved.
pub fn is_reserved_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_ipv4(v4),
        IpAddr::V6(v6) => is_reserved_ipv6(v6),
    }
}

fn ip4_in_network(ip: Ipv4Addr, network: Ipv4Addr, prefix: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    if prefix > 32 {
        return false;
    }
    let mask = !0u32 << (32 - prefix);
    (u32::from(ip) & mask) == (u32::from(network) & mask)
}

fn ip6_in_network(ip: Ipv6Addr, network: Ipv6Addr, prefix: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    if prefix > 128 {
        return false;
    }
    let mask = !0u128 << (128 - prefix);
    (u128::from(ip) & mask) == (u128::from(network) & mask)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dns(s: &str) -> SanEntry {
        SanEntry::Dns(s.into())
    }

    fn ip(s: &str) -> SanEntry {
        SanEntry::Ip(s.into())
    }

    #[test]
    fn empty_san_is_no_san() {
        assert!(matches!(classify_san(&[]), Err(CsrCheckError::NoSan(_))));
    }

    #[test]
    fn partition_by_trailing_labels() {
        let c = classify_san(&[
            dns("a.example.com"),
            dns("192.168.1.1"),
            dns("host.10.20"),
            dns("localhost"),
            ip("2001:db8::1"),
            dns("fd00::1"),
        ])
        .unwrap();
        assert_eq!(c.dns_names, vec!["a.example.com", "localhost"]);
        assert_eq!(
            c.ip_literals,
            vec!["192.168.1.1", "host.10.20", "2001:db8::1", "fd00::1"]
        );
        for entry in &c.entries {
            let in_dns = c.dns_names.iter().any(|n| n == entry.raw());
            let in_ip = c.ip_literals.iter().any(|n| n == entry.raw());
            assert!(in_dns != in_ip);
        }
    }

    #[test]
    fn registrable_domain_takes_last_two_labels() {
        assert_eq!(registrable_domain("www.shop.example.com"), "example.com");
        assert_eq!(registrable_domain("Example.COM."), "example.com");
        assert_eq!(registrable_domain("*.example.com"), "example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }

    #[test]
    fn only_adjacent_duplicates_collapse() {
        let domains =
            canonical_domains(["a.example.com", "b.example.com", "x.other.com", "c.example.com"]);
        assert_eq!(domains, vec!["example.com", "other.com", "example.com"]);
    }

    #[test]
    fn canonical_domains_is_idempotent() {
        let once = canonical_domains(["a.b.example.com", "example.com", "w.other.org"]);
        let twice = canonical_domains(once.iter().map(String::as_str));
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicates_reported_once() {
        let c = classify_san(&[
            dns("a.example.com"),
            dns("b.example.com"),
            dns("a.example.com"),
            dns("a.example.com"),
        ])
        .unwrap();
        assert_eq!(c.duplicate_entries(), vec!["a.example.com"]);
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn common_name_correspondence_is_verbatim() {
        let c = classify_san(&[dns("*.example.com"), dns("www.example.com")]).unwrap();
        assert!(c.matches_common_name("www.example.com"));
        assert!(!c.matches_common_name("WWW.example.com"));
        assert!(!c.matches_common_name(" www.example.com"));
        assert!(!c.matches_common_name("shop.example.com"));
        assert!(c.wildcard_present);
    }

    #[test]
    fn reserved_ipv4_ranges() {
        for addr in [
            "0.1.2.3",
            "10.0.0.5",
            "100.64.0.1",
            "127.0.0.1",
            "169.254.1.1",
            "172.31.255.255",
            "192.0.0.8",
            "192.0.2.1",
            "192.168.0.1",
            "198.19.0.1",
            "198.51.100.7",
            "203.0.113.9",
            "224.0.0.1",
            "255.255.255.255",
        ] {
            assert!(is_reserved_ipv4(addr.parse().unwrap()), "{addr}");
        }
        for addr in ["8.8.8.8", "172.32.0.1", "100.128.0.1", "198.20.0.1"] {
            assert!(!is_reserved_ipv4(addr.parse().unwrap()), "{addr}");
        }
    }

    #[test]
    fn reserved_ipv6_ranges() {
        for addr in [
            "::",
            "::1",
            "::ffff:10.0.0.1",
            "64:ff9b::1",
            "100::1",
            "2001:db8::1",
            "fd00::1",
            "fe80::1",
            "ff02::1",
        ] {
            assert!(is_reserved_ipv6(addr.parse().unwrap()), "{addr}");
        }
        for addr in ["2a00:1450:4001::1", "::ffff:8.8.8.8", "2606:4700::1111"] {
            assert!(!is_reserved_ipv6(addr.parse().unwrap()), "{addr}");
        }
    }

    #[test]
    fn reserved_checks_are_vacuous_without_ips() {
        let c = classify_san(&[dns("a.example.com")]).unwrap();
        assert!(c.reserved_ipv4().is_empty());
        assert!(c.reserved_ipv6().is_empty());
    }

    #[test]
    fn reserved_literals_are_split_by_family() {
        let c = classify_san(&[ip("10.0.0.5"), ip("8.8.8.8"), ip("fd00::1"), dns("host.1.2")])
            .unwrap();
        assert_eq!(c.reserved_ipv4(), vec!["10.0.0.5"]);
        assert_eq!(c.reserved_ipv6(), vec!["fd00::1"]);
    }

    #[test]
    fn unparseable_ip_literals_are_not_reserved() {
        let c = classify_san(&[dns("a.example.com"), dns("host.10.20"), ip("fd00::zz")]).unwrap();
        assert_eq!(c.ip_literals, vec!["host.10.20", "fd00::zz"]);
        assert!(c.reserved_ipv4().is_empty());
        assert!(c.reserved_ipv6().is_empty());
    }

    #[test]
    fn cidr_edges() {
        let net: Ipv4Addr = "172.16.0.0".parse().unwrap();
        assert!(ip4_in_network("172.16.0.0".parse().unwrap(), net, 12));
        assert!(!ip4_in_network("172.32.0.0".parse().unwrap(), net, 12));
        assert!(!ip4_in_network(net, net, 33));
        let v6: Ipv6Addr = "fe80::".parse().unwrap();
        assert!(ip6_in_network("febf::1".parse().unwrap(), v6, 10));
        assert!(!ip6_in_network("fec0::1".parse().unwrap(), v6, 10));
    }
}
