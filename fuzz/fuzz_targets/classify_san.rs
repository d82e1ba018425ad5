#![no_main]

use csrcheck_lib::san::{classify_san, looks_like_dns, registrable_domain};
use csrcheck_lib::SanEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary names, one per line; lines starting with '@' are IP entries.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let entries: Vec<SanEntry> = text
        .lines()
        .map(|line| match line.strip_prefix('@') {
            Some(ip) => SanEntry::Ip(ip.to_string()),
            None => SanEntry::Dns(line.to_string()),
        })
        .collect();

    for entry in &entries {
        let _ = looks_like_dns(entry.raw());
        let _ = registrable_domain(entry.raw());
    }

    if let Ok(san) = classify_san(&entries) {
        assert_eq!(san.len(), entries.len());
        assert!(san.distinct_domain_count() <= san.domains.len());
        let _ = san.duplicate_entries();
        let _ = san.reserved_ipv4();
        let _ = san.reserved_ipv6();
        if let Some(first) = entries.first() {
            let _ = san.matches_common_name(first.raw());
        }
    } else {
        assert!(entries.is_empty());
    }
});
