#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Parser, key inspector and SAN classifier over the fixture requests.
//!
//! The fixtures were generated with `openssl req`; the `.sha1` files hold the
//! weak-key digest of the matching request's modulus.

use csrcheck_lib::*;
use std::path::{Path, PathBuf};

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn parse(name: &str) -> ParsedCsr {
    let input = std::fs::read(data_dir().join(name)).unwrap();
    parse_csr(&input).unwrap_or_else(|e| panic!("{name}: {e}"))
}

fn dns(names: &[&str]) -> Vec<SanEntry> {
    names.iter().map(|n| SanEntry::Dns(n.to_string())).collect()
}

#[test]
fn every_fixture_parses_or_errors_without_panic() {
    let mut parsed = 0;
    for entry in std::fs::read_dir(data_dir()).unwrap() {
        let path = entry.unwrap().path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if ext != "csr" && ext != "der" {
            continue;
        }
        let input = std::fs::read(&path).unwrap();
        if let Ok(csr) = parse_csr(&input) {
            let _ = display_csr(&csr, true);
            let _ = to_json(&csr).unwrap();
            let _ = classify_san(&csr.san);
            parsed += 1;
        }
    }
    assert!(parsed >= 14, "only {parsed} fixtures parsed");
}

#[test]
fn good_request_subject_key_and_san() {
    let csr = parse("good.csr");
    assert_eq!(
        csr.subject.to_oneline(),
        "C = CH, ST = Zurich, L = Zurich, O = ACME, CN = a.example.com"
    );
    let key = csr.key.as_ref().unwrap();
    assert_eq!(key.algorithm, KeyAlgorithm::Rsa);
    assert_eq!(key.bit_length, 2048);
    assert_eq!(key.exponent, Some(65537));
    assert_eq!(csr.san, dns(&["a.example.com", "www.example.com"]));
    assert!(csr.key_error.is_none());
    assert!(csr.san_error.is_none());
}

#[test]
fn pem_and_der_fixtures_agree() {
    let pem = parse("good.csr");
    let der = parse("good.der");
    assert_eq!(pem.subject, der.subject);
    assert_eq!(pem.key, der.key);
    assert_eq!(pem.san, der.san);
    assert_eq!(pem.raw_der, der.raw_der);
    assert_eq!(
        pem.fingerprint(DigestAlgorithm::Sha256),
        csr_fingerprint(&der.raw_der, DigestAlgorithm::Sha256)
    );
}

#[test]
fn modulus_digests_match_reference_files() {
    for (csr, digest) in [("good.csr", "good.sha1"), ("weak.csr", "weak.sha1")] {
        let key = parse(csr).key.unwrap();
        let expected = std::fs::read_to_string(data_dir().join(digest)).unwrap();
        assert_eq!(
            modulus_fingerprint(key.modulus.as_deref().unwrap()),
            expected.trim(),
            "{csr}"
        );
    }
}

#[test]
fn weak_key_blacklist_file_matches_weak_request_only() {
    let blacklist = WeakKeyBlacklist::load(&data_dir().join("weak-keys.txt")).unwrap();
    assert_eq!(blacklist.len(), 1);
    let weak = parse("weak.csr").key.unwrap();
    let good = parse("good.csr").key.unwrap();
    assert_eq!(check_weak_key(&weak, Some(&blacklist)), WeakKeyVerdict::Listed);
    assert_eq!(check_weak_key(&good, Some(&blacklist)), WeakKeyVerdict::NotListed);
    assert_eq!(check_weak_key(&good, None), WeakKeyVerdict::BlacklistUnavailable);
}

#[test]
fn key_sizes_of_other_algorithms() {
    let rsa = parse("rsa4096.csr").key.unwrap();
    assert_eq!(rsa.bit_length, 4096);

    let ec = parse("ec_p256.csr").key.unwrap();
    assert_eq!(ec.algorithm, KeyAlgorithm::Ec);
    assert_eq!(ec.bit_length, 256);
    assert_eq!(ec.curve.as_deref(), Some("P-256"));
    assert!(ec.modulus.is_none());
    assert_eq!(
        check_weak_key(&ec, None),
        WeakKeyVerdict::NotApplicable
    );
}

#[test]
fn ip_entries_are_rendered_canonically() {
    let csr = parse("ipv6.csr");
    assert_eq!(
        csr.san,
        vec![
            SanEntry::Dns("a.example.com".into()),
            SanEntry::Ip("fd00::1".into()),
            SanEntry::Ip("2a00:1450:4001::1".into()),
        ]
    );
    let san = classify_san(&csr.san).unwrap();
    assert_eq!(san.reserved_ipv6(), vec!["fd00::1".to_string()]);
    assert!(san.reserved_ipv4().is_empty());

    let csr = parse("private_ip.csr");
    let san = classify_san(&csr.san).unwrap();
    assert_eq!(san.ip_literals, vec!["10.0.0.5".to_string()]);
    assert_eq!(san.reserved_ipv4(), vec!["10.0.0.5".to_string()]);
}

#[test]
fn request_without_san_has_no_classification() {
    let csr = parse("no_san.csr");
    assert!(csr.san.is_empty());
    assert!(csr.san_error.is_none());
    assert!(matches!(classify_san(&csr.san), Err(CsrCheckError::NoSan(_))));
}

#[test]
fn wildcard_and_multi_domain_classification() {
    let san = classify_san(&parse("wildcard.csr").san).unwrap();
    assert!(san.wildcard_present);
    assert_eq!(san.domains, vec!["example.com".to_string()]);

    let san = classify_san(&parse("multi_domain.csr").san).unwrap();
    assert!(!san.wildcard_present);
    assert_eq!(san.domains, vec!["example.com", "other.com", "example.com"]);
    assert_eq!(san.distinct_domain_count(), 2);
}

#[test]
fn email_subject_attribute_is_extracted() {
    let csr = parse("email.csr");
    assert_eq!(csr.subject.email_address.as_deref(), Some("admin@example.com"));
    let csr = parse("bare_subject.csr");
    assert!(csr.subject.organization.is_none());
    assert!(csr.subject.locality.is_none());
    assert!(csr.subject.state.is_empty());
    assert!(csr.subject.country.is_none());
}

#[test]
fn unreadable_inputs_are_malformed() {
    let truncated = std::fs::read(data_dir().join("truncated.csr")).unwrap();
    for input in [
        &b""[..],
        &b"   \n"[..],
        &b"-----BEGIN CERTIFICATE REQUEST-----\n"[..],
        truncated.as_slice(),
    ] {
        assert!(matches!(parse_csr(input), Err(CsrCheckError::MalformedCsr(_))));
    }
}
