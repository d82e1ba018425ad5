#![no_main]

use csrcheck_lib::{classify_san, display_csr, parse_csr, to_json, DigestAlgorithm};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The parser must never panic, regardless of input.
    if let Ok(csr) = parse_csr(data) {
        let _ = csr.subject.to_oneline();
        let _ = csr.fingerprint(DigestAlgorithm::Sha256);
        if let Some(modulus) = csr.key.as_ref().and_then(|k| k.modulus.as_deref()) {
            let _ = csrcheck_lib::modulus_fingerprint(modulus);
        }
        if let Ok(san) = classify_san(&csr.san) {
            let _ = san.duplicate_entries();
            let _ = san.reserved_ipv4();
            let _ = san.reserved_ipv6();
        }

        let _ = display_csr(&csr, true);
        let _ = to_json(&csr);
    }
});
