//! Request hash (digest) computation.

use crate::fields::DigestAlgorithm;
use crate::util;
use digest::Digest;

/// Compute the hash of DER-encoded request bytes.
///
/// Returns a colon-separated uppercase hex string (e.g., "AB:CD:EF:...").
pub fn csr_fingerprint(der_bytes: &[u8], algorithm: DigestAlgorithm) -> String {
    let hash_bytes: Vec<u8> = match algorithm {
        DigestAlgorithm::Sha256 => sha2::Sha256::digest(der_bytes).to_vec(),
        DigestAlgorithm::Sha1 => sha1::Sha1::digest(der_bytes).to_vec(),
    };
    util::hex_colon_upper(&hash_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_digests() {
        assert_eq!(
            csr_fingerprint(b"", DigestAlgorithm::Sha1),
            "DA:39:A3:EE:5E:6B:4B:0D:32:55:BF:EF:95:60:18:90:AF:D8:07:09"
        );
        assert!(csr_fingerprint(b"", DigestAlgorithm::Sha256)
            .starts_with("E3:B0:C4:42:98:FC:1C:14"));
    }
}
