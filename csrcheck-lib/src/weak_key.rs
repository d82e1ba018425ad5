//! Debian weak-key blacklist matching (CVE-2008-0166).
//!
//! Blacklist files hold one SHA-1 digest per line, computed over the text
//! `Modulus=<UPPERCASE-HEX>\n` as printed by `openssl req -noout -modulus`.
//! The Debian `openssl-blacklist` package stores only the last 20 hex
//! characters of each digest; full 40-character digests are accepted too.

use crate::fields::KeyInfo;
use crate::CsrCheckError;
use digest::Digest;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Length of the digest suffix stored by the Debian blacklist package.
const SUFFIX_LEN: usize = 20;

/// A loaded set of weak-key modulus digests.
#[derive(Debug, Clone, Default)]
pub struct WeakKeyBlacklist {
    full: HashSet<String>,
    suffixes: HashSet<String>,
}

/// Outcome of checking one key against the blacklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeakKeyVerdict {
    /// The key has no RSA modulus.
    NotApplicable,
    NotListed,
    Listed,
    /// No blacklist was available; the key is let through.
    BlacklistUnavailable,
}

impl WeakKeyVerdict {
    /// Whether the "Weak Debian key" check passes for this verdict.
    pub fn passes(self) -> bool {
        !matches!(self, WeakKeyVerdict::Listed)
    }
}

impl WeakKeyBlacklist {
    /// Read a digest file. Blank lines and `#` comments are skipped.
    pub fn load(path: &Path) -> Result<Self, CsrCheckError> {
        let text = std::fs::read_to_string(path)?;
        let blacklist = Self::from_lines(&text);
        debug!(path = %path.display(), entries = blacklist.len(), "loaded weak-key blacklist");
        Ok(blacklist)
    }

    /// Build a blacklist from digest-file text.
    pub fn from_lines(text: &str) -> Self {
        let mut blacklist = Self::default();
        for line in text.lines() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            if !entry.chars().all(|c| c.is_ascii_hexdigit()) {
                debug!(line = entry, "skipping non-hex weak-key entry");
                continue;
            }
            let entry = entry.to_ascii_lowercase();
            if entry.len() == SUFFIX_LEN {
                blacklist.suffixes.insert(entry);
            } else {
                blacklist.full.insert(entry);
            }
        }
        blacklist
    }

    pub fn len(&self) -> usize {
        self.full.len() + self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the digest of `modulus` is listed, in full or by its suffix.
    pub fn contains(&self, modulus: &[u8]) -> bool {
        self.contains_digest(&modulus_fingerprint(modulus))
    }

    fn contains_digest(&self, digest: &str) -> bool {
        if self.full.contains(digest) {
            return true;
        }
        let suffix = digest.get(digest.len().saturating_sub(SUFFIX_LEN)..);
        suffix.is_some_and(|s| self.suffixes.contains(s))
    }
}

/// SHA-1 over `Modulus=<UPPERCASE-HEX>\n`, as lowercase hex.
///
/// The hex rendering matches OpenSSL's: no leading zero digits.
pub fn modulus_fingerprint(modulus: &[u8]) -> String {
    let hex = hex::encode_upper(modulus);
    let trimmed = hex.trim_start_matches('0');
    let rendered = if trimmed.is_empty() { "0" } else { trimmed };
    let line = format!("Modulus={}\n", rendered);
    hex::encode(sha1::Sha1::digest(line.as_bytes()))
}

/// Check a key against an optional blacklist.
///
/// A missing blacklist lets the key through (logged at `warn`).
pub fn check_weak_key(key: &KeyInfo, blacklist: Option<&WeakKeyBlacklist>) -> WeakKeyVerdict {
    let Some(modulus) = key.modulus.as_deref() else {
        return WeakKeyVerdict::NotApplicable;
    };
    let Some(blacklist) = blacklist else {
        warn!("weak-key blacklist unavailable, skipping weak-key check");
        return WeakKeyVerdict::BlacklistUnavailable;
    };
    if blacklist.contains(modulus) {
        WeakKeyVerdict::Listed
    } else {
        WeakKeyVerdict::NotListed
    }
}
