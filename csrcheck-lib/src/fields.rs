//! CSR data types and validation report structures.

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Digest algorithm for request hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha1,
}

/// Subject attributes extracted from a certificate signing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsrSubject {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organizational_units: Vec<String>,
    /// All stateOrProvinceName values, in order.
    pub state: Vec<String>,
    pub locality: Option<String>,
    pub country: Option<String>,
    /// PKCS#9 emailAddress. Its presence is a policy violation.
    pub email_address: Option<String>,
}

impl CsrSubject {
    /// Format as a comma-separated one-line string, e.g. "C = CH, O = ACME, CN = a.example.com".
    pub fn to_oneline(&self) -> String {
        let mut parts = Vec::new();
        if let Some(c) = &self.country {
            parts.push(format!("C = {}", c));
        }
        for st in &self.state {
            parts.push(format!("ST = {}", st));
        }
        if let Some(l) = &self.locality {
            parts.push(format!("L = {}", l));
        }
        if let Some(o) = &self.organization {
            parts.push(format!("O = {}", o));
        }
        for ou in &self.organizational_units {
            parts.push(format!("OU = {}", ou));
        }
        if let Some(cn) = &self.common_name {
            parts.push(format!("CN = {}", cn));
        }
        if let Some(email) = &self.email_address {
            parts.push(format!("emailAddress = {}", email));
        }
        parts.join(", ")
    }
}

impl std::fmt::Display for CsrSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_oneline())
    }
}

/// Public key algorithm of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
    Ed25519,
    Ed448,
    Dsa,
    /// Unrecognized algorithm, carrying its dotted OID.
    Other(String),
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAlgorithm::Rsa => write!(f, "RSA"),
            KeyAlgorithm::Ec => write!(f, "EC"),
            KeyAlgorithm::Ed25519 => write!(f, "Ed25519"),
            KeyAlgorithm::Ed448 => write!(f, "Ed448"),
            KeyAlgorithm::Dsa => write!(f, "DSA"),
            KeyAlgorithm::Other(oid) => write!(f, "{}", oid),
        }
    }
}

/// Public key summary produced by the key inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    pub algorithm: KeyAlgorithm,
    /// Key size in bits (exact modulus length for RSA).
    pub bit_length: u32,
    /// Named curve for EC keys (e.g., "P-256").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
    /// RSA modulus, big-endian with leading zero bytes stripped.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_hex_opt")]
    pub modulus: Option<Vec<u8>>,
    /// RSA public exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exponent: Option<u64>,
}

/// Subject Alternative Name entry as tagged by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "raw")]
pub enum SanEntry {
    Dns(String),
    Ip(String),
}

impl SanEntry {
    /// The textual value of the entry, regardless of kind.
    pub fn raw(&self) -> &str {
        match self {
            SanEntry::Dns(v) | SanEntry::Ip(v) => v,
        }
    }
}

/// A parsed certificate signing request.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedCsr {
    pub subject: CsrSubject,
    /// The inspected public key, or `None` when the key material is malformed.
    pub key: Option<KeyInfo>,
    /// Why the key could not be inspected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_error: Option<String>,
    /// Requested SAN entries in extension order, lowercased.
    pub san: Vec<SanEntry>,
    /// Why the SAN extension could not be extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub san_error: Option<String>,

    /// Raw DER bytes of the request (for hash computation).
    #[serde(skip)]
    pub raw_der: Vec<u8>,
}

impl ParsedCsr {
    /// Compute a hash of the DER request using the given digest algorithm.
    pub fn fingerprint(&self, algorithm: DigestAlgorithm) -> String {
        crate::fingerprint::csr_fingerprint(&self.raw_der, algorithm)
    }
}

/// Reputation record for one registrable domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainRecord {
    pub domain: String,
    /// A WHOIS answer was obtained (no timeout, no lookup failure).
    pub whois_checked: bool,
    pub registered: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub whois_raw_text: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois_server: Option<String>,
}

/// Lifecycle state of a recorded check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckState {
    Passed,
    Failed,
    /// Not evaluated because a prerequisite (SAN extraction) failed.
    ForcedFail,
}

/// One entry of the ordered check log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub state: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_on_failure: Option<String>,
    pub status_message: String,
}

/// An aggregate verdict (baseline compliance or a product profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_on_failure: Option<String>,
}

/// Complete outcome of validating one request.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
    pub aggregates: Vec<AggregateResult>,
    /// Wall-clock time from the first check to the last.
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// The request could not be read at all; only the terminal checks ran.
    pub terminal_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<CsrSubject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyInfo>,
    pub sans: Vec<SanEntry>,
    pub domains: Vec<DomainRecord>,
    pub wildcard_present: bool,
}

impl ValidationReport {
    /// Look up a check by its display name.
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Look up an aggregate verdict by its display name.
    pub fn aggregate(&self, name: &str) -> Option<&AggregateResult> {
        self.aggregates.iter().find(|a| a.name == name)
    }

    /// Whether every recorded check passed and the request was readable.
    pub fn is_baseline_compliant(&self) -> bool {
        !self.terminal_failure && self.checks.iter().all(|c| c.passed)
    }

    /// Names of the checks that did not pass, in policy order.
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn serialize_hex_opt<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => serializer.serialize_str(&hex::encode_upper(b)),
        None => serializer.serialize_none(),
    }
}
