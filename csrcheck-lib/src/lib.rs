//! csrcheck-lib: policy validation of PKCS#10 certificate signing requests.
//!
//! Parses a CSR in PEM or DER format, inspects its public key and subject,
//! classifies the Subject Alternative Names, checks domain reputation (WHOIS
//! registration and remote blacklist feeds) and runs the whole set through a
//! fixed, ordered list of CA/Browser-Forum style checks.
//!
//! ```no_run
//! # async fn run() -> Result<(), csrcheck_lib::CsrCheckError> {
//! use csrcheck_lib::{HttpFeedSource, PolicyConfig, TcpWhoisClient, Validator};
//!
//! let config = PolicyConfig::from_file(std::path::Path::new("policy.toml"))?;
//! let whois = TcpWhoisClient::new(config.whois_timeout());
//! let feeds = HttpFeedSource::new(config.feed_timeout())?;
//! let validator = Validator::new(config, whois, feeds);
//!
//! let report = validator.validate(&std::fs::read("request.csr")?).await;
//! println!("{}", csrcheck_lib::display_text(&report));
//! # Ok(())
//! # }
//! ```

mod config;
mod display;
mod fields;
mod fingerprint;
mod key;
mod oid;
mod parser;
pub mod policy;
pub mod reputation;
pub mod san;
mod util;
pub mod weak_key;

pub use config::{PolicyConfig, ProfileConfig};
pub use display::{display_csr, display_text, to_json};
pub use fields::{
    AggregateResult, CheckResult, CheckState, CsrSubject, DigestAlgorithm, DomainRecord,
    KeyAlgorithm, KeyInfo, ParsedCsr, SanEntry, ValidationReport,
};
pub use fingerprint::csr_fingerprint;
pub use key::inspect_key;
pub use parser::{extract_san, parse_csr, parse_der, parse_pem};
pub use policy::{CheckId, Validator};
pub use reputation::{
    FeedSnapshot, FeedSource, HttpFeedSource, MockFeedSource, MockWhois, ReputationError,
    TcpWhoisClient, WhoisLookup, WhoisRecord,
};
pub use san::{classify_san, SanClassification};
pub use weak_key::{check_weak_key, modulus_fingerprint, WeakKeyBlacklist, WeakKeyVerdict};

/// Errors returned by csrcheck-lib.
#[derive(Debug, thiserror::Error)]
pub enum CsrCheckError {
    #[error("Malformed certificate signing request: {0}")]
    MalformedCsr(String),

    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    #[error("No Subject Alternative Name entries: {0}")]
    NoSan(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation cancelled")]
    Cancelled,
}
