//! Human-readable and JSON formatting of requests and validation reports.

use crate::fields::{CheckState, DigestAlgorithm, ParsedCsr, SanEntry, ValidationReport};
use crate::san::classify_san;
use crate::weak_key::modulus_fingerprint;
use crate::CsrCheckError;
use serde::Serialize;

/// Format a validation report as human-readable text.
pub fn display_text(report: &ValidationReport) -> String {
    let mut out = String::new();

    let verdict = if report.terminal_failure {
        "UNREADABLE"
    } else if report.is_baseline_compliant() {
        "COMPLIANT"
    } else {
        "NOT COMPLIANT"
    };
    out.push_str(&format!("CSR validation: {}\n", verdict));

    if let Some(subject) = &report.subject {
        out.push_str(&format!("  Subject: {}\n", subject));
    }
    if let Some(key) = &report.key {
        out.push_str(&format!("  Key: {} ({} bit)\n", key.algorithm, key.bit_length));
    }
    if !report.domains.is_empty() {
        let names: Vec<&str> = report.domains.iter().map(|d| d.domain.as_str()).collect();
        out.push_str(&format!("  Domains: {}\n", names.join(", ")));
    }

    out.push_str("Checks:\n");
    for check in &report.checks {
        let tag = match check.state {
            CheckState::Passed => "PASS",
            CheckState::Failed => "FAIL",
            CheckState::ForcedFail => "SKIP",
        };
        out.push_str(&format!("  [{}] {}", tag, check.name));
        if let Some(detail) = &check.detail_on_failure {
            out.push_str(&format!(": {}", detail));
        }
        out.push('\n');
    }

    out.push_str("Results:\n");
    for aggregate in &report.aggregates {
        let tag = if aggregate.passed { "PASS" } else { "FAIL" };
        out.push_str(&format!(
            "  [{}] {} ({})",
            tag, aggregate.name, aggregate.message
        ));
        if let Some(detail) = &aggregate.detail_on_failure {
            out.push_str(&format!(": {}", detail));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "Duration: {:.3}s\n",
        report.duration.as_secs_f64()
    ));
    out
}

/// Format a parsed request as human-readable text (offline inspection).
///
/// If `show_all` is true, includes the modulus prefix and its weak-key digest.
pub fn display_csr(csr: &ParsedCsr, show_all: bool) -> String {
    let mut out = String::new();

    out.push_str("Certificate Request:\n");
    out.push_str(&format!("  Subject: {}\n", csr.subject));

    out.push_str("  Public Key:\n");
    match &csr.key {
        Some(key) => {
            out.push_str(&format!("    Algorithm: {} ({} bit)", key.algorithm, key.bit_length));
            if let Some(curve) = &key.curve {
                out.push_str(&format!(" [{}]", curve));
            }
            out.push('\n');
            if let Some(exponent) = key.exponent {
                out.push_str(&format!("    Exponent: {}\n", exponent));
            }
            if show_all {
                if let Some(modulus) = &key.modulus {
                    let modulus_hex = hex::encode_upper(modulus);
                    let prefix = modulus_hex.get(..40).unwrap_or(&modulus_hex);
                    out.push_str(&format!("    Modulus: {}...\n", prefix));
                    out.push_str(&format!(
                        "    Weak-key digest: {}\n",
                        modulus_fingerprint(modulus)
                    ));
                }
            }
        }
        None => {
            let reason = csr.key_error.as_deref().unwrap_or("unreadable");
            out.push_str(&format!("    Malformed: {}\n", reason));
        }
    }

    if let Some(err) = &csr.san_error {
        out.push_str(&format!("  Subject Alternative Name: malformed ({})\n", err));
    } else {
        match classify_san(&csr.san) {
            Ok(san) => {
                out.push_str("  Subject Alternative Name:\n");
                for entry in &san.entries {
                    match entry {
                        SanEntry::Dns(name) => out.push_str(&format!("    DNS: {}\n", name)),
                        SanEntry::Ip(ip) => out.push_str(&format!("    IP: {}\n", ip)),
                    }
                }
                if !san.domains.is_empty() {
                    out.push_str(&format!(
                        "  Registrable Domains: {}\n",
                        san.domains.join(", ")
                    ));
                }
                if san.wildcard_present {
                    out.push_str("  Wildcard: yes\n");
                }
            }
            Err(_) => out.push_str("  Subject Alternative Name: none\n"),
        }
    }

    out.push_str(&format!(
        "  SHA-1: {}\n",
        csr.fingerprint(DigestAlgorithm::Sha1)
    ));
    out.push_str(&format!(
        "  SHA-256: {}\n",
        csr.fingerprint(DigestAlgorithm::Sha256)
    ));
    out
}

/// Serialize a report or parsed request to a pretty-printed JSON string.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, CsrCheckError> {
    serde_json::to_string_pretty(value).map_err(CsrCheckError::Json)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields::{AggregateResult, CheckResult};
    use std::time::Duration;

    fn report() -> ValidationReport {
        ValidationReport {
            checks: vec![
                CheckResult {
                    name: "Valid CSR content".into(),
                    passed: true,
                    state: CheckState::Passed,
                    detail_on_failure: None,
                    status_message: "passed".into(),
                },
                CheckResult {
                    name: "Subject Alternative Name (SAN) mandatory".into(),
                    passed: false,
                    state: CheckState::ForcedFail,
                    detail_on_failure: Some("none".into()),
                    status_message: "not evaluated".into(),
                },
            ],
            aggregates: vec![AggregateResult {
                name: "Baseline compliant".into(),
                passed: false,
                message: "1 of 2 checks passed".into(),
                detail_on_failure: None,
            }],
            duration: Duration::from_millis(1500),
            terminal_failure: false,
            subject: None,
            key: None,
            sans: Vec::new(),
            domains: Vec::new(),
            wildcard_present: false,
        }
    }

    #[test]
    fn text_lists_checks_and_results() {
        let text = display_text(&report());
        assert!(text.starts_with("CSR validation: NOT COMPLIANT\n"));
        assert!(text.contains("  [PASS] Valid CSR content\n"));
        assert!(text.contains("  [SKIP] Subject Alternative Name (SAN) mandatory: none\n"));
        assert!(text.contains("  [FAIL] Baseline compliant (1 of 2 checks passed)\n"));
        assert!(text.contains("Duration: 1.500s"));
    }

    #[test]
    fn json_has_fractional_duration() {
        let json = to_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["duration"], 1.5);
        assert_eq!(value["checks"][1]["state"], "ForcedFail");
    }
}
