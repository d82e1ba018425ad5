//! The fixed, ordered check table and the per-request check log.

use crate::config::PolicyConfig;
use crate::fields::{CheckResult, CheckState};
use std::collections::HashMap;
use tracing::debug;

/// Every check of the policy, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckId {
    CsrContent,
    Pkcs10Block,
    KeySize,
    WeakKey,
    CommonNamePresent,
    CommonNameFqdn,
    Organization,
    LocalityOrState,
    Country,
    NoEmail,
    SanPresent,
    SanUnique,
    SanCount,
    SanMatchesCn,
    ReservedIpv4,
    ReservedIpv6,
    SanFqdn,
    BlacklistConfiguration,
    CommonNameBlacklisted,
    SanBlacklisted,
}

/// What a check waits on before it can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Failure aborts the pipeline.
    Terminal,
    Independent,
    /// Forced to fail when SAN extraction produced nothing.
    San,
}

pub const CHECK_ORDER: [CheckId; 20] = [
    CheckId::CsrContent,
    CheckId::Pkcs10Block,
    CheckId::KeySize,
    CheckId::WeakKey,
    CheckId::CommonNamePresent,
    CheckId::CommonNameFqdn,
    CheckId::Organization,
    CheckId::LocalityOrState,
    CheckId::Country,
    CheckId::NoEmail,
    CheckId::SanPresent,
    CheckId::SanUnique,
    CheckId::SanCount,
    CheckId::SanMatchesCn,
    CheckId::ReservedIpv4,
    CheckId::ReservedIpv6,
    CheckId::SanFqdn,
    CheckId::BlacklistConfiguration,
    CheckId::CommonNameBlacklisted,
    CheckId::SanBlacklisted,
];

impl CheckId {
    pub fn name(self) -> &'static str {
        match self {
            CheckId::CsrContent => "Valid CSR content",
            CheckId::Pkcs10Block => "Valid PKCS#10 block",
            CheckId::KeySize => "Key size",
            CheckId::WeakKey => "Weak Debian key",
            CheckId::CommonNamePresent => "Common Name (CN) available",
            CheckId::CommonNameFqdn => "Common Name (CN) valid FQDN",
            CheckId::Organization => "Organisation (O) mandatory",
            CheckId::LocalityOrState => "Locality (L) or State (S) mandatory",
            CheckId::Country => "Country (C) mandatory",
            CheckId::NoEmail => "E-mail not present",
            CheckId::SanPresent => "Subject Alternative Name (SAN) mandatory",
            CheckId::SanUnique => "Subject Alternative Name (SAN) entries unique",
            CheckId::SanCount => "Subject Alternative Name (SAN) entries",
            CheckId::SanMatchesCn => "Subject Alternative Name (SAN) entry must correspond to CN",
            CheckId::ReservedIpv4 => "Reserved IPv4 addresses not present",
            CheckId::ReservedIpv6 => "Reserved IPv6 addresses not present",
            CheckId::SanFqdn => "Subject Alternative Name (SAN) domains valid FQDN",
            CheckId::BlacklistConfiguration => "Blacklist configuration",
            CheckId::CommonNameBlacklisted => "Common Name (CN) domain blacklisted",
            CheckId::SanBlacklisted => "Subject Alternative Name (SAN) domains blacklisted",
        }
    }

    pub fn dependency(self) -> Dependency {
        match self {
            CheckId::CsrContent | CheckId::Pkcs10Block => Dependency::Terminal,
            CheckId::SanPresent
            | CheckId::SanUnique
            | CheckId::SanCount
            | CheckId::SanMatchesCn
            | CheckId::ReservedIpv4
            | CheckId::ReservedIpv6
            | CheckId::SanFqdn
            | CheckId::SanBlacklisted => Dependency::San,
            _ => Dependency::Independent,
        }
    }

    /// The failure detail shown for this check, before any specifics.
    pub fn failure_detail(self, config: &PolicyConfig) -> String {
        match self {
            CheckId::CsrContent => "The request is empty".into(),
            CheckId::Pkcs10Block => "The request is not a valid PKCS#10 block".into(),
            CheckId::KeySize => format!("The key must be exactly {} bits", config.required_key_bits),
            CheckId::WeakKey => "The key is a known weak Debian key (CVE-2008-0166)".into(),
            CheckId::CommonNamePresent => "The subject has no Common Name".into(),
            CheckId::CommonNameFqdn => {
                "The Common Name is not a registered domain or public IP address".into()
            }
            CheckId::Organization => "The subject has no Organisation".into(),
            CheckId::LocalityOrState => "The subject has neither Locality nor State".into(),
            CheckId::Country => "The subject has no Country".into(),
            CheckId::NoEmail => "The subject must not contain an e-mail address".into(),
            CheckId::SanPresent => "The request has no Subject Alternative Name entries".into(),
            CheckId::SanUnique => "Subject Alternative Name entries must be unique".into(),
            CheckId::SanCount => format!(
                "The request must have between 1 and {} Subject Alternative Name entries",
                config.san_entries_max
            ),
            CheckId::SanMatchesCn => {
                "No Subject Alternative Name entry corresponds to the Common Name".into()
            }
            CheckId::ReservedIpv4 => "Reserved IPv4 addresses are not allowed".into(),
            CheckId::ReservedIpv6 => "Reserved IPv6 addresses are not allowed".into(),
            CheckId::SanFqdn => "Subject Alternative Name domains must be registered".into(),
            CheckId::BlacklistConfiguration => "The blacklist feed list is not configured".into(),
            CheckId::CommonNameBlacklisted => "The Common Name domain is blacklisted".into(),
            CheckId::SanBlacklisted => "A Subject Alternative Name domain is blacklisted".into(),
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Evaluated { passed: bool, specifics: Option<String> },
    Forced,
}

/// Accumulates outcomes in any order; [`CheckLog::finish`] emits them in
/// table order. Checks never recorded are pending.
#[derive(Debug, Default)]
pub(crate) struct CheckLog {
    outcomes: HashMap<CheckId, Outcome>,
}

impl CheckLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, id: CheckId, passed: bool, specifics: Option<String>) {
        debug!(check = id.name(), passed, "check evaluated");
        self.outcomes
            .insert(id, Outcome::Evaluated { passed, specifics });
    }

    pub(crate) fn pass(&mut self, id: CheckId) {
        self.record(id, true, None);
    }

    /// Mark every SAN-dependent check as failed without evaluating it.
    pub(crate) fn force_san_failures(&mut self) {
        for id in CHECK_ORDER {
            if id.dependency() == Dependency::San {
                debug!(check = id.name(), "check forced to fail");
                self.outcomes.insert(id, Outcome::Forced);
            }
        }
    }

    /// Build the ordered log. With `terminal` set only the terminal checks
    /// are emitted.
    pub(crate) fn finish(self, config: &PolicyConfig, terminal: bool) -> Vec<CheckResult> {
        CHECK_ORDER
            .iter()
            .filter(|id| !terminal || id.dependency() == Dependency::Terminal)
            .map(|&id| self.result_for(id, config))
            .collect()
    }

    fn result_for(&self, id: CheckId, config: &PolicyConfig) -> CheckResult {
        let name = id.name().to_string();
        match self.outcomes.get(&id) {
            Some(Outcome::Evaluated { passed: true, .. }) => CheckResult {
                name,
                passed: true,
                state: CheckState::Passed,
                detail_on_failure: None,
                status_message: "passed".into(),
            },
            Some(Outcome::Evaluated {
                passed: false,
                specifics,
            }) => {
                let base = id.failure_detail(config);
                let detail = match specifics {
                    Some(s) => format!("{}: {}", base, s),
                    None => base,
                };
                CheckResult {
                    name,
                    passed: false,
                    state: CheckState::Failed,
                    detail_on_failure: Some(detail),
                    status_message: "failed".into(),
                }
            }
            Some(Outcome::Forced) => CheckResult {
                name,
                passed: false,
                state: CheckState::ForcedFail,
                detail_on_failure: Some(id.failure_detail(config)),
                status_message: "not evaluated: no Subject Alternative Name entries".into(),
            },
            None => CheckResult {
                name,
                passed: false,
                state: CheckState::ForcedFail,
                detail_on_failure: Some(id.failure_detail(config)),
                status_message: "not evaluated".into(),
            },
        }
    }
}
