//! Aggregate verdicts: baseline compliance and product profiles.

use crate::config::ProfileConfig;
use crate::fields::{AggregateResult, CheckResult};

pub const BASELINE: &str = "Baseline compliant";

/// SAN facts the profile predicates look at.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SanSummary {
    pub wildcard_present: bool,
    pub distinct_domains: usize,
}

/// Compute the baseline verdict followed by one verdict per enabled profile.
///
/// With `terminal` set every aggregate fails.
pub(crate) fn aggregate(
    checks: &[CheckResult],
    profiles: &[ProfileConfig],
    summary: SanSummary,
    terminal: bool,
) -> Vec<AggregateResult> {
    let failed: Vec<&str> = checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name.as_str())
        .collect();
    let baseline_ok = !terminal && failed.is_empty();

    let mut results = Vec::with_capacity(profiles.len() + 1);
    results.push(AggregateResult {
        name: BASELINE.to_string(),
        passed: baseline_ok,
        message: format!(
            "{} of {} checks passed",
            checks.len() - failed.len(),
            checks.len()
        ),
        detail_on_failure: (!baseline_ok).then(|| {
            if terminal {
                "The request could not be read".to_string()
            } else {
                format!("Failed checks: {}", failed.join(", "))
            }
        }),
    });

    let message = format!(
        "wildcard: {}, domains: {}",
        if summary.wildcard_present { "yes" } else { "no" },
        summary.distinct_domains
    );

    for profile in profiles.iter().filter(|p| p.enabled) {
        let mut reasons = Vec::new();
        if !baseline_ok {
            reasons.push("the request is not baseline compliant".to_string());
        }
        if summary.wildcard_present && !profile.allow_wildcard {
            reasons.push("wildcard names are not allowed".to_string());
        }
        if let Some(max) = profile.max_domains {
            if summary.distinct_domains > max {
                reasons.push(format!("at most {} domains are allowed", max));
            }
        }
        results.push(AggregateResult {
            name: profile.name.clone(),
            passed: reasons.is_empty(),
            message: message.clone(),
            detail_on_failure: (!reasons.is_empty()).then(|| reasons.join("; ")),
        });
    }

    results
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::fields::CheckState;

    fn check(name: &str, passed: bool) -> CheckResult {
        CheckResult {
            name: name.into(),
            passed,
            state: if passed {
                CheckState::Passed
            } else {
                CheckState::Failed
            },
            detail_on_failure: None,
            status_message: String::new(),
        }
    }

    fn profile(name: &str, allow_wildcard: bool, max_domains: Option<usize>) -> ProfileConfig {
        ProfileConfig {
            name: name.into(),
            enabled: true,
            allow_wildcard,
            max_domains,
        }
    }

    #[test]
    fn baseline_is_and_of_checks() {
        let checks = vec![check("a", true), check("b", false), check("c", false)];
        let results = aggregate(&checks, &[], SanSummary::default(), false);
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(results[0].message, "1 of 3 checks passed");
        assert_eq!(results[0].detail_on_failure.as_deref(), Some("Failed checks: b, c"));
    }

    #[test]
    fn wildcard_profile_predicate() {
        let checks = vec![check("a", true)];
        let profiles = vec![profile("Standard SSL", true, None), profile("EV SSL", false, None)];
        let summary = SanSummary {
            wildcard_present: true,
            distinct_domains: 1,
        };
        let results = aggregate(&checks, &profiles, summary, false);
        assert!(results[0].passed);
        assert!(results[1].passed);
        assert!(!results[2].passed);
        assert_eq!(results[2].message, "wildcard: yes, domains: 1");
    }

    #[test]
    fn domain_limit_and_disabled_profiles() {
        let checks = vec![check("a", true)];
        let mut disabled = profile("Hidden", true, None);
        disabled.enabled = false;
        let profiles = vec![profile("Single", true, Some(1)), disabled];
        let summary = SanSummary {
            wildcard_present: false,
            distinct_domains: 2,
        };
        let results = aggregate(&checks, &profiles, summary, false);
        assert_eq!(results.len(), 2);
        assert!(!results[1].passed);
        assert_eq!(
            results[1].detail_on_failure.as_deref(),
            Some("at most 1 domains are allowed")
        );
    }

    #[test]
    fn terminal_failure_fails_everything() {
        let checks = vec![check("a", true), check("b", false)];
        let profiles = vec![profile("Standard SSL", true, None)];
        let results = aggregate(&checks, &profiles, SanSummary::default(), true);
        assert!(results.iter().all(|r| !r.passed));
    }
}
