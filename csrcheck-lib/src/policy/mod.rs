//! The policy pipeline: runs every check against one request and builds the
//! ordered report.
//!
//! Terminal checks (readable content, parseable PKCS#10 block) abort the
//! pipeline on failure. Checks that depend on the SAN set are forced to fail
//! when there is no SAN set. WHOIS lookups and blacklist feed fetches run
//! concurrently; the report is always emitted in the fixed table order.

mod checks;
mod profiles;

pub use checks::{CheckId, Dependency, CHECK_ORDER};
pub use profiles::BASELINE;

use crate::config::PolicyConfig;
use crate::fields::{DomainRecord, ValidationReport};
use crate::parser::parse_csr;
use crate::reputation::{
    load_feed_urls, lookup_all, FeedSnapshot, FeedSource, WhoisLookup, WhoisOutcome,
};
use crate::san::{classify_san, is_reserved_ip, registrable_domain, SanClassification};
use crate::weak_key::{check_weak_key, WeakKeyBlacklist};
use crate::CsrCheckError;
use checks::CheckLog;
use profiles::SanSummary;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Validates requests against one policy configuration.
///
/// The weak-key blacklist and the feed URL list are loaded once, when the
/// validator is built; feed contents and WHOIS answers are fetched per request.
#[derive(Clone)]
pub struct Validator<W, F> {
    config: Arc<PolicyConfig>,
    weak_keys: Option<Arc<WeakKeyBlacklist>>,
    /// `Err` holds why the feed list is unavailable.
    feed_urls: Result<Arc<Vec<String>>, String>,
    whois: W,
    feeds: F,
}

/// What the Common Name points at.
enum CnTarget {
    Ip(IpAddr),
    Domain(String),
}

impl<W: WhoisLookup, F: FeedSource> Validator<W, F> {
    pub fn new(config: PolicyConfig, whois: W, feeds: F) -> Self {
        let weak_keys = match &config.weak_key_file {
            Some(path) => match WeakKeyBlacklist::load(path) {
                Ok(blacklist) => Some(Arc::new(blacklist)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "weak-key blacklist could not be loaded");
                    None
                }
            },
            None => None,
        };

        let feed_urls = match &config.blacklist_urls_file {
            Some(path) => load_feed_urls(path).map(Arc::new).map_err(|e| {
                warn!(path = %path.display(), error = %e, "blacklist feed list unavailable");
                e.to_string()
            }),
            None => Err(CsrCheckError::ConfigurationMissing(
                "no blacklist URL file configured".into(),
            )
            .to_string()),
        };

        Self {
            config: Arc::new(config),
            weak_keys,
            feed_urls,
            whois,
            feeds,
        }
    }

    /// Replace the weak-key blacklist loaded from the configuration.
    pub fn with_weak_keys(mut self, blacklist: WeakKeyBlacklist) -> Self {
        self.weak_keys = Some(Arc::new(blacklist));
        self
    }

    /// Replace the feed URL list loaded from the configuration.
    pub fn with_feed_urls(mut self, urls: Vec<String>) -> Self {
        self.feed_urls = Ok(Arc::new(urls));
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Validate one request.
    ///
    /// Never fails: every problem becomes a failing check. Dropping the
    /// returned future aborts outstanding WHOIS and feed requests.
    pub async fn validate(&self, input: &[u8]) -> ValidationReport {
        let started = Instant::now();
        let mut log = CheckLog::new();

        let content_present = !input.iter().all(u8::is_ascii_whitespace);
        log.record(CheckId::CsrContent, content_present, None);
        let parsed = if content_present {
            parse_csr(input)
        } else {
            Err(CsrCheckError::MalformedCsr("empty input".into()))
        };

        let csr = match parsed {
            Ok(csr) => {
                log.pass(CheckId::Pkcs10Block);
                csr
            }
            Err(e) => {
                log.record(CheckId::Pkcs10Block, false, Some(error_specifics(&e)));
                info!(error = %e, "request unreadable, validation aborted");
                let checks = log.finish(&self.config, true);
                let aggregates =
                    profiles::aggregate(&checks, &self.config.profiles, SanSummary::default(), true);
                return ValidationReport {
                    checks,
                    aggregates,
                    duration: started.elapsed(),
                    terminal_failure: true,
                    subject: None,
                    key: None,
                    sans: Vec::new(),
                    domains: Vec::new(),
                    wildcard_present: false,
                };
            }
        };

        // Key
        match &csr.key {
            Some(key) => {
                log.record(
                    CheckId::KeySize,
                    key.bit_length == self.config.required_key_bits,
                    Some(format!("{} key has {} bits", key.algorithm, key.bit_length)),
                );
                let verdict = check_weak_key(key, self.weak_keys.as_deref());
                debug!(?verdict, "weak-key verdict");
                log.record(CheckId::WeakKey, verdict.passes(), None);
            }
            None => {
                let reason = csr
                    .key_error
                    .clone()
                    .unwrap_or_else(|| "unreadable public key".into());
                log.record(CheckId::KeySize, false, Some(reason.clone()));
                log.record(CheckId::WeakKey, false, Some(reason));
            }
        }

        // Subject
        let subject = &csr.subject;
        let common_name = subject
            .common_name
            .as_deref()
            .map(str::trim)
            .filter(|cn| !cn.is_empty());
        log.record(CheckId::CommonNamePresent, common_name.is_some(), None);
        log.record(CheckId::Organization, has_value(&subject.organization), None);
        log.record(
            CheckId::LocalityOrState,
            has_value(&subject.locality) || subject.state.iter().any(|s| !s.trim().is_empty()),
            None,
        );
        log.record(CheckId::Country, has_value(&subject.country), None);
        log.record(
            CheckId::NoEmail,
            subject.email_address.is_none(),
            subject.email_address.clone(),
        );

        let cn_target = common_name.map(|cn| match cn.parse::<IpAddr>() {
            Ok(ip) => CnTarget::Ip(ip),
            Err(_) => CnTarget::Domain(registrable_domain(cn)),
        });

        // SAN set
        let classification = match &csr.san_error {
            Some(e) => {
                info!(error = %e, "SAN extension unreadable");
                None
            }
            None => classify_san(&csr.san)
                .map_err(|e| info!(error = %e, "no SAN entries"))
                .ok(),
        };

        // Reputation: WHOIS and feeds in parallel.
        let mut cn_domains = Vec::new();
        if let Some(CnTarget::Domain(d)) = &cn_target {
            cn_domains.push(d.clone());
        }
        let san_domains: &[String] = classification
            .as_ref()
            .map(|c| c.domains.as_slice())
            .unwrap_or_default();
        let lookup_domains: Vec<String> = cn_domains.iter().chain(san_domains).cloned().collect();

        let feed_urls: &[String] = match &self.feed_urls {
            Ok(urls) => urls.as_slice(),
            Err(_) => &[],
        };
        let (whois, snapshot) = tokio::join!(
            lookup_all(
                &self.whois,
                &lookup_domains,
                self.config.whois_timeout(),
                self.config.whois_concurrency,
            ),
            self.fetch_feeds(feed_urls, cn_target.is_some() || !san_domains.is_empty()),
        );

        match &cn_target {
            None => log.record(CheckId::CommonNameFqdn, false, Some("no Common Name".into())),
            Some(CnTarget::Ip(ip)) => log.record(
                CheckId::CommonNameFqdn,
                !is_reserved_ip(*ip),
                Some(format!("{} is a reserved address", ip)),
            ),
            Some(CnTarget::Domain(domain)) => {
                let outcome = whois.get(domain);
                log.record(
                    CheckId::CommonNameFqdn,
                    outcome.is_some_and(WhoisOutcome::is_registered),
                    Some(describe_whois(domain, outcome)),
                );
            }
        }

        match &classification {
            Some(c) => self.record_san_checks(&mut log, c, common_name, &whois, &snapshot),
            None => log.force_san_failures(),
        }

        match &self.feed_urls {
            Ok(_) => log.pass(CheckId::BlacklistConfiguration),
            Err(reason) => log.record(CheckId::BlacklistConfiguration, false, Some(reason.clone())),
        }

        match &cn_target {
            None => log.record(
                CheckId::CommonNameBlacklisted,
                false,
                Some("no Common Name".into()),
            ),
            Some(target) => {
                let value = match target {
                    CnTarget::Ip(ip) => ip.to_string(),
                    CnTarget::Domain(d) => d.clone(),
                };
                let hit = snapshot.first_match(&[value]);
                log.record(
                    CheckId::CommonNameBlacklisted,
                    hit.is_none(),
                    hit.map(|h| format!("{} listed in {}", h.domain, h.feed)),
                );
            }
        }

        let domains = classification
            .as_ref()
            .map(|c| domain_records(&c.domains, &whois))
            .unwrap_or_default();
        let wildcard_present = classification.as_ref().is_some_and(|c| c.wildcard_present);
        let summary = SanSummary {
            wildcard_present,
            distinct_domains: classification
                .as_ref()
                .map_or(0, SanClassification::distinct_domain_count),
        };

        let checks = log.finish(&self.config, false);
        let aggregates = profiles::aggregate(&checks, &self.config.profiles, summary, false);
        let duration = started.elapsed();

        info!(
            compliant = aggregates.first().is_some_and(|a| a.passed),
            failed = checks.iter().filter(|c| !c.passed).count(),
            elapsed_secs = duration.as_secs_f64(),
            "validation finished"
        );

        ValidationReport {
            checks,
            aggregates,
            duration,
            terminal_failure: false,
            subject: Some(csr.subject.clone()),
            key: csr.key.clone(),
            sans: classification
                .map(|c| c.entries)
                .unwrap_or_else(|| csr.san.clone()),
            domains,
            wildcard_present,
        }
    }

    /// Validate one request, giving up when `cancel` turns `true`.
    ///
    /// A cancelled run yields `Err(Cancelled)` and no partial report.
    pub async fn validate_with_cancel(
        &self,
        input: &[u8],
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ValidationReport, CsrCheckError> {
        tokio::select! {
            report = self.validate(input) => Ok(report),
            _ = wait_cancelled(&mut cancel) => {
                info!("validation cancelled");
                Err(CsrCheckError::Cancelled)
            }
        }
    }

    async fn fetch_feeds(&self, urls: &[String], needed: bool) -> FeedSnapshot {
        if !needed || urls.is_empty() {
            return FeedSnapshot::default();
        }
        FeedSnapshot::fetch(
            &self.feeds,
            urls,
            self.config.feed_timeout(),
            self.config.feed_concurrency,
        )
        .await
    }

    fn record_san_checks(
        &self,
        log: &mut CheckLog,
        san: &SanClassification,
        common_name: Option<&str>,
        whois: &HashMap<String, WhoisOutcome>,
        snapshot: &FeedSnapshot,
    ) {
        log.record(CheckId::SanPresent, !san.is_empty(), None);

        let duplicates = san.duplicate_entries();
        log.record(
            CheckId::SanUnique,
            duplicates.is_empty(),
            Some(duplicates.join(", ")),
        );

        log.record(
            CheckId::SanCount,
            (1..=self.config.san_entries_max).contains(&san.len()),
            Some(format!("{} entries", san.len())),
        );

        log.record(
            CheckId::SanMatchesCn,
            common_name.is_some_and(|cn| san.matches_common_name(cn)),
            common_name.map(String::from),
        );

        let reserved_v4 = san.reserved_ipv4();
        log.record(
            CheckId::ReservedIpv4,
            reserved_v4.is_empty(),
            Some(reserved_v4.join(", ")),
        );
        let reserved_v6 = san.reserved_ipv6();
        log.record(
            CheckId::ReservedIpv6,
            reserved_v6.is_empty(),
            Some(reserved_v6.join(", ")),
        );

        let mut seen = HashSet::new();
        let unregistered: Vec<String> = san
            .domains
            .iter()
            .filter(|d| !whois.get(d.as_str()).is_some_and(WhoisOutcome::is_registered))
            .filter(|d| seen.insert(d.as_str()))
            .map(|d| describe_whois(d, whois.get(d.as_str())))
            .collect();
        log.record(
            CheckId::SanFqdn,
            unregistered.is_empty(),
            Some(unregistered.join(", ")),
        );

        let hit = snapshot.first_match(&san.domains);
        log.record(
            CheckId::SanBlacklisted,
            hit.is_none(),
            hit.map(|h| format!("{} listed in {}", h.domain, h.feed)),
        );
    }
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn error_specifics(e: &CsrCheckError) -> String {
    match e {
        CsrCheckError::MalformedCsr(msg) | CsrCheckError::MalformedKey(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn describe_whois(domain: &str, outcome: Option<&WhoisOutcome>) -> String {
    match outcome {
        Some(WhoisOutcome::Answered(r)) if r.registered => domain.to_string(),
        Some(WhoisOutcome::Answered(_)) => format!("{} (not registered)", domain),
        Some(WhoisOutcome::Failed(e)) => format!("{} (lookup failed: {})", domain, e),
        None => format!("{} (not looked up)", domain),
    }
}

fn domain_records(domains: &[String], whois: &HashMap<String, WhoisOutcome>) -> Vec<DomainRecord> {
    domains
        .iter()
        .map(|domain| match whois.get(domain) {
            Some(WhoisOutcome::Answered(record)) => DomainRecord {
                domain: domain.clone(),
                whois_checked: true,
                registered: record.registered,
                whois_raw_text: record.raw_text.clone(),
                whois_server: record.referral_server.clone(),
            },
            _ => DomainRecord {
                domain: domain.clone(),
                ..DomainRecord::default()
            },
        })
        .collect()
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone without cancelling: never fire.
            std::future::pending::<()>().await;
        }
    }
}
