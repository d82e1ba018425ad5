//! WHOIS registration lookups.

use super::{run_bounded, ReputationError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const IANA_WHOIS: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Response markers meaning "this domain is not registered".
const NOT_FOUND_MARKERS: &[&str] = &[
    "no match for",
    "not found",
    "no data found",
    "no entries found",
    "no object found",
    "status: free",
    "status: available",
    "is available for registration",
];

/// What a WHOIS server said about one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhoisRecord {
    pub registered: bool,
    /// Non-empty response lines of the last server queried.
    pub raw_text: Vec<String>,
    /// The server that gave the answer, when reached through a referral.
    pub referral_server: Option<String>,
}

/// WHOIS lookup trait for abstracting the registration query.
pub trait WhoisLookup: Clone + Send + Sync + 'static {
    fn lookup(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<WhoisRecord, ReputationError>> + Send;
}

/// Result of looking up one domain within a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhoisOutcome {
    Answered(WhoisRecord),
    Failed(ReputationError),
}

impl WhoisOutcome {
    /// Only an affirmative answer counts as registered.
    pub fn is_registered(&self) -> bool {
        matches!(self, WhoisOutcome::Answered(r) if r.registered)
    }
}

/// Look up every distinct domain once, with bounded concurrency.
///
/// Each lookup is limited to `timeout`; a timeout or lookup failure is
/// recorded as [`WhoisOutcome::Failed`].
pub async fn lookup_all<W: WhoisLookup>(
    client: &W,
    domains: &[String],
    timeout: Duration,
    concurrency: usize,
) -> HashMap<String, WhoisOutcome> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = domains
        .iter()
        .filter(|d| seen.insert(d.as_str()))
        .cloned()
        .collect();

    let jobs: Vec<_> = unique
        .iter()
        .cloned()
        .map(|domain| {
            let client = client.clone();
            async move {
                match tokio::time::timeout(timeout, client.lookup(&domain)).await {
                    Ok(Ok(record)) => WhoisOutcome::Answered(record),
                    Ok(Err(e)) => {
                        warn!(domain = %domain, error = %e, "WHOIS lookup failed");
                        WhoisOutcome::Failed(e)
                    }
                    Err(_) => {
                        warn!(domain = %domain, "WHOIS lookup timed out");
                        WhoisOutcome::Failed(ReputationError::Timeout)
                    }
                }
            }
        })
        .collect();

    let results = run_bounded(jobs, concurrency).await;
    unique
        .into_iter()
        .zip(results)
        .map(|(domain, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                WhoisOutcome::Failed(ReputationError::LookupUnavailable("task aborted".into()))
            });
            (domain, outcome)
        })
        .collect()
}

/// Port-43 WHOIS client: asks IANA for the TLD's server, then follows one
/// registrar referral for thin registries.
#[derive(Debug, Clone)]
pub struct TcpWhoisClient {
    root_server: String,
    port: u16,
    timeout: Duration,
}

impl TcpWhoisClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            root_server: IANA_WHOIS.to_string(),
            port: WHOIS_PORT,
            timeout,
        }
    }

    /// Use a different root server and port (referrals use the same port).
    pub fn with_root_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.root_server = server.into();
        self.port = port;
        self
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, ReputationError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, self.port)).await?;
            stream.write_all(format!("{}\r\n", query).as_bytes()).await?;
            let mut buf = Vec::new();
            stream.take(MAX_RESPONSE_BYTES).read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(buf)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
            Ok(Err(e)) => Err(ReputationError::LookupUnavailable(format!("{}: {}", server, e))),
            Err(_) => Err(ReputationError::Timeout),
        }
    }
}

impl WhoisLookup for TcpWhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord, ReputationError> {
        let tld = domain.rsplit('.').next().unwrap_or(domain);
        let root = self.root_server.clone();
        let iana = self.query(&root, tld).await?;
        let server = parse_referral(&iana).ok_or_else(|| {
            ReputationError::LookupUnavailable(format!("no WHOIS server known for .{}", tld))
        })?;
        debug!(domain, server = %server, "following WHOIS referral");

        let mut answering = server.clone();
        let mut text = self.query(&server, domain).await?;

        if let Some(registrar) = parse_registrar_server(&text) {
            if !registrar.eq_ignore_ascii_case(&server) {
                match self.query(&registrar, domain).await {
                    Ok(registrar_text) => {
                        answering = registrar;
                        text = registrar_text;
                    }
                    Err(e) => {
                        debug!(registrar = %registrar, error = %e, "registrar WHOIS unreachable, using registry answer");
                    }
                }
            }
        }

        Ok(WhoisRecord {
            registered: parse_registered(&text),
            raw_text: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            referral_server: Some(answering),
        })
    }
}

/// Extract the `refer:` (or `whois:`) server from an IANA response.
pub fn parse_referral(text: &str) -> Option<String> {
    field_value(text, &["refer:", "whois:"])
}

fn parse_registrar_server(text: &str) -> Option<String> {
    field_value(text, &["registrar whois server:"]).map(|server| {
        server
            .trim_start_matches("whois://")
            .trim_end_matches('/')
            .to_string()
    })
}

fn field_value(text: &str, keys: &[&str]) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();
        keys.iter().find_map(|key| {
            if lower.starts_with(key) {
                line.get(key.len()..)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
            } else {
                None
            }
        })
    })
}

/// Decide registration from a WHOIS response.
///
/// "Not found" markers win; otherwise a `Domain Name:` or `domain:` record
/// means registered. Anything else is treated as unregistered.
pub fn parse_registered(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    lower.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("domain name:") || line.starts_with("domain:")
    })
}

/// In-memory WHOIS for tests and offline runs.
#[derive(Clone, Default)]
pub struct MockWhois {
    records: Arc<Mutex<HashMap<String, WhoisRecord>>>,
    unavailable: Arc<Mutex<Vec<String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<Vec<String>>>,
    default_registered: bool,
}

impl MockWhois {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that reports every domain without an explicit entry as registered.
    pub fn all_registered() -> Self {
        Self {
            default_registered: true,
            ..Self::default()
        }
    }

    pub fn add_registered(&self, domain: &str) {
        self.insert(domain, true);
    }

    pub fn add_unregistered(&self, domain: &str) {
        self.insert(domain, false);
    }

    pub fn set_unavailable(&self, domain: &str) {
        lock(&self.unavailable).push(domain.to_lowercase());
    }

    pub fn set_delay(&self, domain: &str, delay: Duration) {
        lock(&self.delays).insert(domain.to_lowercase(), delay);
    }

    /// Domains looked up so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn insert(&self, domain: &str, registered: bool) {
        let text = if registered {
            format!("Domain Name: {}", domain.to_uppercase())
        } else {
            format!("No match for \"{}\".", domain.to_uppercase())
        };
        lock(&self.records).insert(
            domain.to_lowercase(),
            WhoisRecord {
                registered,
                raw_text: vec![text],
                referral_server: Some("whois.mock".into()),
            },
        );
    }
}

impl WhoisLookup for MockWhois {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord, ReputationError> {
        let key = domain.to_lowercase();
        lock(&self.calls).push(key.clone());
        let delay = lock(&self.delays).get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.unavailable).contains(&key) {
            return Err(ReputationError::LookupUnavailable(format!(
                "{}: connection refused",
                key
            )));
        }
        let record = lock(&self.records).get(&key).cloned();
        Ok(record.unwrap_or_else(|| WhoisRecord {
            registered: self.default_registered,
            raw_text: Vec::new(),
            referral_server: None,
        }))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
