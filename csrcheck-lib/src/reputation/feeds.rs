//! Remote domain blacklist feeds.

use super::{run_bounded, ReputationError};
use crate::CsrCheckError;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Source of blacklist feed contents.
pub trait FeedSource: Clone + Send + Sync + 'static {
    /// Fetch one feed and return its domain entries.
    fn fetch_feed(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<String>, ReputationError>> + Send;
}

/// Feed source over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self, CsrCheckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("csrcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CsrCheckError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<String>, ReputationError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReputationError::FeedUnavailable(format!("{}: {}", url, e)))?;
        let body = response
            .text()
            .await
            .map_err(|e| ReputationError::FeedUnavailable(format!("{}: {}", url, e)))?;
        Ok(parse_feed_lines(&body))
    }
}

/// Feed body to entries: trimmed, lowercased, blank and `#` lines dropped.
pub fn parse_feed_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Feed URL list text to URLs, one per line; blank and `#` lines dropped.
pub fn parse_feed_urls(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Read the feed URL list. A missing file is `ConfigurationMissing`.
pub fn load_feed_urls(path: &Path) -> Result<Vec<String>, CsrCheckError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_feed_urls(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            CsrCheckError::ConfigurationMissing(format!("blacklist URL file {}", path.display())),
        ),
        Err(e) => Err(CsrCheckError::Io(e)),
    }
}

/// A blacklist match: the first feed, and the first domain within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistHit {
    pub feed: String,
    pub domain: String,
}

#[derive(Debug, Clone)]
struct FeedContents {
    url: String,
    /// `None` when the feed could not be fetched.
    domains: Option<HashSet<String>>,
}

/// Contents of every configured feed, fetched once per request.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    feeds: Vec<FeedContents>,
}

impl FeedSnapshot {
    /// Fetch all feeds with bounded concurrency, keeping configured order.
    ///
    /// A feed that fails or exceeds `timeout` contributes no entries.
    pub async fn fetch<F: FeedSource>(
        source: &F,
        urls: &[String],
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        let jobs: Vec<_> = urls
            .iter()
            .cloned()
            .map(|url| {
                let source = source.clone();
                async move {
                    match tokio::time::timeout(timeout, source.fetch_feed(&url)).await {
                        Ok(Ok(entries)) => {
                            debug!(feed = %url, entries = entries.len(), "fetched blacklist feed");
                            Some(entries.into_iter().collect::<HashSet<_>>())
                        }
                        Ok(Err(e)) => {
                            warn!(feed = %url, error = %e, "blacklist feed unavailable, skipping");
                            None
                        }
                        Err(_) => {
                            warn!(feed = %url, "blacklist feed timed out, skipping");
                            None
                        }
                    }
                }
            })
            .collect();

        let results = run_bounded(jobs, concurrency).await;
        let feeds = urls
            .iter()
            .zip(results)
            .map(|(url, domains)| FeedContents {
                url: url.clone(),
                domains: domains.flatten(),
            })
            .collect();
        Self { feeds }
    }

    /// Build a snapshot from already-known feed contents.
    pub fn from_entries(feeds: Vec<(String, Vec<String>)>) -> Self {
        Self {
            feeds: feeds
                .into_iter()
                .map(|(url, entries)| FeedContents {
                    url,
                    domains: Some(entries.into_iter().collect()),
                })
                .collect(),
        }
    }

    /// Scan feeds in configured order and, within a feed, `domains` in
    /// order; return the first pair that matches.
    pub fn first_match(&self, domains: &[String]) -> Option<BlacklistHit> {
        self.feeds.iter().find_map(|feed| {
            let entries = feed.domains.as_ref()?;
            domains
                .iter()
                .find(|d| entries.contains(d.as_str()))
                .map(|d| BlacklistHit {
                    feed: feed.url.clone(),
                    domain: d.clone(),
                })
        })
    }

    /// URLs of feeds that could not be fetched.
    pub fn unavailable_feeds(&self) -> Vec<&str> {
        self.feeds
            .iter()
            .filter(|f| f.domains.is_none())
            .map(|f| f.url.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

/// In-memory feed source for tests and offline runs.
#[derive(Clone, Default)]
pub struct MockFeedSource {
    feeds: Arc<Mutex<HashMap<String, Vec<String>>>>,
    unavailable: Arc<Mutex<Vec<String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    fetches: Arc<Mutex<Vec<String>>>,
}

impl MockFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_feed(&self, url: &str, domains: &[&str]) {
        lock(&self.feeds).insert(
            url.to_string(),
            domains.iter().map(|d| d.to_ascii_lowercase()).collect(),
        );
    }

    pub fn set_unavailable(&self, url: &str) {
        lock(&self.unavailable).push(url.to_string());
    }

    pub fn set_delay(&self, url: &str, delay: Duration) {
        lock(&self.delays).insert(url.to_string(), delay);
    }

    /// URLs fetched so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        lock(&self.fetches).clone()
    }
}

impl FeedSource for MockFeedSource {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<String>, ReputationError> {
        lock(&self.fetches).push(url.to_string());
        let delay = lock(&self.delays).get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.unavailable).iter().any(|u| u == url) {
            return Err(ReputationError::FeedUnavailable(format!("{}: HTTP 503", url)));
        }
        let entries = lock(&self.feeds).get(url).cloned();
        Ok(entries.unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn feed_lines_are_normalized() {
        let entries = parse_feed_lines("# malware\n\n  Evil.COM  \nbad.org\n#x.com\n");
        assert_eq!(entries, vec!["evil.com", "bad.org"]);
    }

    #[test]
    fn url_list_skips_comments() {
        let urls = parse_feed_urls("# feeds\nhttps://a.example/list.txt\n\n  https://b.example/x \n");
        assert_eq!(urls, vec!["https://a.example/list.txt", "https://b.example/x"]);
    }

    #[test]
    fn missing_url_list_is_configuration_missing() {
        let err = load_feed_urls(Path::new("/nonexistent/blacklist.txt")).unwrap_err();
        assert!(matches!(err, CsrCheckError::ConfigurationMissing(_)));
    }

    #[test]
    fn first_match_scans_feeds_then_domains() {
        let snapshot = FeedSnapshot::from_entries(vec![
            ("feed-a".into(), strings(&["other.com"])),
            ("feed-b".into(), strings(&["evil.com", "bad.org"])),
            ("feed-c".into(), strings(&["example.com"])),
        ]);
        let hit = snapshot
            .first_match(&strings(&["example.com", "bad.org", "evil.com"]))
            .unwrap();
        assert_eq!(hit.feed, "feed-b");
        assert_eq!(hit.domain, "bad.org");

        assert!(snapshot.first_match(&strings(&["good.com"])).is_none());
        assert!(snapshot.first_match(&[]).is_none());
    }

    #[tokio::test]
    async fn unavailable_and_slow_feeds_fail_open() {
        let source = MockFeedSource::new();
        source.add_feed("https://f1", &["evil.com"]);
        source.set_unavailable("https://f2");
        source.add_feed("https://f3", &["slow.com"]);
        source.set_delay("https://f3", Duration::from_secs(5));

        let urls = strings(&["https://f1", "https://f2", "https://f3"]);
        let snapshot = FeedSnapshot::fetch(&source, &urls, Duration::from_millis(50), 4).await;

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.unavailable_feeds(), vec!["https://f2", "https://f3"]);
        assert!(snapshot.first_match(&strings(&["slow.com"])).is_none());
        let hit = snapshot.first_match(&strings(&["evil.com"])).unwrap();
        assert_eq!(hit.feed, "https://f1");
        assert_eq!(source.fetches().len(), 3);
    }
}
