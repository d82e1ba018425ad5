//! Domain reputation: WHOIS registration and remote blacklist feeds.

mod feeds;
mod whois;

pub use feeds::{
    load_feed_urls, parse_feed_lines, parse_feed_urls, BlacklistHit, FeedSnapshot, FeedSource,
    HttpFeedSource, MockFeedSource,
};
pub use whois::{
    lookup_all, parse_referral, parse_registered, MockWhois, TcpWhoisClient, WhoisLookup,
    WhoisOutcome, WhoisRecord,
};

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReputationError {
    #[error("WHOIS lookup unavailable: {0}")]
    LookupUnavailable(String),
    #[error("blacklist feed unavailable: {0}")]
    FeedUnavailable(String),
    #[error("timeout")]
    Timeout,
}

/// Run `jobs` with at most `limit` in flight, returning results in job order.
///
/// A job whose task panicked or was cancelled yields `None`. Dropping the
/// returned future aborts every task still running.
pub(crate) async fn run_bounded<T, Fut>(jobs: Vec<Fut>, limit: usize) -> Vec<Option<T>>
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let count = jobs.len();

    for (index, job) in jobs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            (index, job.await)
        });
    }

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, value)) => {
                if let Some(slot) = results.get_mut(index) {
                    *slot = Some(value);
                }
            }
            Err(e) => warn!("reputation task failed: {}", e),
        }
    }
    results
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn results_keep_job_order() {
        let jobs: Vec<_> = (0..5u64)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                i
            })
            .collect();
        let results = run_bounded(jobs, 3).await;
        assert_eq!(results, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..8)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();
        run_bounded(jobs, 2).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_limit_still_runs() {
        let results = run_bounded(vec![async { 7 }], 0).await;
        assert_eq!(results, vec![Some(7)]);
    }
}
