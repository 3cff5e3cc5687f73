//! The fetch seam and its caching decorator.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use jamfarm_core::{ServerAddress, StatusError, StatusSnapshot};
use jamfarm_protocol::Credential;
use tracing::debug;

use crate::cache::StatusCache;
use crate::client::StatusClient;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that can produce a status snapshot for a server.
///
/// Implemented by [`StatusClient`] for real fetches and by
/// [`CachedFetcher`] to put a freshness window in front of another fetcher.
pub trait StatusFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        address: &'a ServerAddress,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<StatusSnapshot, StatusError>>;
}

impl StatusFetcher for StatusClient {
    fn fetch<'a>(
        &'a self,
        address: &'a ServerAddress,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<StatusSnapshot, StatusError>> {
        Box::pin(self.fetch_status(address, credential))
    }
}

/// Serves fresh cached snapshots and delegates everything else.
///
/// Only successful fetches are stored; errors always go back to the inner
/// fetcher on the next call.
pub struct CachedFetcher<F> {
    inner: F,
    cache: Mutex<StatusCache>,
}

impl<F: StatusFetcher> CachedFetcher<F> {
    pub fn new(inner: F, cache: StatusCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Fetches through the cache.
    pub async fn fetch_cached(
        &self,
        address: &ServerAddress,
        credential: &Credential,
    ) -> Result<StatusSnapshot, StatusError> {
        let key = address.key();

        let cached = self.cache().get_fresh(&key);
        if let Some(snapshot) = cached {
            debug!(key = %key, "serving cached status");
            return Ok(snapshot);
        }

        let result = self.inner.fetch(address, credential).await;
        if let Ok(ref snapshot) = result {
            self.cache().insert(key, snapshot.clone());
        }
        result
    }

    fn cache(&self) -> MutexGuard<'_, StatusCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: StatusFetcher> StatusFetcher for CachedFetcher<F> {
    fn fetch<'a>(
        &'a self,
        address: &'a ServerAddress,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<StatusSnapshot, StatusError>> {
        Box::pin(self.fetch_cached(address, credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns scripted results and counts calls.
    struct Scripted {
        calls: AtomicUsize,
        results: Vec<Result<StatusSnapshot, StatusError>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<StatusSnapshot, StatusError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                results,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusFetcher for Scripted {
        fn fetch<'a>(
            &'a self,
            _address: &'a ServerAddress,
            _credential: &'a Credential,
        ) -> BoxFuture<'a, Result<StatusSnapshot, StatusError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.results[n.min(self.results.len() - 1)].clone();
            Box::pin(async move { result })
        }
    }

    fn addr() -> ServerAddress {
        ServerAddress::new("jam.example.net", 2049)
    }

    fn cred() -> Credential {
        Credential::new("status", "status")
    }

    #[tokio::test]
    async fn second_fetch_within_window_is_cached() {
        let first = StatusSnapshot::new().with_topic("one");
        let second = StatusSnapshot::new().with_topic("two");
        let fetcher = CachedFetcher::new(
            Scripted::new(vec![Ok(first.clone()), Ok(second)]),
            StatusCache::new(Duration::from_secs(60)),
        );

        assert_eq!(fetcher.fetch(&addr(), &cred()).await.unwrap(), first);
        assert_eq!(fetcher.fetch(&addr(), &cred()).await.unwrap(), first);
        assert_eq!(fetcher.inner().calls(), 1);
    }

    #[tokio::test]
    async fn zero_freshness_always_refetches() {
        let fetcher = CachedFetcher::new(
            Scripted::new(vec![Ok(StatusSnapshot::new())]),
            StatusCache::new(Duration::ZERO),
        );

        fetcher.fetch(&addr(), &cred()).await.unwrap();
        fetcher.fetch(&addr(), &cred()).await.unwrap();
        assert_eq!(fetcher.inner().calls(), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let ok = StatusSnapshot::new().with_tempo(120, 16);
        let fetcher = CachedFetcher::new(
            Scripted::new(vec![Err(StatusError::connect_failed("refused")), Ok(ok.clone())]),
            StatusCache::new(Duration::from_secs(60)),
        );

        assert!(fetcher.fetch(&addr(), &cred()).await.is_err());
        assert_eq!(fetcher.fetch(&addr(), &cred()).await.unwrap(), ok);
        assert_eq!(fetcher.inner().calls(), 2);
    }

    #[tokio::test]
    async fn servers_are_cached_independently() {
        let fetcher = CachedFetcher::new(
            Scripted::new(vec![Ok(StatusSnapshot::new())]),
            StatusCache::new(Duration::from_secs(60)),
        );

        fetcher.fetch(&addr(), &cred()).await.unwrap();
        fetcher
            .fetch(&ServerAddress::new("jam.example.net", 2050), &cred())
            .await
            .unwrap();
        assert_eq!(fetcher.inner().calls(), 2);
    }
}
